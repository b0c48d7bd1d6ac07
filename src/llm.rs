//! External free-text classifier, consulted only when local keyword and
//! gazetteer signals are insufficient.
//!
//! Uses a local [Ollama](https://ollama.com/) server (OpenAI-compatible API).
//! The model reply is untrusted free text: it may wrap the JSON in prose or
//! markdown fences, return `incident_type` as a string or a list, or be
//! garbage.  Every failure mode — timeout, HTTP error, unparseable body —
//! collapses to an empty [`ClassificationResult`] so the pipeline continues
//! on local signals alone.
//!
//! # Setup
//!
//! ```env
//! LLM_ENABLED=true
//! LLM_MODEL=phi3:mini                        # default
//! LLM_ENDPOINT=http://127.0.0.1:11434        # default (Ollama)
//! LLM_TIMEOUT_MS=20000                       # default
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// ─────────────────────────── System prompt ────────────────────────────────

const SYSTEM_PROMPT: &str = r#"You are an incident analysis assistant for Lebanon news feeds.

You receive one social-media message (Arabic or English) reporting a possible incident.

Reply ONLY with a JSON object, nothing else:
{"location": "place name from the message or null", "incident_type": "one of: fire, accident, shooting, earthquake, flood, explosion, protest, medical, airstrike, collapse, other", "threat_level": "yes or no"}

Rules:
- "location" must be a place name that literally appears in the message. Never guess one.
- If the message contains a no-threat phrase such as "لا تهديد", threat_level must be "no".
- incident_type may be a list when the message describes several incidents.
"#;

// ─────────────────────────── Data types ──────────────────────────────────

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: String,
}

/// Untrusted classifier output.  Every field must be validated against the
/// closed incident set / the gazetteer before it may influence a record.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ClassificationResult {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub incident_type: Option<OneOrMany>,
    #[serde(default)]
    pub threat_level: Option<String>,
}

/// Some model variants return `incident_type` as a scalar, others as a list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(|s| s.as_str()).collect(),
        }
    }
}

impl ClassificationResult {
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.incident_type.is_none() && self.threat_level.is_none()
    }
}

// ─────────────────── JSON-from-free-text extraction ──────────────────────

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\n?|```").expect("code fence regex"));

/// Best-effort: locate and parse the first well-formed JSON object inside
/// adversarial free text.  Strips markdown fences, then brace-balances from
/// each `{` (string-aware) and accepts the first span `serde_json` agrees is
/// an object of the expected shape.  Never panics; `None` on any doubt.
pub fn first_json_object(raw: &str) -> Option<ClassificationResult> {
    let cleaned = CODE_FENCE.replace_all(raw, "");
    let cleaned: &str = cleaned.as_ref();

    let mut search_from = 0usize;
    while let Some(offset) = cleaned[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(cleaned.as_bytes(), start) {
            let span = &cleaned[start..=end];
            if let Ok(parsed) = serde_json::from_str::<ClassificationResult>(span) {
                return Some(parsed);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Index of the `}` closing the object opened at `start`, honoring strings
/// and escapes.  `None` when the braces never balance.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ─────────────────────────── LlmClassifier ───────────────────────────────

/// Async external classifier.  Constructed once, reused for every message.
pub struct LlmClassifier {
    client: Client,
    endpoint: String,
    model: String,
    enabled: bool,
    timeout: Duration,
}

impl LlmClassifier {
    /// Build from environment variables.
    ///
    /// | Env var          | Default                    | Description              |
    /// |------------------|----------------------------|--------------------------|
    /// | `LLM_ENABLED`    | `false`                    | Enable external fallback |
    /// | `LLM_MODEL`      | `phi3:mini`                | Ollama model name        |
    /// | `LLM_ENDPOINT`   | `http://127.0.0.1:11434`   | Ollama / llama-server URL|
    /// | `LLM_TIMEOUT_MS` | `20000`                    | Request timeout in ms    |
    pub fn from_env() -> Self {
        let enabled = std::env::var("LLM_ENABLED")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let endpoint =
            std::env::var("LLM_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:11434".into());

        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "phi3:mini".into());

        let timeout_ms: u64 = std::env::var("LLM_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20_000);

        Self {
            client: Client::new(),
            endpoint,
            model,
            enabled,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// A classifier that never fires, for tests that must not touch the
    /// network.
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            endpoint: String::new(),
            model: String::new(),
            enabled: false,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ask the model to classify one raw message.
    ///
    /// Any error (disabled, timeout, server down, malformed reply) yields an
    /// empty result — never an `Err`, never a panic.
    pub async fn classify(&self, text: &str) -> ClassificationResult {
        if !self.enabled {
            return ClassificationResult::default();
        }

        // Keep the prompt short; inference time dominates the timeout.
        let truncated: String = text.chars().take(800).collect();

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Message:\n```\n{truncated}\n```\n\nClassify:"),
                },
            ],
            temperature: 0.0,
            max_tokens: 200,
            response_format: Some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        let url = format!("{}/v1/chat/completions", self.endpoint);

        let response = match self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("External classifier request failed (treating as empty): {e}");
                return ClassificationResult::default();
            }
        };

        let body = match response.json::<ChatResponse>().await {
            Ok(b) => b,
            Err(e) => {
                warn!("External classifier response parse failed (treating as empty): {e}");
                return ClassificationResult::default();
            }
        };

        let Some(content) = body.choices.first().map(|c| c.message.content.as_str()) else {
            warn!("External classifier returned no choices (treating as empty)");
            return ClassificationResult::default();
        };

        match first_json_object(content) {
            Some(result) => {
                debug!("External classifier verdict: {result:?}");
                result
            }
            None => {
                warn!("No JSON object in external classifier reply — raw: {content}");
                ClassificationResult::default()
            }
        }
    }
}

impl std::fmt::Display for LlmClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LlmClassifier(enabled={}, model={}, endpoint={}, timeout={}ms)",
            self.enabled,
            self.model,
            self.endpoint,
            self.timeout.as_millis(),
        )
    }
}

// ─────────────────────────────── Tests ───────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_object() {
        let r = first_json_object(
            r#"{"location": "بيروت", "incident_type": "fire", "threat_level": "yes"}"#,
        )
        .expect("object");
        assert_eq!(r.location.as_deref(), Some("بيروت"));
        assert_eq!(r.incident_type, Some(OneOrMany::One("fire".into())));
        assert_eq!(r.threat_level.as_deref(), Some("yes"));
    }

    #[test]
    fn parses_object_wrapped_in_prose_and_fences() {
        let raw = "Sure! Here is the analysis:\n```json\n{\"location\": \"صيدا\", \"incident_type\": \"flood\", \"threat_level\": \"no\"}\n```\nLet me know if you need more.";
        let r = first_json_object(raw).expect("object");
        assert_eq!(r.location.as_deref(), Some("صيدا"));
        assert_eq!(r.threat_level.as_deref(), Some("no"));
    }

    #[test]
    fn accepts_incident_type_list() {
        let r = first_json_object(r#"{"incident_type": ["fire", "medical"]}"#).expect("object");
        let values = r.incident_type.expect("types");
        assert_eq!(values.values(), vec!["fire", "medical"]);
    }

    #[test]
    fn skips_malformed_object_then_finds_valid_one() {
        let raw = r#"{"broken": } trailing {"location": "بيروت"}"#;
        let r = first_json_object(raw).expect("object");
        assert_eq!(r.location.as_deref(), Some("بيروت"));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let raw = r#"{"location": "حي {الغربي}", "threat_level": "yes"}"#;
        let r = first_json_object(raw).expect("object");
        assert_eq!(r.location.as_deref(), Some("حي {الغربي}"));
    }

    #[test]
    fn garbage_is_none_not_panic() {
        assert!(first_json_object("").is_none());
        assert!(first_json_object("no json here").is_none());
        assert!(first_json_object("{{{{").is_none());
        assert!(first_json_object("{\"unterminated\": \"").is_none());
    }

    #[test]
    fn null_fields_deserialize_as_absent() {
        let r = first_json_object(
            r#"{"location": null, "incident_type": null, "threat_level": null}"#,
        )
        .expect("object");
        assert!(r.is_empty());
    }
}
