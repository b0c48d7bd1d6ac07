//! Keyword classification and the message-to-record extraction pipeline.
//!
//! Per message: normalize → keyword classify + gazetteer lookup → consult
//! the external model only when a local signal is missing → validate →
//! emit one candidate record per resolved incident type, or nothing.
//!
//! Substring matching over curated bilingual phrase sets is deliberately
//! simple and auditable; it is the first-pass filter that keeps the costly
//! external model out of the common case.
pub mod extract_tests;
pub mod incident_kind;
pub mod keywords;

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::extract::incident_kind::{CasualtyTag, IncidentKind};
use crate::extract::keywords::KeywordConfig;
use crate::gazetteer::{Gazetteer, GazetteerEntry};
use crate::llm::{ClassificationResult, LlmClassifier};
use crate::normalize::normalize;
use crate::store::{IncidentDetails, IncidentRecord, ThreatLevel};

// ─────────────────────────── Number extraction ────────────────────────────

/// Runs of Western, Arabic-Indic, or Eastern Arabic-Indic digits.
static NUMERIC_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new("[0-9\u{0660}-\u{0669}\u{06F0}-\u{06F9}]+").expect("numeric token regex")
});

fn fold_digit(ch: char) -> char {
    match ch {
        '\u{0660}'..='\u{0669}' => {
            char::from(b'0' + (ch as u32 - 0x0660) as u8)
        }
        '\u{06F0}'..='\u{06F9}' => {
            char::from(b'0' + (ch as u32 - 0x06F0) as u8)
        }
        other => other,
    }
}

/// Numeric tokens from raw text, folded to ASCII digits, in order of
/// appearance.  Tokens longer than `max_digits` are identifiers (phone
/// numbers, message ids), not counts, and would corrupt casualty-count
/// heuristics downstream — they are dropped.
pub fn extract_numbers(raw: &str, max_digits: usize) -> Vec<String> {
    NUMERIC_TOKEN
        .find_iter(raw)
        .filter_map(|m| {
            let token: String = m.as_str().chars().map(fold_digit).collect();
            (token.len() <= max_digits).then_some(token)
        })
        .collect()
}

// ─────────────────────────── Keyword classifier ───────────────────────────

/// Multi-label keyword classifier over normalized text.
///
/// Phrase tables come from an injected [`KeywordConfig`]; each phrase is
/// normalized once here so both sides of every `contains` agree.
pub struct KeywordClassifier {
    incident: Vec<(IncidentKind, Vec<String>)>,
    casualty: Vec<(CasualtyTag, Vec<String>)>,
    no_threat: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(config: KeywordConfig) -> Self {
        fn normalize_set(phrases: Vec<String>) -> Vec<String> {
            phrases
                .into_iter()
                .map(|p| normalize(&p))
                .filter(|p| !p.is_empty())
                .collect()
        }

        Self {
            incident: config
                .incident
                .into_iter()
                .map(|(kind, phrases)| (kind, normalize_set(phrases)))
                .collect(),
            casualty: config
                .casualty
                .into_iter()
                .map(|(tag, phrases)| (tag, normalize_set(phrases)))
                .collect(),
            no_threat: normalize_set(config.no_threat),
        }
    }

    /// All incident types whose phrase sets match.  A message can describe
    /// a fire and the medical response at once — every match becomes an
    /// independent candidate record downstream.
    pub fn classify_incident(&self, normalized: &str) -> Vec<IncidentKind> {
        self.incident
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| normalized.contains(p.as_str())))
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn classify_casualties(&self, normalized: &str) -> Vec<CasualtyTag> {
        self.casualty
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| normalized.contains(p.as_str())))
            .map(|(tag, _)| *tag)
            .collect()
    }

    /// Explicit no-threat phrase present ("لا تهديد").
    pub fn is_no_threat(&self, normalized: &str) -> bool {
        self.no_threat.iter().any(|p| normalized.contains(p.as_str()))
    }
}

// ───────────────────────────── Pipeline ──────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Summary excerpt bound, in characters.
    pub summary_max_chars: usize,
    /// Numeric tokens longer than this many digits are dropped.
    pub max_number_digits: usize,
    /// Accept an external-model location only when the matched place name
    /// also occurs in the message text (hallucination guard).
    pub strict_llm_location: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_max_chars: 300,
            max_number_digits: 6,
            strict_llm_location: true,
        }
    }
}

impl PipelineConfig {
    /// | Env var               | Default | Purpose                               |
    /// |-----------------------|---------|---------------------------------------|
    /// | `SUMMARY_MAX_CHARS`   | `300`   | Summary excerpt bound                 |
    /// | `MAX_NUMBER_DIGITS`   | `6`     | Longest numeric token kept as a count |
    /// | `LLM_LOCATION_STRICT` | `true`  | Hallucination guard on model location |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            summary_max_chars: std::env::var("SUMMARY_MAX_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.summary_max_chars),
            max_number_digits: std::env::var("MAX_NUMBER_DIGITS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_number_digits),
            strict_llm_location: std::env::var("LLM_LOCATION_STRICT")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.strict_llm_location),
        }
    }
}

/// One decision per incoming message: candidate records, or nothing.
pub struct ExtractionPipeline {
    gazetteer: Arc<Gazetteer>,
    classifier: KeywordClassifier,
    llm: LlmClassifier,
    config: PipelineConfig,
}

impl ExtractionPipeline {
    pub fn new(
        gazetteer: Arc<Gazetteer>,
        classifier: KeywordClassifier,
        llm: LlmClassifier,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gazetteer,
            classifier,
            llm,
            config,
        }
    }

    /// Run one message through the full pipeline.
    ///
    /// Normalization, classification, and gazetteer lookup are pure and
    /// cannot fail; the only suspension point is the external call, which
    /// fails soft.  An empty return means the message was rejected — a
    /// frequent, normal outcome.
    pub async fn process(
        &self,
        channel: &str,
        message_id: i64,
        date: &str,
        raw: &str,
    ) -> Vec<IncidentRecord> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut kinds = self.classifier.classify_incident(&normalized);
        let mut place = self.gazetteer.lookup(&normalized).cloned();
        let mut threat = if self.classifier.is_no_threat(&normalized) {
            ThreatLevel::No
        } else {
            ThreatLevel::Yes
        };

        // Consult the external model only when a local signal is missing.
        if (kinds.is_empty() || place.is_none()) && self.llm.is_enabled() {
            let external = self.llm.classify(raw).await;
            self.merge_external(&normalized, external, &mut kinds, &mut place, &mut threat);
        }

        let Some(place) = place else {
            debug!("No resolvable location – rejecting message {channel}/{message_id}");
            return Vec::new();
        };
        if kinds.is_empty() {
            debug!("No incident type – rejecting message {channel}/{message_id}");
            return Vec::new();
        }

        let details = IncidentDetails {
            numbers_found: extract_numbers(raw, self.config.max_number_digits),
            casualties: self.classifier.classify_casualties(&normalized),
            summary: summarize(raw, self.config.summary_max_chars),
        };

        kinds
            .into_iter()
            .map(|kind| IncidentRecord {
                incident_type: kind,
                location: place.canonical_name.clone(),
                coordinates: (place.longitude, place.latitude),
                channel: channel.to_string(),
                message_id,
                date: date.to_string(),
                threat_level: threat,
                details: details.clone(),
            })
            .collect()
    }

    /// Fold a validated subset of the untrusted external result into the
    /// local signals.  Unvalidated fields are discarded, never propagated.
    fn merge_external(
        &self,
        normalized: &str,
        external: ClassificationResult,
        kinds: &mut Vec<IncidentKind>,
        place: &mut Option<GazetteerEntry>,
        threat: &mut ThreatLevel,
    ) {
        if kinds.is_empty() {
            if let Some(types) = &external.incident_type {
                for name in types.values() {
                    match IncidentKind::from_variant_name(name) {
                        Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
                        Some(_) => {}
                        None => debug!("Discarding unknown external incident type {name:?}"),
                    }
                }
            }
        }

        if place.is_none() {
            if let Some(loc) = &external.location {
                let normalized_loc = normalize(loc);
                match self.gazetteer.lookup(&normalized_loc) {
                    Some(entry)
                        if !self.config.strict_llm_location
                            || normalized.contains(entry.normalized_name.as_str()) =>
                    {
                        *place = Some(entry.clone());
                    }
                    Some(entry) => debug!(
                        "External location {:?} not present in message text – discarded",
                        entry.canonical_name
                    ),
                    None => debug!("External location {loc:?} not in gazetteer – discarded"),
                }
            }
        }

        if let Some(level) = &external.threat_level {
            // Only the exact values are trusted; anything else fails open
            // toward higher perceived threat.
            *threat = match level.trim().to_lowercase().as_str() {
                "no" => ThreatLevel::No,
                "yes" => ThreatLevel::Yes,
                _ => ThreatLevel::Yes,
            };
        }
    }
}

impl fmt::Display for ExtractionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExtractionPipeline(places={}, summary_max={}, max_digits={}, strict_location={})",
            self.gazetteer.len(),
            self.config.summary_max_chars,
            self.config.max_number_digits,
            self.config.strict_llm_location,
        )
    }
}

/// Bounded excerpt of the raw text, `...` marker when truncated.
fn summarize(raw: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
