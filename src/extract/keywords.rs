//! Curated keyword tables and their configuration object.
//!
//! The tables are an explicit, injectable [`KeywordConfig`] rather than
//! module-level statics: production uses the built-in Lebanon set (or a JSON
//! override file), tests inject small fixtures.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::extract::incident_kind::{CasualtyTag, IncidentKind};

/// Keyword phrase tables, one sequence of phrases per label.
///
/// Phrases are matched as substrings of *normalized* text; the classifier
/// normalizes them at construction so config files may contain diacritics
/// or typographic variants freely.
#[derive(Debug, Clone)]
pub struct KeywordConfig {
    pub incident: Vec<(IncidentKind, Vec<String>)>,
    pub casualty: Vec<(CasualtyTag, Vec<String>)>,
    /// Phrases that explicitly negate a threat ("لا تهديد").
    pub no_threat: Vec<String>,
}

impl KeywordConfig {
    /// Built-in bilingual set for the Lebanon feeds.
    pub fn default_lebanon() -> Self {
        fn owned(phrases: &[&str]) -> Vec<String> {
            phrases.iter().map(|p| p.to_string()).collect()
        }

        Self {
            incident: vec![
                (
                    IncidentKind::Fire,
                    owned(&[
                        // AR
                        "حريق",
                        "احتراق",
                        "اشتعال",
                        "حرق",
                        "الدفاع المدني",
                        "إطفاء",
                        "نيران",
                        // EN
                        "fire",
                        "burning",
                        "flames",
                        "blaze",
                        "combustion",
                    ]),
                ),
                (
                    IncidentKind::Accident,
                    owned(&[
                        "حادث",
                        "حادثة",
                        "اصطدام",
                        "تصادم",
                        "دهس",
                        "accident",
                        "crash",
                        "collision",
                        "wreck",
                    ]),
                ),
                (
                    IncidentKind::Shooting,
                    owned(&[
                        "إطلاق نار",
                        "رصاص",
                        "مسلح",
                        "هجوم مسلح",
                        "shooting",
                        "gunfire",
                        "gunshots",
                    ]),
                ),
                (
                    IncidentKind::Earthquake,
                    owned(&[
                        "زلزال",
                        "هزة أرضية",
                        "نشاط زلزالي",
                        "earthquake",
                        "seismic",
                        "tremor",
                        "quake",
                    ]),
                ),
                (
                    IncidentKind::Flood,
                    owned(&[
                        "فيضان",
                        "سيول",
                        "غرق",
                        "flood",
                        "flooding",
                        "deluge",
                    ]),
                ),
                (
                    IncidentKind::Explosion,
                    owned(&[
                        "انفجار",
                        "تفجير",
                        "عبوة ناسفة",
                        "explosion",
                        "detonation",
                        "blast",
                    ]),
                ),
                (
                    IncidentKind::Protest,
                    owned(&[
                        "احتجاج",
                        "تظاهرة",
                        "مظاهرة",
                        "قطع طريق",
                        "protest",
                        "demonstration",
                        "riot",
                    ]),
                ),
                (
                    IncidentKind::Medical,
                    owned(&[
                        "إسعاف",
                        "مستشفى",
                        "طوارئ",
                        "ambulance",
                        "hospital",
                        "emergency",
                    ]),
                ),
                (
                    IncidentKind::Airstrike,
                    owned(&[
                        "غارة",
                        "غارة جوية",
                        "قصف جوي",
                        "airstrike",
                        "air raid",
                    ]),
                ),
                (
                    IncidentKind::Collapse,
                    owned(&["انهيار", "انهيار مبنى", "collapse", "building collapse"]),
                ),
            ],
            casualty: vec![
                (
                    CasualtyTag::Killed,
                    owned(&["قتيل", "قتلى", "شهيد", "وفاة", "killed", "dead", "death"]),
                ),
                (
                    CasualtyTag::Injured,
                    owned(&["جريح", "جرحى", "مصاب", "injured", "wounded"]),
                ),
                (
                    CasualtyTag::Missing,
                    owned(&["مفقود", "اختفى", "missing"]),
                ),
            ],
            no_threat: owned(&["لا تهديد", "no threat"]),
        }
    }

    /// Load an override file, or fall back to the built-in set.
    pub fn from_env() -> Result<Self> {
        match std::env::var("KEYWORDS_PATH") {
            Ok(path) => Self::load(&path),
            Err(_) => Ok(Self::default_lebanon()),
        }
    }

    /// Parse a JSON override of the shape
    /// `{"incident": {"fire": [..]}, "casualty": {"killed": [..]}, "no_threat": [..]}`.
    /// Unknown labels are an error, not a silent drop.
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keyword config {path}"))?;
        let file: KeywordFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid keyword config JSON in {path}"))?;

        let mut incident = Vec::new();
        for (label, phrases) in file.incident {
            let kind = IncidentKind::from_variant_name(&label)
                .ok_or_else(|| anyhow!("unknown incident type {label:?} in {path}"))?;
            incident.push((kind, phrases));
        }

        let mut casualty = Vec::new();
        for (label, phrases) in file.casualty {
            let tag = CasualtyTag::from_variant_name(&label)
                .ok_or_else(|| anyhow!("unknown casualty tag {label:?} in {path}"))?;
            casualty.push((tag, phrases));
        }

        Ok(Self {
            incident,
            casualty,
            no_threat: file.no_threat,
        })
    }
}

#[derive(Deserialize)]
struct KeywordFile {
    #[serde(default)]
    incident: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    casualty: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    no_threat: Vec<String>,
}
