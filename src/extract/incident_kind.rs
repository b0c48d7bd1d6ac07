// ──────────────────────────── Incident kinds ─────────────────────────────

use serde::{Deserialize, Serialize};

/// Closed set of incident categories shown on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Fire,
    Accident,
    Shooting,
    Earthquake,
    Flood,
    Explosion,
    Protest,
    Medical,
    Airstrike,
    Collapse,
    Other, // incident-sounding but unclassified
}

impl IncidentKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::Accident => "accident",
            Self::Shooting => "shooting",
            Self::Earthquake => "earthquake",
            Self::Flood => "flood",
            Self::Explosion => "explosion",
            Self::Protest => "protest",
            Self::Medical => "medical",
            Self::Airstrike => "airstrike",
            Self::Collapse => "collapse",
            Self::Other => "other",
        }
    }

    /// Parse from untrusted model output or a config key.  Case-insensitive,
    /// tolerant of the spellings observed across feed variants.
    pub fn from_variant_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fire" => Some(Self::Fire),
            "accident" | "vehicle_accident" | "crash" => Some(Self::Accident),
            "shooting" => Some(Self::Shooting),
            "earthquake" => Some(Self::Earthquake),
            "flood" | "flooding" => Some(Self::Flood),
            "explosion" => Some(Self::Explosion),
            "protest" => Some(Self::Protest),
            "medical" => Some(Self::Medical),
            "airstrike" => Some(Self::Airstrike),
            "collapse" => Some(Self::Collapse),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Casualty mention categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasualtyTag {
    Killed,
    Injured,
    Missing,
}

impl CasualtyTag {
    pub fn from_variant_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "killed" => Some(Self::Killed),
            "injured" => Some(Self::Injured),
            "missing" => Some(Self::Missing),
            _ => None,
        }
    }
}
