//! In-memory place-name index built from geographic reference data.
//!
//! The reference files are the output of the shapefile conversion tooling:
//! JSON arrays of `{ "name": ..., "coordinates": ... }` where `coordinates`
//! is either a bare `[lon, lat]` point or an arbitrarily nested
//! polygon/multipolygon ring structure.  Rings are reduced to the arithmetic
//! centroid of their leaf points at build time.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::normalize::normalize;

/// One raw record from the reference data, coordinates still unreduced.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlace {
    pub name: String,
    pub coordinates: Value,
}

/// A resolved place: canonical display name plus centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct GazetteerEntry {
    pub canonical_name: String,
    pub normalized_name: String,
    pub longitude: f64,
    pub latitude: f64,
}

/// Longest place name we attempt to match, in whitespace tokens.
const MAX_WINDOW: usize = 3;

pub struct Gazetteer {
    by_name: HashMap<String, GazetteerEntry>,
}

impl Gazetteer {
    /// Index raw reference records.
    ///
    /// Skips entries with an empty or non-Arabic name and entries whose
    /// geometry yields no centroid.  When two raw names normalize to the
    /// same key the first-registered mapping wins; later ones are logged
    /// and dropped rather than silently overwritten.
    pub fn build(places: impl IntoIterator<Item = RawPlace>) -> Self {
        let mut by_name: HashMap<String, GazetteerEntry> = HashMap::new();

        for place in places {
            let name = place.name.trim();
            if name.is_empty() || !has_arabic(name) {
                continue;
            }
            let Some((longitude, latitude)) = centroid(&place.coordinates) else {
                debug!("No resolvable centroid for {name:?} – skipping");
                continue;
            };
            let normalized = normalize(name);
            if normalized.is_empty() {
                continue;
            }

            if by_name.contains_key(&normalized) {
                debug!("Duplicate normalized name {normalized:?} – keeping first");
                continue;
            }
            by_name.insert(
                normalized.clone(),
                GazetteerEntry {
                    canonical_name: name.to_string(),
                    normalized_name: normalized,
                    longitude,
                    latitude,
                },
            );
        }

        Self { by_name }
    }

    /// Load reference data from a JSON file, or from every `*.json` file in
    /// a directory (the converter writes one file per admin level).
    pub fn load(path: &str) -> Result<Self> {
        let p = Path::new(path);
        let mut places: Vec<RawPlace> = Vec::new();

        if p.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(p)
                .with_context(|| format!("failed to read gazetteer directory {path}"))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();
            for file in entries {
                places.extend(load_file(&file)?);
            }
        } else {
            places = load_file(p)?;
        }

        let gazetteer = Self::build(places);
        info!("Gazetteer loaded: {} places from {path}", gazetteer.len());
        Ok(gazetteer)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Find a known place mentioned in normalized text.
    ///
    /// Tokenizes on whitespace and tries 3-word windows first, then 2-word,
    /// then single tokens, so that "بيت مري" resolves to the two-word town
    /// and not to whatever a single token happens to collide with.  Absence
    /// is a normal outcome; the caller falls back to the external model.
    pub fn lookup(&self, normalized_text: &str) -> Option<&GazetteerEntry> {
        let tokens: Vec<&str> = normalized_text.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }

        for window in (1..=MAX_WINDOW.min(tokens.len())).rev() {
            for start in 0..=tokens.len() - window {
                let candidate = tokens[start..start + window].join(" ");
                if let Some(entry) = self.by_name.get(&candidate) {
                    return Some(entry);
                }
            }
        }
        None
    }
}

fn load_file(path: &Path) -> Result<Vec<RawPlace>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gazetteer file {}", path.display()))?;
    let places: Vec<RawPlace> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid gazetteer JSON in {}", path.display()))?;
    Ok(places)
}

fn has_arabic(text: &str) -> bool {
    text.chars().any(|ch| matches!(ch, '\u{0600}'..='\u{06FF}'))
}

/// Reduce an arbitrarily nested coordinate structure to its centroid.
///
/// Leaf shape is `[x, y]` (possibly with extra members, as some exports
/// carry elevation); anything deeper is recursed into.  Returns `None` for
/// geometries containing no numeric leaf pair.
fn centroid(value: &Value) -> Option<(f64, f64)> {
    let mut sum = (0.0, 0.0);
    let mut count = 0usize;
    accumulate(value, &mut sum, &mut count);
    if count == 0 {
        return None;
    }
    Some((sum.0 / count as f64, sum.1 / count as f64))
}

fn accumulate(value: &Value, sum: &mut (f64, f64), count: &mut usize) {
    let Value::Array(items) = value else {
        return;
    };
    if items.len() >= 2 {
        if let (Some(x), Some(y)) = (items[0].as_f64(), items[1].as_f64()) {
            sum.0 += x;
            sum.1 += y;
            *count += 1;
            return;
        }
    }
    for item in items {
        accumulate(item, sum, count);
    }
}
