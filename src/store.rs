//! Incident record model and the flat-file JSON store.
//!
//! The store is the map front-end's data source: one JSON array of records,
//! UTF-8 with Arabic text kept readable (serde_json does not escape
//! non-ASCII).  Read-entire/write-entire semantics — fine at this system's
//! single-process throughput.
//!
//! Concurrency discipline: the store is owned exclusively by one writer
//! task ([`run_writer`]); workers hand accepted candidates over a channel.
//! Two concurrent workers can therefore never both read the same "existing"
//! state and append duplicate survivors.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dedupe::{self, Admission};
use crate::extract::incident_kind::{CasualtyTag, IncidentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentDetails {
    pub numbers_found: Vec<String>,
    pub casualties: Vec<CasualtyTag>,
    pub summary: String,
}

/// One extracted incident, as persisted and served to the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub incident_type: IncidentKind,
    pub location: String,
    /// `[longitude, latitude]` on the wire.
    pub coordinates: (f64, f64),
    pub channel: String,
    pub message_id: i64,
    /// ISO-8601 timestamp of the source message.
    pub date: String,
    pub threat_level: ThreatLevel,
    pub details: IncidentDetails,
}

pub struct IncidentStore {
    path: PathBuf,
    records: Vec<IncidentRecord>,
    /// In-memory state not yet on disk (previous write failed).
    dirty: bool,
}

impl IncidentStore {
    /// Read the whole collection.  A missing file is an empty store; an
    /// unreadable or corrupt file is an error for the caller — silently
    /// resetting would overwrite the previous store on the next write.
    pub fn load(path: &str) -> Result<Self> {
        let path = PathBuf::from(path);
        let records = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read incident store {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("corrupt incident store {}", path.display()))?
        } else {
            Vec::new()
        };
        info!("Incident store opened at {} ({} records)", path.display(), records.len());
        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }

    /// Owned copy of the current collection.  Consumers that need a
    /// consistent view (e.g. the map-serving layer) take a snapshot instead
    /// of re-reading the backing file on a timer.
    pub fn snapshot(&self) -> Vec<IncidentRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Run the dedup decision for one candidate and apply it.
    ///
    /// Persists after every change; a failed write keeps the collection in
    /// memory and is retried on the next admitted candidate rather than
    /// crashing ingestion or dropping the record.
    pub fn admit(&mut self, candidate: IncidentRecord) -> Admission {
        let decision = dedupe::admit(&candidate, &self.records);
        match decision {
            Admission::Append => {
                self.records.push(candidate);
                self.dirty = true;
            }
            Admission::Replace(index) => {
                self.records[index] = candidate;
                self.dirty = true;
            }
            Admission::Discard => {}
        }

        if self.dirty {
            if let Err(e) = self.persist() {
                warn!("Incident store write failed (will retry on next write): {e:#}");
            }
        }
        decision
    }

    /// Write the whole collection back, pretty-printed, Arabic readable.
    pub fn persist(&mut self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)
            .context("failed to serialize incident store")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write incident store {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}

/// The single writer task.  Owns the store for the process lifetime and
/// drains accepted candidates until every sender is dropped.  Returns the
/// final record count.
pub async fn run_writer(mut store: IncidentStore, mut rx: mpsc::Receiver<IncidentRecord>) -> usize {
    while let Some(candidate) = rx.recv().await {
        let label = candidate.incident_type.label();
        let location = candidate.location.clone();
        let channel = candidate.channel.clone();
        match store.admit(candidate) {
            Admission::Append => info!("[MATCH] {label} @ {location} from {channel}"),
            Admission::Replace(_) => {
                info!("[MATCH] {label} @ {location} from {channel} (richer duplicate, replaced)")
            }
            Admission::Discard => {}
        }
    }
    store.len()
}
