use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::extract::keywords::KeywordConfig;
use crate::extract::{ExtractionPipeline, KeywordClassifier, PipelineConfig};
use crate::gazetteer::Gazetteer;
use crate::llm::LlmClassifier;
use crate::store::{self, IncidentRecord, IncidentStore};

/// One raw message from the ingestion feed, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct FeedMessage {
    pub channel: String,
    pub message_id: i64,
    /// ISO-8601 timestamp of the source message.
    pub date: String,
    pub text: String,
}

pub(super) fn must_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("Missing env var {key}"))
}

pub(super) fn parse_bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(default)
}

/// Load a whole feed file.  Malformed lines are logged and skipped —
/// one bad scrape must not kill a replay.
pub(super) fn load_feed(path: &str) -> Result<Vec<FeedMessage>> {
    let file = File::open(path).with_context(|| format!("failed to open feed file {path}"))?;
    let reader = BufReader::new(file);

    let mut messages = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FeedMessage>(&line) {
            Ok(message) => messages.push(message),
            Err(e) => warn!("Skipping invalid feed JSON at line {}: {e}", idx + 1),
        }
    }
    Ok(messages)
}

// ─────────────────────── Pipeline wiring ─────────────────────────────────

#[derive(Default)]
pub(super) struct PipelineStats {
    pub accepted: AtomicUsize,
    pub rejected: AtomicUsize,
}

impl PipelineStats {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Handles to a running extraction pipeline: the bounded ingestion queue,
/// live counters, and the tasks to join at shutdown.
pub(super) struct PipelineHandles {
    pub queue: mpsc::Sender<FeedMessage>,
    pub stats: Arc<PipelineStats>,
    workers: Vec<JoinHandle<()>>,
    writer: JoinHandle<usize>,
}

impl PipelineHandles {
    /// Close the queue, drain the workers and the writer, return the final
    /// store size.
    pub async fn shutdown(self) -> usize {
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
        self.writer.await.unwrap_or(0)
    }
}

/// Build every component from the environment and spawn the worker pool
/// plus the single store-writer task.
///
/// | Env var          | Default                   | Purpose                       |
/// |------------------|---------------------------|-------------------------------|
/// | `GAZETTEER_PATH` | —                         | Reference data file or dir    |
/// | `KEYWORDS_PATH`  | built-in set              | Keyword table override        |
/// | `INCIDENTS_PATH` | `./matched_incidents.json`| Persisted incident store      |
/// | `WORKERS`        | `4`                       | Pipeline worker tasks         |
/// | `QUEUE_CAPACITY` | `1024`                    | Bounded ingestion queue       |
pub(super) async fn start_pipeline() -> Result<PipelineHandles> {
    let gazetteer = Arc::new(Gazetteer::load(&must_env("GAZETTEER_PATH")?)?);
    if gazetteer.is_empty() {
        warn!("Gazetteer is empty – every message will need the external classifier");
    }

    let classifier = KeywordClassifier::new(KeywordConfig::from_env()?);
    let llm = LlmClassifier::from_env();
    info!("External classifier: {llm}");

    let pipeline = Arc::new(ExtractionPipeline::new(
        gazetteer,
        classifier,
        llm,
        PipelineConfig::from_env(),
    ));
    info!("Pipeline: {pipeline}");

    let store_path =
        std::env::var("INCIDENTS_PATH").unwrap_or_else(|_| "./matched_incidents.json".into());
    let incident_store = IncidentStore::load(&store_path)?;

    let worker_count: usize = std::env::var("WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(4);
    let queue_capacity: usize = std::env::var("QUEUE_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(1024);

    // Admitted candidates flow to one writer task that owns the store;
    // workers never touch it directly.
    let (admit_tx, admit_rx) = mpsc::channel::<IncidentRecord>(queue_capacity);
    let writer = tokio::spawn(store::run_writer(incident_store, admit_rx));

    let (queue_tx, queue_rx) = mpsc::channel::<FeedMessage>(queue_capacity);
    let queue_rx = Arc::new(Mutex::new(queue_rx));
    let stats = Arc::new(PipelineStats::default());

    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let pipeline = Arc::clone(&pipeline);
        let queue_rx = Arc::clone(&queue_rx);
        let admit_tx = admit_tx.clone();
        let stats = Arc::clone(&stats);

        workers.push(tokio::spawn(async move {
            loop {
                let message = { queue_rx.lock().await.recv().await };
                let Some(message) = message else {
                    break;
                };

                let records = pipeline
                    .process(&message.channel, message.message_id, &message.date, &message.text)
                    .await;

                if records.is_empty() {
                    stats.rejected.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                stats.accepted.fetch_add(1, Ordering::Relaxed);
                for record in records {
                    if admit_tx.send(record).await.is_err() {
                        warn!("Store writer is gone – dropping candidate");
                        return;
                    }
                }
            }
        }));
    }
    drop(admit_tx);

    info!("Extraction pipeline running with {worker_count} worker(s)");
    Ok(PipelineHandles {
        queue: queue_tx,
        stats,
        workers,
        writer,
    })
}
