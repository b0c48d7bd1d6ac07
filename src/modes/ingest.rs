use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::info;

use super::shared::{load_feed, must_env, start_pipeline};

/// One-shot ingestion: run a whole feed dump through the pipeline, report,
/// exit.  `REPLAY_STEP_MS` inserts a fixed delay between messages to replay
/// a dump at a realistic pace.
pub(super) async fn run() -> Result<()> {
    let feed_path = must_env("FEED_PATH")?;
    let messages = load_feed(&feed_path)?;
    if messages.is_empty() {
        return Err(anyhow!("Feed is empty: {feed_path}"));
    }

    let step_ms: Option<u64> = std::env::var("REPLAY_STEP_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0);

    let handles = start_pipeline().await?;
    info!("Ingest started: {} messages from {feed_path}", messages.len());

    let total = messages.len();
    for (idx, message) in messages.into_iter().enumerate() {
        if idx > 0 {
            if let Some(ms) = step_ms {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
        if handles.queue.send(message).await.is_err() {
            return Err(anyhow!("Pipeline queue closed unexpectedly"));
        }
    }

    let stats = handles.stats.clone();
    let stored = handles.shutdown().await;

    info!(
        "Ingest complete: total={total}, accepted={}, rejected={}, store size={stored}",
        stats.accepted(),
        stats.rejected(),
    );
    Ok(())
}
