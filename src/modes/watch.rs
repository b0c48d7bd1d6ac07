use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::shared::{FeedMessage, must_env, parse_bool_env, start_pipeline};

/// Follow the feed file for appended lines, indefinitely — the stand-in for
/// a live message stream.  The scraper collaborator appends one JSON object
/// per line; we pick up whole lines only, leaving a partially written tail
/// for the next poll.
pub(super) async fn run() -> Result<()> {
    let feed_path = must_env("FEED_PATH")?;
    let poll_ms: u64 = std::env::var("WATCH_POLL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(1000);
    let from_start = parse_bool_env("WATCH_FROM_START", false);

    let handles = start_pipeline().await?;

    let mut offset: u64 = if from_start {
        0
    } else {
        std::fs::metadata(&feed_path).map(|m| m.len()).unwrap_or(0)
    };
    info!("Watching {feed_path} from offset {offset} (poll every {poll_ms}ms)");

    loop {
        match read_new_lines(&feed_path, offset) {
            Ok((lines, new_offset)) => {
                offset = new_offset;
                for (line_no, line) in lines {
                    match serde_json::from_str::<FeedMessage>(&line) {
                        Ok(message) => {
                            if handles.queue.send(message).await.is_err() {
                                warn!("Pipeline queue closed – stopping watch");
                                return Ok(());
                            }
                        }
                        Err(e) => warn!("Skipping invalid feed JSON (line ~{line_no}): {e}"),
                    }
                }
            }
            Err(e) => warn!("Feed read failed (will retry): {e:#}"),
        }

        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }
}

/// Complete lines appended since `offset`, plus the new offset.
/// A shrunken file means rotation — start over from the beginning.
fn read_new_lines(path: &str, mut offset: u64) -> Result<(Vec<(usize, String)>, u64)> {
    let len = std::fs::metadata(path)
        .with_context(|| format!("failed to stat feed file {path}"))?
        .len();
    if len < offset {
        info!("Feed file shrank ({len} < {offset}) – assuming rotation, restarting");
        offset = 0;
    }
    if len == offset {
        return Ok((Vec::new(), offset));
    }

    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open feed file {path}"))?;
    file.seek(SeekFrom::Start(offset))
        .with_context(|| format!("failed to seek feed file {path}"))?;

    let mut buffer = String::new();
    file.read_to_string(&mut buffer)
        .with_context(|| format!("failed to read feed file {path}"))?;

    // Only consume up to the last newline; the tail may still be mid-write.
    let Some(consumed) = buffer.rfind('\n').map(|i| i + 1) else {
        return Ok((Vec::new(), offset));
    };

    let lines = buffer[..consumed]
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i + 1, l.to_string()))
        .collect();

    Ok((lines, offset + consumed as u64))
}
