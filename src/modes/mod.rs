mod ingest;
mod shared;
mod watch;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    /// Process a feed dump once and exit.
    Ingest,
    /// Follow the feed file for new messages indefinitely.
    Watch,
}

impl RunMode {
    fn from_env() -> Self {
        let raw = std::env::var("RUN_MODE").unwrap_or_else(|_| "ingest".into());
        match raw.trim().to_lowercase().as_str() {
            "watch" | "live" => Self::Watch,
            _ => Self::Ingest,
        }
    }
}

pub async fn run_from_env() -> Result<()> {
    match RunMode::from_env() {
        RunMode::Ingest => ingest::run().await,
        RunMode::Watch => watch::run().await,
    }
}
