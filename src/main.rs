mod dedupe;
mod extract;
mod gazetteer;
mod llm;
mod modes;
mod normalize;
mod store;

use anyhow::Result;
use dotenvy::dotenv;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    modes::run_from_env().await
}
