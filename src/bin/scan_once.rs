//! Runs a single scan over the configured sources and prints each outcome as it lands.
//! `AI_TEST_MODE=mock` swaps the chat endpoint for a fixed answer.

use std::sync::Arc;

use feed_desk::ai_adapter::build_chat_client;
use feed_desk::api::CONNECTIVITY_HINT;
use feed_desk::config::sources::load_sources_default;
use feed_desk::{scan, DashboardConfig, HttpFeedFetcher, OutcomeStatus, ScanError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    feed_desk::init_tracing();

    let settings = DashboardConfig::load_default();
    let sources = load_sources_default()?;

    let mut running = match scan(
        &sources,
        settings.run_configuration(),
        Arc::new(HttpFeedFetcher::new()),
        build_chat_client(),
    ) {
        Ok(s) => s,
        Err(ScanError::NoActiveSources) => {
            println!("no active sources; enable at least one in the sources file");
            return Ok(());
        }
    };

    while let Some(u) = running.next().await {
        let o = &u.outcome;
        print!(
            "[{}/{} {:>3.0}%] {}: ",
            u.completed,
            u.total,
            u.progress() * 100.0,
            o.source_name
        );
        match &o.status {
            OutcomeStatus::Success { payload } => {
                println!("{}\n  {}\n  {}\n", payload.title, payload.link, payload.analysis);
            }
            OutcomeStatus::Failed { error } if o.is_connectivity_failure() => {
                println!("{CONNECTIVITY_HINT} ({error})");
            }
            OutcomeStatus::Failed { error } => println!("failed: {error}"),
            OutcomeStatus::Empty => println!("feed has no entries"),
            OutcomeStatus::Skipped => println!("skipped"),
        }
    }

    println!("scan-once done");
    Ok(())
}
