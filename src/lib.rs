// src/lib.rs
// Public library surface for the service binary, the one-shot scanner and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod scan;

mod net;

// ---- Re-exports for stable public API ----
pub use crate::analyze::ai_adapter;
pub use crate::analyze::{analyze, AnalysisOutcome, AnalysisPayload, OutcomeStatus};
pub use crate::api::router;
pub use crate::config::{DashboardConfig, RunConfiguration, Source};
pub use crate::ingest::types::{FeedDocument, FetchedEntry};
pub use crate::ingest::{FeedFetcher, FetchError, HttpFeedFetcher};
pub use crate::net::error_chain;
pub use crate::scan::{active_sources, scan, Scan, ScanError, ScanUpdate, MAX_IN_FLIGHT};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs filtered by `RUST_LOG` (default `feed_desk=info,warn`).
/// Safe to call when a subscriber is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_desk=info,scan=info,ingest=info,llm=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
