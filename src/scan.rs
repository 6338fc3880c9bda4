//! # Scan Coordinator
//! Fans the analysis worker out over all active sources with at most
//! `MAX_IN_FLIGHT` workers past the gate at once, and hands outcomes back in
//! completion order (not list order).
//!
//! Workers are fully isolated: a failed, empty or even panicked worker still
//! yields exactly one outcome for its source and never delays the others.
//! Dropping a `Scan` aborts whatever is still running.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, Stream};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

use crate::analyze::ai_adapter::ChatClient;
use crate::analyze::{analyze, AnalysisOutcome};
use crate::config::{RunConfiguration, Source};
use crate::ingest::FeedFetcher;

/// Concurrency cap, independent of the number of sources.
pub const MAX_IN_FLIGHT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// Nothing to do; distinct from a failed scan.
    #[error("no active sources")]
    NoActiveSources,
}

/// Enabled sources, order preserved.
pub fn active_sources(all: &[Source]) -> Vec<Source> {
    all.iter().filter(|s| s.enabled).cloned().collect()
}

/// One completed worker plus overall progress.
#[derive(Debug, Clone, Serialize)]
pub struct ScanUpdate {
    pub completed: usize,
    pub total: usize,
    pub outcome: AnalysisOutcome,
}

impl ScanUpdate {
    /// `completed / total`, in `(0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f32 / self.total as f32
    }
}

/// A running scan. Not restartable.
pub struct Scan {
    tasks: JoinSet<AnalysisOutcome>,
    names: HashMap<Id, String>,
    completed: usize,
    total: usize,
}

/// Start a scan over `sources`. Must be called within a Tokio runtime.
///
/// Returns `ScanError::NoActiveSources` when every source is disabled.
pub fn scan(
    sources: &[Source],
    config: RunConfiguration,
    fetcher: Arc<dyn FeedFetcher>,
    chat: Arc<dyn ChatClient>,
) -> Result<Scan, ScanError> {
    let active = active_sources(sources);
    if active.is_empty() {
        tracing::info!(target: "scan", configured = sources.len(), "no active sources");
        return Err(ScanError::NoActiveSources);
    }

    crate::metrics::ensure_metrics_described();
    counter!("scan_runs_total").increment(1);
    gauge!("scan_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

    let total = active.len();
    tracing::info!(
        target: "scan",
        total,
        model = %config.model,
        proxy = config.proxy.is_some(),
        "scan started"
    );

    let limiter = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let config = Arc::new(config);
    let mut tasks = JoinSet::new();
    let mut names = HashMap::with_capacity(total);

    for source in active {
        let limiter = Arc::clone(&limiter);
        let config = Arc::clone(&config);
        let fetcher = Arc::clone(&fetcher);
        let chat = Arc::clone(&chat);
        let name = source.name.clone();

        let handle = tasks.spawn(async move {
            let Ok(_permit) = limiter.acquire_owned().await else {
                return AnalysisOutcome::failed(&source.name, "scan cancelled");
            };
            let _in_flight = InFlight::enter();
            analyze(&source, &config, fetcher.as_ref(), chat.as_ref()).await
        });
        names.insert(handle.id(), name);
    }

    Ok(Scan {
        tasks,
        names,
        completed: 0,
        total,
    })
}

/// Keeps `scan_in_flight` honest when a worker panics or is aborted.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!("scan_in_flight").increment(1.0);
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!("scan_in_flight").decrement(1.0);
    }
}

impl Scan {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Next finished worker, or `None` once all `total` outcomes were yielded.
    pub async fn next(&mut self) -> Option<ScanUpdate> {
        let joined = self.tasks.join_next_with_id().await?;
        let outcome = match joined {
            Ok((id, outcome)) => {
                self.names.remove(&id);
                outcome
            }
            Err(e) => {
                let name = self.names.remove(&e.id()).unwrap_or_default();
                tracing::error!(target: "scan", source = %name, error = %e, "worker task died");
                AnalysisOutcome::failed(name, format!("worker task failed: {e}"))
            }
        };

        self.completed += 1;
        counter!("scan_outcomes_total", "status" => outcome.status_label()).increment(1);
        tracing::info!(
            target: "scan",
            source = %outcome.source_name,
            status = outcome.status_label(),
            completed = self.completed,
            total = self.total,
            "outcome ready"
        );
        if self.completed == self.total {
            tracing::info!(target: "scan", total = self.total, "scan finished");
        }

        Some(ScanUpdate {
            completed: self.completed,
            total: self.total,
            outcome,
        })
    }

    /// Drain the remaining updates in completion order.
    pub async fn collect_all(mut self) -> Vec<ScanUpdate> {
        let mut out = Vec::with_capacity(self.total - self.completed);
        while let Some(u) = self.next().await {
            out.push(u);
        }
        out
    }

    pub fn into_stream(self) -> impl Stream<Item = ScanUpdate> + Send {
        stream::unfold(self, |mut scan| async move {
            let update = scan.next().await?;
            Some((update, scan))
        })
    }
}
