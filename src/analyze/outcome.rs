// src/analyze/outcome.rs
//! Tagged per-source result of one scan.

use serde::Serialize;

/// What a successful analysis carries to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisPayload {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub analysis: String,
}

/// Closed status set: the payload exists only on success, the message only on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success { payload: AnalysisPayload },
    Skipped,
    Empty,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    #[serde(rename = "source")]
    pub source_name: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl AnalysisOutcome {
    pub fn success(source_name: impl Into<String>, payload: AnalysisPayload) -> Self {
        Self::with_status(source_name, OutcomeStatus::Success { payload })
    }

    pub fn skipped(source_name: impl Into<String>) -> Self {
        Self::with_status(source_name, OutcomeStatus::Skipped)
    }

    pub fn empty(source_name: impl Into<String>) -> Self {
        Self::with_status(source_name, OutcomeStatus::Empty)
    }

    pub fn failed(source_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::with_status(
            source_name,
            OutcomeStatus::Failed {
                error: error.into(),
            },
        )
    }

    fn with_status(source_name: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            source_name: source_name.into(),
            status,
        }
    }

    /// Wire label: `success`, `skipped`, `empty` or `failed`.
    pub fn status_label(&self) -> &'static str {
        match self.status {
            OutcomeStatus::Success { .. } => "success",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Empty => "empty",
            OutcomeStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn payload(&self) -> Option<&AnalysisPayload> {
        match &self.status {
            OutcomeStatus::Success { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Failure that looks like a network/proxy problem rather than a bad feed or key.
    pub fn is_connectivity_failure(&self) -> bool {
        self.error_message().is_some_and(|e| {
            let e = e.to_ascii_lowercase();
            ["connect", "timed out", "timeout", "dns error", "proxy"]
                .iter()
                .any(|needle| e.contains(needle))
        })
    }
}
