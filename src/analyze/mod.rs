// src/analyze/mod.rs
//! Analysis worker: one source in, one tagged outcome out.
//!
//! Order per source:
//! 1) enabled gate (no network when disabled)
//! 2) feed fetch, first entry
//! 3) prompt build
//! 4) credential check, then a single chat call (no retries)
//!
//! Every error is turned into an `AnalysisOutcome` here; nothing propagates.

pub mod ai_adapter;
pub mod outcome;

use crate::analyze::ai_adapter::{ChatClient, ChatMessage, ChatRequest, LLM_TIMEOUT};
use crate::config::{RunConfiguration, Source};
use crate::ingest::types::FetchedEntry;
use crate::ingest::FeedFetcher;
use crate::net::error_chain;

// Re-export convenient types.
pub use crate::analyze::outcome::{AnalysisOutcome, AnalysisPayload, OutcomeStatus};

/// Summary characters sent to the model.
pub const SNIPPET_MAX_CHARS: usize = 800;
/// Shorter snippets are replaced by the title.
pub const SNIPPET_MIN_CHARS: usize = 10;

pub const MISSING_API_KEY: &str = "missing API key";

/// First `SNIPPET_MAX_CHARS` characters of the summary, or the title when
/// that leaves fewer than `SNIPPET_MIN_CHARS`.
pub fn summary_snippet(entry: &FetchedEntry) -> String {
    let snippet: String = entry.summary.chars().take(SNIPPET_MAX_CHARS).collect();
    if snippet.chars().count() < SNIPPET_MIN_CHARS {
        entry.title.clone()
    } else {
        snippet
    }
}

/// User-turn content: title line, then summary-snippet line.
pub fn build_user_prompt(entry: &FetchedEntry) -> String {
    format!("Title: {}\nSummary: {}", entry.title, summary_snippet(entry))
}

/// Analyze the latest entry of one source.
pub async fn analyze(
    source: &Source,
    config: &RunConfiguration,
    fetcher: &dyn FeedFetcher,
    chat: &dyn ChatClient,
) -> AnalysisOutcome {
    if !source.enabled {
        return AnalysisOutcome::skipped(&source.name);
    }

    let doc = match fetcher.fetch(&source.url, config.proxy.as_deref()).await {
        Ok(doc) => doc,
        Err(e) => return AnalysisOutcome::failed(&source.name, error_chain(&e)),
    };

    let Some(entry) = doc.first() else {
        tracing::debug!(target: "scan", source = %source.name, "feed has no entries");
        return AnalysisOutcome::empty(&source.name);
    };

    let user_prompt = build_user_prompt(entry);

    if !config.has_api_key() {
        return AnalysisOutcome::failed(&source.name, MISSING_API_KEY);
    }

    let request = ChatRequest {
        base_url: config.api_base.clone(),
        api_key: config.api_key.clone(),
        model: config.model.clone(),
        proxy: config.proxy.clone(),
        timeout: LLM_TIMEOUT,
        messages: vec![
            ChatMessage::system(config.system_prompt.clone()),
            ChatMessage::user(user_prompt),
        ],
    };

    match chat.complete(request).await {
        Ok(analysis) => AnalysisOutcome::success(
            &source.name,
            AnalysisPayload {
                title: entry.title.clone(),
                link: entry.link.clone(),
                summary: entry.summary.clone(),
                analysis,
            },
        ),
        Err(e) => {
            tracing::warn!(
                target: "llm",
                source = %source.name,
                provider = chat.provider_name(),
                error = %e,
                "chat call failed"
            );
            AnalysisOutcome::failed(&source.name, error_chain(&e))
        }
    }
}
