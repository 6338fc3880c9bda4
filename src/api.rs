use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::analyze::ai_adapter::{build_chat_client, ChatClient};
use crate::analyze::AnalysisOutcome;
use crate::config::sources::{
    load_sources_default, normalize_sources, save_sources_to, sources_path_default,
};
use crate::config::{DashboardConfig, Source};
use crate::ingest::{FeedFetcher, HttpFeedFetcher};
use crate::scan::{active_sources, scan, ScanError, ScanUpdate};

pub const CONNECTIVITY_HINT: &str = "unreachable, check proxy settings";

/// Files that edits made through the API are written back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub settings: PathBuf,
    pub sources: PathBuf,
}

impl StorePaths {
    /// Same lookup the loaders use at boot.
    pub fn from_env() -> Self {
        Self {
            settings: DashboardConfig::default_path(),
            sources: sources_path_default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    settings: Arc<RwLock<DashboardConfig>>,
    sources: Arc<RwLock<Vec<Source>>>,
    fetcher: Arc<dyn FeedFetcher>,
    chat: Arc<dyn ChatClient>,
    /// `None` keeps edits in memory only.
    store: Option<StorePaths>,
}

impl AppState {
    pub fn new(
        settings: DashboardConfig,
        sources: Vec<Source>,
        fetcher: Arc<dyn FeedFetcher>,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            sources: Arc::new(RwLock::new(sources)),
            fetcher,
            chat,
            store: None,
        }
    }

    pub fn with_store(mut self, store: StorePaths) -> Self {
        self.store = Some(store);
        self
    }

    /// Settings and sources from their default locations, real HTTP clients.
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = DashboardConfig::load_default();
        let sources = load_sources_default()?;
        tracing::info!(sources = sources.len(), "sources loaded");
        Ok(Self::new(
            settings,
            sources,
            Arc::new(HttpFeedFetcher::new()),
            build_chat_client(),
        )
        .with_store(StorePaths::from_env()))
    }

    fn settings(&self) -> DashboardConfig {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sources(&self) -> Vec<Source> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/sources", get(list_sources).put(replace_sources))
        .route("/api/sources/active", get(list_active_sources))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/scan", post(run_scan))
        .route("/admin/reload", post(admin_reload))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<Source>> {
    Json(state.sources())
}

async fn list_active_sources(State(state): State<AppState>) -> Json<Vec<Source>> {
    Json(active_sources(&state.sources()))
}

#[derive(Serialize)]
struct SettingsOut {
    api_url: String,
    api_key_set: bool,
    proxy_url: String,
    models: Vec<String>,
    selected_model: String,
    system_prompt: String,
}

impl From<DashboardConfig> for SettingsOut {
    fn from(s: DashboardConfig) -> Self {
        Self {
            api_key_set: !s.api_key.trim().is_empty(),
            selected_model: s.selected_model(),
            api_url: s.api_url,
            proxy_url: s.proxy_url,
            models: s.models,
            system_prompt: s.system_prompt,
        }
    }
}

async fn get_settings(State(state): State<AppState>) -> Json<SettingsOut> {
    Json(state.settings().into())
}

/// Partial settings edit; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
struct SettingsIn {
    api_url: Option<String>,
    api_key: Option<String>,
    proxy_url: Option<String>,
    models: Option<Vec<String>>,
    selected_model: Option<String>,
    system_prompt: Option<String>,
}

impl SettingsIn {
    fn apply(self, s: &mut DashboardConfig) {
        if let Some(v) = self.api_url {
            s.api_url = v.trim().to_string();
        }
        if let Some(v) = self.api_key {
            s.api_key = v.trim().to_string();
        }
        if let Some(v) = self.proxy_url {
            s.proxy_url = v.trim().to_string();
        }
        if let Some(v) = self.models {
            s.models = v;
        }
        if let Some(v) = self.selected_model {
            s.selected_model = v;
        }
        if let Some(v) = self.system_prompt {
            s.system_prompt = v;
        }
    }
}

/// Apply, persist when a store is configured, then publish.
fn commit_settings(state: &AppState, edit: SettingsIn) -> anyhow::Result<DashboardConfig> {
    let mut current = state.settings.write().unwrap_or_else(PoisonError::into_inner);
    let mut next = current.clone();
    edit.apply(&mut next);
    if let Some(store) = &state.store {
        next.save_to(&store.settings)?;
    }
    *current = next.clone();
    Ok(next)
}

async fn update_settings(State(state): State<AppState>, body: Bytes) -> Response {
    let edit: SettingsIn = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, &format!("bad settings: {e}")),
    };
    match commit_settings(&state, edit) {
        Ok(saved) => {
            tracing::info!(
                model = %saved.selected_model(),
                persisted = state.store.is_some(),
                "settings updated"
            );
            Json(SettingsOut::from(saved)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "saving settings failed");
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("saving settings failed: {e:#}"),
            )
        }
    }
}

fn commit_sources(state: &AppState, incoming: Vec<Source>) -> anyhow::Result<Vec<Source>> {
    let cleaned = normalize_sources(incoming);
    let mut current = state.sources.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(store) = &state.store {
        save_sources_to(&store.sources, &cleaned)?;
    }
    *current = cleaned.clone();
    Ok(cleaned)
}

/// Replace the whole source list.
async fn replace_sources(State(state): State<AppState>, body: Bytes) -> Response {
    let incoming: Vec<Source> = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, &format!("bad sources: {e}")),
    };
    match commit_sources(&state, incoming) {
        Ok(saved) => {
            tracing::info!(
                sources = saved.len(),
                persisted = state.store.is_some(),
                "sources updated"
            );
            Json(saved).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "saving sources failed");
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("saving sources failed: {e:#}"),
            )
        }
    }
}

/// Per-scan overrides of the stored settings.
#[derive(Debug, Default, Deserialize)]
struct ScanReq {
    model: Option<String>,
    system_prompt: Option<String>,
}

#[derive(Serialize)]
struct ScanLine<'a> {
    completed: usize,
    total: usize,
    progress: f32,
    outcome: &'a AnalysisOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

fn ndjson_line(u: &ScanUpdate) -> Bytes {
    let line = ScanLine {
        completed: u.completed,
        total: u.total,
        progress: u.progress(),
        outcome: &u.outcome,
        hint: u
            .outcome
            .is_connectivity_failure()
            .then_some(CONNECTIVITY_HINT),
    };
    let mut buf = serde_json::to_vec(&line).unwrap_or_default();
    buf.push(b'\n');
    Bytes::from(buf)
}

fn error_json(status: StatusCode, msg: &str) -> Response {
    (status, Json(serde_json::json!({ "error": msg }))).into_response()
}

/// Streams one NDJSON line per finished source, in completion order.
async fn run_scan(State(state): State<AppState>, body: Bytes) -> Response {
    let req: ScanReq = if body.iter().all(u8::is_ascii_whitespace) {
        ScanReq::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return error_json(StatusCode::BAD_REQUEST, &format!("bad scan request: {e}")),
        }
    };

    let mut config = state.settings().run_configuration();
    if let Some(m) = req.model.filter(|m| !m.trim().is_empty()) {
        config.model = m;
    }
    if let Some(p) = req.system_prompt {
        config.system_prompt = p;
    }

    let sources = state.sources();
    match scan(&sources, config, state.fetcher.clone(), state.chat.clone()) {
        Ok(running) => {
            let lines = running
                .into_stream()
                .map(|u| Ok::<_, Infallible>(ndjson_line(&u)));
            (
                [(header::CONTENT_TYPE, "application/x-ndjson")],
                Body::from_stream(lines),
            )
                .into_response()
        }
        Err(e @ ScanError::NoActiveSources) => error_json(StatusCode::CONFLICT, &e.to_string()),
    }
}

/// Re-read settings and sources from disk.
async fn admin_reload(State(state): State<AppState>) -> Response {
    let fresh_sources = match load_sources_default() {
        Ok(v) => v,
        Err(e) => {
            return error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("reload failed: {e:#}"),
            )
        }
    };
    let fresh_settings = DashboardConfig::load_default();
    let n = fresh_sources.len();
    *state.sources.write().unwrap_or_else(PoisonError::into_inner) = fresh_sources;
    *state.settings.write().unwrap_or_else(PoisonError::into_inner) = fresh_settings;
    (StatusCode::OK, format!("reloaded {n} sources")).into_response()
}
