//! feed-desk — Service Entrypoint
//! Boots the Axum HTTP server: scan API, source/settings views and `/metrics`.

use feed_desk::api::{self, AppState};
use feed_desk::metrics::Metrics;
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // This enables OPENAI_API_KEY / FEED_DESK_* overrides from .env.
    let _ = dotenvy::dotenv();

    feed_desk::init_tracing();

    let state = AppState::from_env()?;
    let mut router = api::router(state);

    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "prometheus recorder not installed"),
    }

    Ok(router.into())
}
