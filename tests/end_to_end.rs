// tests/end_to_end.rs
//
// Real HTTP fetcher and chat client, both pointed at one local axum server
// that plays feed host and chat endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use feed_desk::ai_adapter::OpenAiChatClient;
use feed_desk::api::AppState;
use feed_desk::{router, scan, DashboardConfig, HttpFeedFetcher, OutcomeStatus, Source};

const DESK_RSS: &str = include_str!("fixtures/desk_rss.xml");
const RESEARCH_ATOM: &str = include_str!("fixtures/research_atom.xml");
const EMPTY_RSS: &str = include_str!("fixtures/empty_rss.xml");

/// Answers with the first line of the user prompt so tests can see what was sent.
async fn chat(Json(body): Json<Value>) -> Json<Value> {
    let user = body["messages"][1]["content"].as_str().unwrap_or_default();
    let headline = user.lines().next().unwrap_or_default();
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": format!("Score 6/10. {headline}") } }]
    }))
}

async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/wire.xml", get(|| async { DESK_RSS }))
        .route("/notes.xml", get(|| async { RESEARCH_ATOM }))
        .route("/quiet.xml", get(|| async { EMPTY_RSS }))
        .route("/gone.xml", get(|| async { StatusCode::NOT_FOUND }))
        .route("/v1/chat/completions", post(chat));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

fn settings(base: &str) -> DashboardConfig {
    DashboardConfig {
        api_url: format!("{base}/v1"),
        api_key: "sk-local".into(),
        ..DashboardConfig::default()
    }
}

fn sources(base: &str) -> Vec<Source> {
    vec![
        Source::new("Wire", format!("{base}/wire.xml")),
        Source::new("Notes", format!("{base}/notes.xml")),
        Source::new("Quiet", format!("{base}/quiet.xml")),
        Source::new("Gone", format!("{base}/gone.xml")),
        Source::new("Muted", format!("{base}/wire.xml")).disabled(),
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scan_over_real_http_reports_every_kind_of_outcome() {
    let base = spawn_upstream().await;
    let fetcher = Arc::new(HttpFeedFetcher::new().with_timeout(Duration::from_secs(5)));

    let updates = scan(
        &sources(&base),
        settings(&base).run_configuration(),
        fetcher,
        Arc::new(OpenAiChatClient),
    )
    .expect("active sources")
    .collect_all()
    .await;

    assert_eq!(updates.len(), 4);
    let by_name = |n: &str| {
        updates
            .iter()
            .find(|u| u.outcome.source_name == n)
            .map(|u| &u.outcome)
            .unwrap_or_else(|| panic!("no outcome for {n}"))
    };

    let wire = by_name("Wire").payload().expect("wire succeeded");
    assert_eq!(wire.title, "Fed signals patience as inflation cools");
    assert_eq!(wire.link, "https://wire.example.test/fed-patience");
    assert_eq!(wire.analysis, "Score 6/10. Title: Fed signals patience as inflation cools");

    let notes = by_name("Notes").payload().expect("notes succeeded");
    assert_eq!(notes.link, "https://notes.example.test/shipping");
    assert!(notes.summary.starts_with("Freight costs doubled"));

    assert_eq!(by_name("Quiet").status, OutcomeStatus::Empty);

    let gone = by_name("Gone").error_message().expect("gone failed");
    assert!(gone.contains("404"), "got {gone}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_scan_streams_real_results() {
    let base = spawn_upstream().await;
    let state = AppState::new(
        settings(&base),
        sources(&base),
        Arc::new(HttpFeedFetcher::new().with_timeout(Duration::from_secs(5))),
        Arc::new(OpenAiChatClient),
    );

    let resp = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scan")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "application/x-ndjson"
    );

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let lines: Vec<Value> = std::str::from_utf8(&bytes)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 4);
    let statuses: Vec<_> = lines
        .iter()
        .map(|l| l["outcome"]["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses.iter().filter(|s| *s == "success").count(), 2);
    assert_eq!(statuses.iter().filter(|s| *s == "empty").count(), 1);
    assert_eq!(statuses.iter().filter(|s| *s == "failed").count(), 1);
    assert_eq!(lines.last().unwrap()["progress"], 1.0);
}

#[tokio::test]
async fn missing_key_fails_every_source_without_reaching_the_endpoint() {
    let base = spawn_upstream().await;
    let mut cfg = settings(&base);
    cfg.api_key.clear();
    cfg.api_url = "http://127.0.0.1:9/v1".into();

    let updates = scan(
        &sources(&base)[..2],
        cfg.run_configuration(),
        Arc::new(HttpFeedFetcher::new().with_timeout(Duration::from_secs(5))),
        Arc::new(OpenAiChatClient),
    )
    .unwrap()
    .collect_all()
    .await;

    assert_eq!(updates.len(), 2);
    for u in &updates {
        assert_eq!(u.outcome.error_message(), Some("missing API key"));
    }
}
