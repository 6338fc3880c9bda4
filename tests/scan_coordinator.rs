// tests/scan_coordinator.rs
//
// Scan coordinator: concurrency cap, completion order, bijection, isolation.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use feed_desk::ai_adapter::{ChatClient, ChatRequest, LlmError};
use feed_desk::{
    scan, FeedDocument, FeedFetcher, FetchError, FetchedEntry, RunConfiguration, ScanError,
    Source, MAX_IN_FLIGHT,
};

/// Tracks how many network calls are in flight at once.
#[derive(Default)]
struct Gauge {
    now: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let n = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(n, Ordering::SeqCst);
    }
    fn leave(&self) {
        self.now.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves one entry per URL after a per-URL delay. URLs containing "panic" panic.
struct SlowFetcher {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    gauge: Arc<Gauge>,
}

#[async_trait]
impl FeedFetcher for SlowFetcher {
    async fn fetch(&self, url: &str, _proxy: Option<&str>) -> Result<FeedDocument, FetchError> {
        if url.contains("panic") {
            panic!("fetcher blew up on {url}");
        }
        self.gauge.enter();
        let d = self.delays.get(url).copied().unwrap_or(self.default_delay);
        tokio::time::sleep(d).await;
        self.gauge.leave();
        if url.contains("missing") {
            return Err(FetchError::Status(StatusCode::NOT_FOUND));
        }
        Ok(FeedDocument::new(vec![FetchedEntry {
            title: format!("headline from {url}"),
            link: url.to_string(),
            summary: "A summary that is comfortably longer than ten characters.".into(),
        }]))
    }
}

/// Answers after a short delay; content mentioning "timeout" fails like a timed-out call.
struct SlowChat {
    delay: Duration,
    gauge: Arc<Gauge>,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatClient for SlowChat {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.leave();
        let user = &request.messages[1].content;
        if user.contains("timeout") {
            return Err(LlmError::Status {
                status: StatusCode::GATEWAY_TIMEOUT,
                body: "upstream request timed out".into(),
            });
        }
        Ok("Score 6/10. Long.".into())
    }

    fn provider_name(&self) -> &'static str {
        "slow"
    }
}

fn cfg() -> RunConfiguration {
    RunConfiguration {
        model: "m".into(),
        api_key: "sk-test".into(),
        api_base: "https://llm.example.test/v1".into(),
        proxy: None,
        system_prompt: "desk".into(),
    }
}

fn doubles(
    delays: &[(&str, u64)],
    default_ms: u64,
    chat_ms: u64,
) -> (Arc<SlowFetcher>, Arc<SlowChat>, Arc<Gauge>) {
    let gauge = Arc::new(Gauge::default());
    let fetcher = Arc::new(SlowFetcher {
        delays: delays
            .iter()
            .map(|(u, ms)| (u.to_string(), Duration::from_millis(*ms)))
            .collect(),
        default_delay: Duration::from_millis(default_ms),
        gauge: gauge.clone(),
    });
    let chat = Arc::new(SlowChat {
        delay: Duration::from_millis(chat_ms),
        gauge: gauge.clone(),
        calls: AtomicUsize::new(0),
    });
    (fetcher, chat, gauge)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_than_ten_workers_in_network_phase() {
    let sources: Vec<Source> = (0..35)
        .map(|i| Source::new(format!("S{i}"), format!("https://s{i}.test/rss")))
        .collect();
    let (fetcher, chat, gauge) = doubles(&[], 40, 20);

    let updates = scan(&sources, cfg(), fetcher, chat.clone())
        .expect("active sources")
        .collect_all()
        .await;

    assert_eq!(updates.len(), 35);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak <= MAX_IN_FLIGHT, "peak {peak} exceeded the cap");
    assert!(peak > 1, "workers should overlap, peak was {peak}");
    assert_eq!(chat.calls.load(Ordering::SeqCst), 35);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn yields_each_active_source_exactly_once_with_rising_progress() {
    let sources = vec![
        Source::new("A", "https://a.test"),
        Source::new("B", "https://b.test").disabled(),
        Source::new("C", "https://c.test"),
        Source::new("D", "https://missing.test"),
    ];
    let (fetcher, chat, _) = doubles(&[], 5, 5);

    let mut running = scan(&sources, cfg(), fetcher, chat).unwrap();
    assert_eq!(running.total(), 3);

    let mut names = BTreeSet::new();
    let mut last_progress = 0.0f32;
    while let Some(u) = running.next().await {
        assert!(u.progress() > last_progress);
        last_progress = u.progress();
        assert!(names.insert(u.outcome.source_name.clone()), "duplicate outcome");

        // status ⇔ payload ⇔ error
        assert_eq!(u.outcome.is_success(), u.outcome.payload().is_some());
        assert_eq!(
            u.outcome.status_label() == "failed",
            u.outcome.error_message().is_some()
        );
        assert!(!(u.outcome.payload().is_some() && u.outcome.error_message().is_some()));
    }

    assert_eq!(names, BTreeSet::from(["A".to_string(), "C".to_string(), "D".to_string()]));
    assert!((last_progress - 1.0).abs() < f32::EPSILON);
    assert_eq!(running.completed(), 3);
    assert!(running.next().await.is_none(), "scan is not restartable");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outcomes_arrive_in_completion_order() {
    let sources = vec![
        Source::new("slow", "https://slow.test"),
        Source::new("fast", "https://fast.test"),
    ];
    let (fetcher, chat, _) = doubles(&[("https://slow.test", 400), ("https://fast.test", 5)], 5, 5);

    let updates = scan(&sources, cfg(), fetcher, chat).unwrap().collect_all().await;

    let order: Vec<_> = updates.iter().map(|u| u.outcome.source_name.as_str()).collect();
    assert_eq!(order, ["fast", "slow"]);
}

#[tokio::test]
async fn all_disabled_signals_no_active_sources() {
    let sources = vec![
        Source::new("A", "https://a.test").disabled(),
        Source::new("B", "https://b.test").disabled(),
    ];
    let (fetcher, chat, _) = doubles(&[], 1, 1);

    let res = scan(&sources, cfg(), fetcher, chat.clone());
    assert!(matches!(res, Err(ScanError::NoActiveSources)));
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);

    let (fetcher, chat, _) = doubles(&[], 1, 1);
    assert!(matches!(
        scan(&[], cfg(), fetcher, chat),
        Err(ScanError::NoActiveSources)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_timed_out_llm_call_does_not_sink_the_batch() {
    let sources = vec![
        Source::new("ok-1", "https://one.test"),
        Source::new("times-out", "https://timeout.test"),
        Source::new("ok-2", "https://two.test"),
    ];
    let (fetcher, chat, _) = doubles(&[], 10, 10);

    let updates = scan(&sources, cfg(), fetcher, chat).unwrap().collect_all().await;

    assert_eq!(updates.len(), 3);
    let failed: Vec<_> = updates
        .iter()
        .filter(|u| u.outcome.status_label() == "failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].outcome.source_name, "times-out");
    assert!(failed[0].outcome.is_connectivity_failure());
    assert_eq!(updates.iter().filter(|u| u.outcome.is_success()).count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_worker_still_reports_its_source() {
    let sources = vec![
        Source::new("fine", "https://fine.test"),
        Source::new("boom", "https://panic.test"),
    ];
    let (fetcher, chat, _) = doubles(&[], 5, 5);

    let updates = scan(&sources, cfg(), fetcher, chat).unwrap().collect_all().await;

    assert_eq!(updates.len(), 2);
    let boom = updates
        .iter()
        .find(|u| u.outcome.source_name == "boom")
        .expect("panicked source still yields an outcome");
    assert_eq!(boom.outcome.status_label(), "failed");
    assert!(boom.outcome.error_message().unwrap().contains("worker task failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stream_view_yields_all_updates() {
    use futures::StreamExt;

    let sources: Vec<Source> = (0..4)
        .map(|i| Source::new(format!("S{i}"), format!("https://s{i}.test")))
        .collect();
    let (fetcher, chat, _) = doubles(&[], 5, 5);

    let updates: Vec<_> = scan(&sources, cfg(), fetcher, chat)
        .unwrap()
        .into_stream()
        .collect()
        .await;

    assert_eq!(updates.len(), 4);
    assert_eq!(updates.last().unwrap().completed, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropping_a_scan_aborts_outstanding_workers() {
    let sources: Vec<Source> = (0..20)
        .map(|i| Source::new(format!("S{i}"), format!("https://s{i}.test")))
        .collect();
    let (fetcher, chat, _) = doubles(&[], 150, 5);

    let mut running = scan(&sources, cfg(), fetcher, chat.clone()).unwrap();
    assert!(running.next().await.is_some());
    drop(running);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let calls = chat.calls.load(Ordering::SeqCst);
    assert!(calls < 20, "second wave should never start, saw {calls} chat calls");
}
