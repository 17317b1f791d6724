// Integration tests for the subscription controller and ingest session:
// single-writer discipline, retarget semantics, reconnect and cancellation.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use gainer_bot::error::FeedError;
use gainer_bot::feed::{FeedStream, TickerFeed};
use gainer_bot::store::TickStore;
use gainer_bot::subscription::{SessionState, SubscriptionController};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn ticker_message(symbol: &str, price: f64) -> String {
    format!(
        r#"{{"stream":"{}@ticker","data":{{"e":"24hrTicker","E":{},"s":"{}","c":"{}"}}}}"#,
        symbol.to_lowercase(),
        Utc::now().timestamp_millis(),
        symbol,
        price
    )
}

/// Decrements the live-connection counter when the stream is dropped.
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Feed that emits ticker messages for the subscribed symbols forever and
/// records whether two connections were ever live at the same time.
struct EndlessFeed {
    active: Arc<AtomicUsize>,
    overlap_seen: Arc<AtomicBool>,
    subscribe_count: Arc<AtomicUsize>,
}

impl EndlessFeed {
    fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            overlap_seen: Arc::new(AtomicBool::new(false)),
            subscribe_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl TickerFeed for EndlessFeed {
    async fn subscribe(&self, symbols: &[String]) -> Result<FeedStream, FeedError> {
        let previously_active = self.active.fetch_add(1, Ordering::SeqCst);
        if previously_active > 0 {
            self.overlap_seen.store(true, Ordering::SeqCst);
        }
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);

        let guard = ConnectionGuard {
            active: self.active.clone(),
        };
        let symbols = symbols.to_vec();
        let stream = futures::stream::unfold(
            (guard, symbols, 0usize),
            |(guard, symbols, i)| async move {
                sleep(Duration::from_millis(5)).await;
                let symbol = symbols[i % symbols.len()].clone();
                let message = ticker_message(&symbol, 100.0 + i as f64);
                Some((Ok::<_, FeedError>(message), (guard, symbols, i + 1)))
            },
        );
        Ok(Box::pin(stream))
    }
}

/// Feed whose connections die after a few messages; used to exercise the
/// reconnect loop. Records the symbol set of every connection attempt.
struct FlakyFeed {
    subscribe_count: Arc<AtomicUsize>,
    seen_symbol_sets: Arc<Mutex<Vec<Vec<String>>>>,
    messages_per_connection: usize,
}

impl FlakyFeed {
    fn new(messages_per_connection: usize) -> Self {
        Self {
            subscribe_count: Arc::new(AtomicUsize::new(0)),
            seen_symbol_sets: Arc::new(Mutex::new(Vec::new())),
            messages_per_connection,
        }
    }
}

#[async_trait]
impl TickerFeed for FlakyFeed {
    async fn subscribe(&self, symbols: &[String]) -> Result<FeedStream, FeedError> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.seen_symbol_sets.lock().unwrap().push(symbols.to_vec());

        let symbols = symbols.to_vec();
        let limit = self.messages_per_connection;
        let stream = futures::stream::unfold((symbols, 0usize), move |(symbols, i)| async move {
            if i >= limit {
                return None;
            }
            sleep(Duration::from_millis(2)).await;
            let symbol = symbols[i % symbols.len()].clone();
            let message = ticker_message(&symbol, 50.0 + i as f64);
            Some((Ok::<_, FeedError>(message), (symbols, i + 1)))
        });
        Ok(Box::pin(stream))
    }
}

/// Feed that plays a fixed script once and then stays silent.
struct ScriptedFeed {
    script: Vec<String>,
    subscribe_count: Arc<AtomicUsize>,
}

#[async_trait]
impl TickerFeed for ScriptedFeed {
    async fn subscribe(&self, _symbols: &[String]) -> Result<FeedStream, FeedError> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        let script = self.script.clone();
        let stream = futures::stream::iter(script.into_iter().map(Ok::<_, FeedError>))
            .chain(futures::stream::pending());
        Ok(Box::pin(stream))
    }
}

fn controller(
    feed: Arc<dyn TickerFeed>,
    store: Arc<TickStore>,
    reconnect_delay: Duration,
) -> SubscriptionController {
    SubscriptionController::new(feed, store, Duration::from_secs(5), reconnect_delay)
}

#[tokio::test]
async fn retarget_replaces_session_without_overlap() {
    let store = Arc::new(TickStore::open_in_memory().unwrap());
    let feed = Arc::new(EndlessFeed::new());
    let mut controller = controller(feed.clone(), store.clone(), Duration::from_millis(50));
    assert_eq!(controller.state(), SessionState::Idle);

    controller.retarget(vec!["BTCUSDT".to_string()]).await;
    assert_eq!(controller.state(), SessionState::Active);
    sleep(Duration::from_millis(100)).await;
    assert!(store.tick_count().await.unwrap() > 0);

    controller.retarget(vec!["ETHUSDT".to_string()]).await;
    sleep(Duration::from_millis(100)).await;

    let now = Utc::now();
    let eth = store
        .query(Some("ETHUSDT"), now - chrono::Duration::minutes(1), now)
        .await
        .unwrap();
    assert!(!eth.is_empty(), "new session must ingest the new symbol");
    assert_eq!(feed.subscribe_count.load(Ordering::SeqCst), 2);
    assert!(
        !feed.overlap_seen.load(Ordering::SeqCst),
        "two ingest sessions were live at the same time"
    );

    controller.shutdown().await;
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn empty_retarget_keeps_previous_subscription() {
    let store = Arc::new(TickStore::open_in_memory().unwrap());
    let feed = Arc::new(EndlessFeed::new());
    let mut controller = controller(feed.clone(), store.clone(), Duration::from_millis(50));

    controller.retarget(vec!["BTCUSDT".to_string()]).await;
    controller.retarget(Vec::new()).await;

    assert_eq!(
        controller.current_symbols(),
        Some(&["BTCUSDT".to_string()][..])
    );
    assert_eq!(feed.subscribe_count.load(Ordering::SeqCst), 1);
    controller.shutdown().await;
}

#[tokio::test]
async fn identical_retarget_is_idempotent() {
    let store = Arc::new(TickStore::open_in_memory().unwrap());
    let feed = Arc::new(EndlessFeed::new());
    let mut controller = controller(feed.clone(), store.clone(), Duration::from_millis(50));

    controller.retarget(vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]).await;
    // Same set, different order: still a no-op.
    controller.retarget(vec!["ETHUSDT".to_string(), "BTCUSDT".to_string()]).await;
    controller.retarget(vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]).await;

    assert_eq!(feed.subscribe_count.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), SessionState::Active);
    controller.shutdown().await;
}

#[tokio::test]
async fn repeated_retargets_never_overlap_sessions() {
    let store = Arc::new(TickStore::open_in_memory().unwrap());
    let feed = Arc::new(EndlessFeed::new());
    let mut controller = controller(feed.clone(), store.clone(), Duration::from_millis(10));

    for i in 0..6 {
        let set = if i % 2 == 0 {
            vec!["AAAUSDT".to_string(), "BBBUSDT".to_string()]
        } else {
            vec!["CCCUSDT".to_string()]
        };
        controller.retarget(set).await;
        sleep(Duration::from_millis(20)).await;
    }

    assert!(!feed.overlap_seen.load(Ordering::SeqCst));
    assert_eq!(feed.subscribe_count.load(Ordering::SeqCst), 6);
    controller.shutdown().await;
}

#[tokio::test]
async fn dropped_connection_reconnects_with_same_symbols() {
    let store = Arc::new(TickStore::open_in_memory().unwrap());
    let feed = Arc::new(FlakyFeed::new(3));
    let mut controller = controller(feed.clone(), store.clone(), Duration::from_millis(20));

    controller.retarget(vec!["BTCUSDT".to_string()]).await;
    sleep(Duration::from_millis(250)).await;

    let attempts = feed.subscribe_count.load(Ordering::SeqCst);
    assert!(attempts >= 2, "expected reconnects, got {attempts} attempts");
    let sets = feed.seen_symbol_sets.lock().unwrap().clone();
    assert!(sets.iter().all(|s| s == &vec!["BTCUSDT".to_string()]));

    controller.shutdown().await;
}

#[tokio::test]
async fn cancellation_interrupts_reconnect_backoff() {
    let store = Arc::new(TickStore::open_in_memory().unwrap());
    // Connections die immediately and the backoff is far longer than the test.
    let feed = Arc::new(FlakyFeed::new(1));
    let mut controller = controller(feed.clone(), store.clone(), Duration::from_secs(60));

    controller.retarget(vec!["BTCUSDT".to_string()]).await;
    sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    controller.shutdown().await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "shutdown had to wait out the reconnect backoff"
    );
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn malformed_message_does_not_kill_the_session() {
    let store = Arc::new(TickStore::open_in_memory().unwrap());
    let feed = Arc::new(ScriptedFeed {
        script: vec![
            "this is not json".to_string(),
            r#"{"stream":"x@ticker","data":{"s":"XUSDT","c":"not-a-number","E":0}}"#.to_string(),
            ticker_message("BTCUSDT", 123.0),
        ],
        subscribe_count: Arc::new(AtomicUsize::new(0)),
    });
    let mut controller = controller(feed.clone(), store.clone(), Duration::from_millis(20));

    controller.retarget(vec!["BTCUSDT".to_string()]).await;
    sleep(Duration::from_millis(100)).await;

    // The valid message after the malformed ones still landed, on the same
    // connection.
    assert_eq!(store.tick_count().await.unwrap(), 1);
    assert_eq!(feed.subscribe_count.load(Ordering::SeqCst), 1);

    controller.shutdown().await;
}
