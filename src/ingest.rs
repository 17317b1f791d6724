// INGEST: stream ingest session
// One session per active symbol set. Decodes every ticker message into a Tick
// and appends it to the store. Reconnects with the same symbol set on
// connection loss until the subscription controller cancels it.

use crate::feed::TickerFeed;
use crate::store::TickStore;
use crate::types::CombinedStreamEvent;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

pub struct IngestSession {
    symbols: Vec<String>,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl IngestSession {
    pub fn spawn(
        feed: Arc<dyn TickerFeed>,
        store: Arc<TickStore>,
        symbols: Vec<String>,
        reconnect_delay: Duration,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task_symbols = symbols.clone();
        let handle = tokio::spawn(run_session(
            feed,
            store,
            task_symbols,
            reconnect_delay,
            cancel_rx,
        ));
        Self {
            symbols,
            cancel_tx,
            handle,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Signal cancellation and await confirmed termination. Returns false if
    /// the session did not acknowledge within `stop_timeout`; the caller then
    /// treats it as leaked.
    pub async fn stop(self, stop_timeout: Duration) -> bool {
        let _ = self.cancel_tx.send(true);
        match timeout(stop_timeout, self.handle).await {
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

async fn run_session(
    feed: Arc<dyn TickerFeed>,
    store: Arc<TickStore>,
    symbols: Vec<String>,
    reconnect_delay: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut decode_errors: u64 = 0;
    loop {
        if *cancel_rx.borrow() {
            break;
        }

        let connected = tokio::select! {
            _ = cancel_rx.changed() => break,
            result = feed.subscribe(&symbols) => result,
        };

        match connected {
            Ok(mut stream) => {
                info!(symbols = symbols.len(), "INGEST: session streaming");
                loop {
                    tokio::select! {
                        _ = cancel_rx.changed() => {
                            // Dropping the stream closes the connection before
                            // the join handle completes.
                            info!("INGEST: cancellation received, closing connection");
                            return;
                        }
                        message = stream.next() => match message {
                            Some(Ok(payload)) => {
                                handle_message(&store, &payload, &mut decode_errors).await;
                            }
                            Some(Err(err)) => {
                                warn!(error = %err, "INGEST: connection lost");
                                break;
                            }
                            None => {
                                warn!("INGEST: stream ended by remote");
                                break;
                            }
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "INGEST: connect failed"),
        }

        info!(
            delay_secs = reconnect_delay.as_secs(),
            "INGEST: reconnecting with the same symbol set"
        );
        tokio::select! {
            _ = cancel_rx.changed() => break,
            _ = sleep(reconnect_delay) => {}
        }
    }
    info!("INGEST: session terminated");
}

/// A malformed message never terminates the session; it is counted and
/// skipped.
async fn handle_message(store: &TickStore, payload: &str, decode_errors: &mut u64) {
    match serde_json::from_str::<CombinedStreamEvent>(payload) {
        Ok(event) => match event.data.into_tick() {
            Some(tick) => {
                if let Err(err) = store.insert(&tick).await {
                    warn!(error = %err, "INGEST: tick insert failed");
                }
            }
            None => {
                *decode_errors += 1;
                warn!(
                    stream = %event.stream,
                    total_decode_errors = *decode_errors,
                    "INGEST: unparseable ticker fields, message skipped"
                );
            }
        },
        Err(err) => {
            *decode_errors += 1;
            warn!(
                error = %err,
                total_decode_errors = *decode_errors,
                "INGEST: malformed message skipped"
            );
        }
    }
}
