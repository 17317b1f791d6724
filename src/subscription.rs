// SUBSCRIPTION: owns the single active ingest session
// Replacing the streamed symbol set is a two-phase operation: stop the old
// session, await its confirmed termination, then start the new one. The
// session lives in one `Option`, so a second concurrent session cannot exist.

use crate::feed::TickerFeed;
use crate::ingest::IngestSession;
use crate::store::TickStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

pub struct SubscriptionController {
    feed: Arc<dyn TickerFeed>,
    store: Arc<TickStore>,
    stop_timeout: Duration,
    reconnect_delay: Duration,
    state: SessionState,
    session: Option<IngestSession>,
}

impl SubscriptionController {
    pub fn new(
        feed: Arc<dyn TickerFeed>,
        store: Arc<TickStore>,
        stop_timeout: Duration,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            feed,
            store,
            stop_timeout,
            reconnect_delay,
            state: SessionState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_symbols(&self) -> Option<&[String]> {
        self.session.as_ref().map(|s| s.symbols())
    }

    /// Point the ingest session at a new symbol set. An empty set keeps the
    /// previous coverage; an unchanged set is a no-op. Otherwise the old
    /// session is cancelled and awaited before the new one starts.
    pub async fn retarget(&mut self, new_symbols: Vec<String>) {
        if new_symbols.is_empty() {
            info!("SUBSCRIPTION: empty symbol set, keeping previous subscription");
            return;
        }

        let mut symbols = new_symbols;
        symbols.sort();
        symbols.dedup();

        if let Some(session) = &self.session {
            let mut current = session.symbols().to_vec();
            current.sort();
            if current == symbols {
                debug!("SUBSCRIPTION: symbol set unchanged, retarget is a no-op");
                return;
            }
        }

        self.stop_current().await;

        self.state = SessionState::Starting;
        info!(symbols = symbols.len(), "SUBSCRIPTION: starting ingest session");
        self.session = Some(IngestSession::spawn(
            self.feed.clone(),
            self.store.clone(),
            symbols,
            self.reconnect_delay,
        ));
        self.state = SessionState::Active;
    }

    /// Stop the active session, if any, and return to idle.
    pub async fn shutdown(&mut self) {
        self.stop_current().await;
        self.state = SessionState::Idle;
    }

    async fn stop_current(&mut self) {
        if let Some(old) = self.session.take() {
            self.state = SessionState::Stopping;
            let count = old.symbols().len();
            info!(symbols = count, "SUBSCRIPTION: stopping ingest session");
            let started = Instant::now();
            if old.stop(self.stop_timeout).await {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "SUBSCRIPTION: session termination confirmed"
                );
            } else {
                // A leaked session is a resource risk, not a correctness risk:
                // writes are idempotent appends. Proceed anyway.
                warn!(
                    timeout_secs = self.stop_timeout.as_secs(),
                    "SUBSCRIPTION: session did not acknowledge cancellation, treating as leaked"
                );
            }
        }
    }
}
