// FEED: market data feed collaborator
// One multiplexed WebSocket connection carries the ticker stream for the whole
// active symbol set. Connection-level failures surface as stream errors; the
// ingest session decides what to do with them.

use crate::error::FeedError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::info;

pub type FeedStream = BoxStream<'static, Result<String, FeedError>>;

#[async_trait]
pub trait TickerFeed: Send + Sync {
    /// Open one connection multiplexing the given symbols and return the raw
    /// message stream. Stream end or an `Err` item means the connection is
    /// gone and must be re-established by the caller.
    async fn subscribe(&self, symbols: &[String]) -> Result<FeedStream, FeedError>;
}

pub struct BinanceTickerFeed {
    ws_base: String,
}

impl BinanceTickerFeed {
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
        }
    }

    fn stream_url(&self, symbols: &[String]) -> String {
        let streams: Vec<String> = symbols
            .iter()
            .map(|s| format!("{}@ticker", s.to_lowercase()))
            .collect();
        format!(
            "{}/stream?streams={}",
            self.ws_base.trim_end_matches('/'),
            streams.join("/")
        )
    }
}

#[async_trait]
impl TickerFeed for BinanceTickerFeed {
    async fn subscribe(&self, symbols: &[String]) -> Result<FeedStream, FeedError> {
        let url = self.stream_url(symbols);
        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|err| FeedError::Connect(err.to_string()))?;
        info!(symbols = symbols.len(), "FEED: combined ticker stream connected");

        let (_, read) = ws_stream.split();
        let stream = read.filter_map(|message| async move {
            match message {
                Ok(Message::Text(txt)) => Some(Ok(txt.as_str().to_string())),
                Ok(Message::Close(frame)) => {
                    Some(Err(FeedError::Closed(format!("{frame:?}"))))
                }
                Ok(_) => None,
                Err(err) => Some(Err(FeedError::Transport(err.to_string()))),
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_multiplexes_lowercased_symbols() {
        let feed = BinanceTickerFeed::new("wss://stream.binance.com:9443/");
        let url = feed.stream_url(&["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@ticker/ethusdt@ticker"
        );
    }
}
