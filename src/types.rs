// Core data types shared across the scanner, ingest and decision modules

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One timestamped price update for a symbol, as decoded from the ticker stream.
/// Immutable once stored; removed only by the age-based purge.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A symbol together with its percentage price change over the ranking window.
/// `start_price`/`end_price` are the first/last tick by timestamp in the window.
#[derive(Debug, Clone)]
pub struct RankedSymbol {
    pub symbol: String,
    pub start_price: f64,
    pub end_price: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub percent_change: f64,
}

/// Order book snapshot, price/quantity levels parsed to floats.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl OrderBook {
    pub fn bid_volume(&self) -> f64 {
        self.bids.iter().map(|(_, qty)| qty).sum()
    }

    pub fn ask_volume(&self) -> f64 {
        self.asks.iter().map(|(_, qty)| qty).sum()
    }
}

/// Trend read off the order book volume imbalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBookTrend {
    UptrendExpected,
    DowntrendExpected,
    /// Bid and ask volume balance out.
    UncertainMarket,
    /// Book was present but one side was empty; nothing can be read from it.
    NoClearTrend,
}

impl std::fmt::Display for OrderBookTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderBookTrend::UptrendExpected => "Uptrend Expected",
            OrderBookTrend::DowntrendExpected => "Downtrend Expected",
            OrderBookTrend::UncertainMarket => "Uncertain Market",
            OrderBookTrend::NoClearTrend => "No clear trend",
        };
        f.write_str(s)
    }
}

/// Linear-regression trend over the most recent candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Upward,
    Downward,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Combined-stream ticker payload: `{"stream":"btcusdt@ticker","data":{...}}`.
#[derive(Debug, Deserialize)]
pub struct CombinedStreamEvent {
    pub stream: String,
    pub data: TickerEvent,
}

#[derive(Debug, Deserialize)]
pub struct TickerEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "E")]
    pub event_time: i64,
}

impl TickerEvent {
    pub fn into_tick(self) -> Option<Tick> {
        let price = self.last_price.parse::<f64>().ok()?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.event_time)?;
        Some(Tick {
            symbol: self.symbol,
            price,
            timestamp,
        })
    }
}
