// EVIDENCE: per-symbol evidence collection for the decision engine
// Indicator math is delegated to the `ta` crate; this module only orchestrates
// the fetches and combines the outputs into signal counts and cross flags.

use crate::config::EvidenceCfg;
use crate::market::MarketClient;
use crate::patterns::{scan_patterns, CandlePattern};
use crate::types::{Candle, OrderBook, OrderBookTrend, RankedSymbol, TrendDirection};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, FastStochastic, MovingAverageConvergenceDivergence,
    OnBalanceVolume, RelativeStrengthIndex, SlowStochastic,
};
use ta::{DataItem, Next};
use tracing::{debug, warn};

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_MULTIPLIER: f64 = 2.0;
const EMA_PERIOD: usize = 50;
const STOCH_PERIOD: usize = 14;
const STOCH_SMOOTHING: usize = 3;
const OBV_TAIL: usize = 3;
const TREND_CANDLES: usize = 6;
const ORDER_BOOK_DEPTH: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerSignal {
    Overbought,
    Oversold,
    Inside,
}

/// Snapshot of the indicator state at the latest candle, including the
/// cross-over flags derived from the two most recent values.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub macd_cross_above: bool,
    pub macd_cross_below: bool,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub bollinger_signal: BollingerSignal,
    pub price_cross_above_ema50: bool,
    pub price_cross_below_ema50: bool,
    pub stoch_cross_above: bool,
    pub stoch_cross_below: bool,
    pub obv_rising: bool,
    pub obv_falling: bool,
    pub last_close: f64,
}

/// Everything the decision engine consumes for one symbol. Built fresh every
/// scan cycle, never persisted.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub symbol: String,
    /// `None` when the order book could not be fetched at all.
    pub order_book_trend: Option<OrderBookTrend>,
    pub bid_ask_ratio: f64,
    pub indicators: IndicatorSnapshot,
    pub uptrend_signals: u32,
    pub downtrend_signals: u32,
    pub patterns: Vec<CandlePattern>,
    pub trend: TrendDirection,
}

impl Evidence {
    /// Evidence that produces a neutral decision; used when history is missing
    /// or undersized so one symbol's failure never aborts the batch.
    pub fn neutral(symbol: String) -> Self {
        Self {
            symbol,
            order_book_trend: None,
            bid_ask_ratio: 1.0,
            indicators: IndicatorSnapshot {
                rsi: 50.0,
                macd: 0.0,
                macd_signal: 0.0,
                macd_histogram: 0.0,
                macd_cross_above: false,
                macd_cross_below: false,
                bollinger_upper: 0.0,
                bollinger_lower: 0.0,
                bollinger_signal: BollingerSignal::Inside,
                price_cross_above_ema50: false,
                price_cross_below_ema50: false,
                stoch_cross_above: false,
                stoch_cross_below: false,
                obv_rising: false,
                obv_falling: false,
                last_close: 0.0,
            },
            uptrend_signals: 0,
            downtrend_signals: 0,
            patterns: Vec::new(),
            trend: TrendDirection::Flat,
        }
    }
}

fn candle_to_data_item(candle: &Candle) -> Option<DataItem> {
    DataItem::builder()
        .open(candle.open)
        .high(candle.high)
        .low(candle.low)
        .close(candle.close)
        .volume(candle.volume)
        .build()
        .ok()
}

#[derive(Clone, Copy)]
struct IndicatorRow {
    close: f64,
    macd: f64,
    signal: f64,
    histogram: f64,
    rsi: f64,
    bb_upper: f64,
    bb_lower: f64,
    ema: f64,
    k: f64,
    d: f64,
}

/// Run the indicator set over the candle window and read off the latest values
/// plus the cross flags between the last two candles.
pub fn compute_indicators(candles: &[Candle]) -> Option<IndicatorSnapshot> {
    let mut rsi_ind = RelativeStrengthIndex::new(RSI_PERIOD).unwrap();
    let mut macd_ind =
        MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL).unwrap();
    let mut bb_ind = BollingerBands::new(BOLLINGER_PERIOD, BOLLINGER_MULTIPLIER).unwrap();
    let mut ema_ind = ExponentialMovingAverage::new(EMA_PERIOD).unwrap();
    let mut k_ind = FastStochastic::new(STOCH_PERIOD).unwrap();
    let mut d_ind = SlowStochastic::new(STOCH_PERIOD, STOCH_SMOOTHING).unwrap();
    let mut obv_ind = OnBalanceVolume::new();

    let mut second_last: Option<IndicatorRow> = None;
    let mut last: Option<IndicatorRow> = None;
    let mut obv_tail: Vec<f64> = Vec::with_capacity(OBV_TAIL + 1);

    for candle in candles {
        let Some(di) = candle_to_data_item(candle) else {
            continue;
        };
        let macd_out = macd_ind.next(&di);
        let bb_out = bb_ind.next(&di);
        let row = IndicatorRow {
            close: candle.close,
            macd: macd_out.macd,
            signal: macd_out.signal,
            histogram: macd_out.histogram,
            rsi: rsi_ind.next(&di),
            bb_upper: bb_out.upper,
            bb_lower: bb_out.lower,
            ema: ema_ind.next(&di),
            k: k_ind.next(&di),
            d: d_ind.next(&di),
        };
        let obv = obv_ind.next(&di);
        obv_tail.push(obv);
        if obv_tail.len() > OBV_TAIL {
            obv_tail.remove(0);
        }
        second_last = last;
        last = Some(row);
    }

    let (a, b) = match (second_last, last) {
        (Some(a), Some(b)) => (a, b),
        _ => return None,
    };

    let bollinger_signal = if b.close > b.bb_upper {
        BollingerSignal::Overbought
    } else if b.close < b.bb_lower {
        BollingerSignal::Oversold
    } else {
        BollingerSignal::Inside
    };

    let obv_rising = obv_tail.len() == OBV_TAIL
        && obv_tail[0] < obv_tail[1]
        && obv_tail[1] < obv_tail[2];
    let obv_falling = obv_tail.len() == OBV_TAIL
        && obv_tail[0] > obv_tail[1]
        && obv_tail[1] > obv_tail[2];

    Some(IndicatorSnapshot {
        rsi: b.rsi,
        macd: b.macd,
        macd_signal: b.signal,
        macd_histogram: b.histogram,
        macd_cross_above: a.macd < a.signal && b.macd > b.signal,
        macd_cross_below: a.macd > a.signal && b.macd < b.signal,
        bollinger_upper: b.bb_upper,
        bollinger_lower: b.bb_lower,
        bollinger_signal,
        price_cross_above_ema50: a.close < a.ema && b.close > b.ema,
        price_cross_below_ema50: a.close > a.ema && b.close < b.ema,
        stoch_cross_above: a.k < a.d && b.k > b.d,
        stoch_cross_below: a.k > a.d && b.k < b.d,
        obv_rising,
        obv_falling,
        last_close: b.close,
    })
}

/// Least-squares slope over the last six closes.
pub fn regression_trend(candles: &[Candle]) -> TrendDirection {
    if candles.len() < TREND_CANDLES {
        return TrendDirection::Flat;
    }
    let closes = &candles[candles.len() - TREND_CANDLES..];
    let n = TREND_CANDLES as f64;
    let sum_x: f64 = (0..TREND_CANDLES).map(|i| i as f64).sum();
    let sum_x2: f64 = (0..TREND_CANDLES).map(|i| (i * i) as f64).sum();
    let sum_y: f64 = closes.iter().map(|c| c.close).sum();
    let sum_xy: f64 = closes
        .iter()
        .enumerate()
        .map(|(i, c)| i as f64 * c.close)
        .sum();
    let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
    if slope > 0.0 {
        TrendDirection::Upward
    } else if slope < 0.0 {
        TrendDirection::Downward
    } else {
        TrendDirection::Flat
    }
}

/// Order-book imbalance read: more bid volume means buyers are stacked deeper.
/// Returns the trend label and the bid/ask volume ratio.
pub fn analyze_order_book(book: &OrderBook) -> (OrderBookTrend, f64) {
    let bid_volume = book.bid_volume();
    let ask_volume = book.ask_volume();
    if bid_volume <= 0.0 || ask_volume <= 0.0 {
        return (OrderBookTrend::NoClearTrend, 1.0);
    }
    let ratio = bid_volume / ask_volume;
    if bid_volume > ask_volume {
        (OrderBookTrend::UptrendExpected, ratio)
    } else if ask_volume > bid_volume {
        (OrderBookTrend::DowntrendExpected, ratio)
    } else {
        (OrderBookTrend::UncertainMarket, 1.0)
    }
}

/// Uptrend/downtrend vote counts combined exactly as the ranking decision
/// expects them: RSI extremes, MACD vs signal, bid/ask ratio, Bollinger touch.
pub fn signal_counts(snapshot: &IndicatorSnapshot, bid_ask_ratio: Option<f64>) -> (u32, u32) {
    let mut uptrend = 0;
    let mut downtrend = 0;

    if snapshot.rsi > 70.0 {
        downtrend += 1;
    } else if snapshot.rsi < 30.0 {
        uptrend += 1;
    }

    if snapshot.macd > snapshot.macd_signal {
        uptrend += 1;
    } else if snapshot.macd < snapshot.macd_signal {
        downtrend += 1;
    }

    if let Some(ratio) = bid_ask_ratio {
        if ratio > 1.0 {
            uptrend += 1;
        } else if ratio < 1.0 {
            downtrend += 1;
        }
    }

    match snapshot.bollinger_signal {
        BollingerSignal::Oversold => uptrend += 1,
        BollingerSignal::Overbought => downtrend += 1,
        BollingerSignal::Inside => {}
    }

    (uptrend, downtrend)
}

pub struct EvidenceCollector {
    market: Arc<MarketClient>,
    cfg: EvidenceCfg,
}

impl EvidenceCollector {
    pub fn new(market: Arc<MarketClient>, cfg: EvidenceCfg) -> Self {
        Self { market, cfg }
    }

    /// Fan out over the ranked symbols with bounded concurrency and collect
    /// all evidence before the decision engine runs.
    pub async fn collect_batch(&self, ranked: &[RankedSymbol]) -> Vec<Evidence> {
        stream::iter(ranked.iter().map(|r| self.collect_one(r.symbol.clone())))
            .buffer_unordered(self.cfg.concurrency)
            .collect()
            .await
    }

    async fn collect_one(&self, symbol: String) -> Evidence {
        let candles = match self
            .market
            .fetch_klines(&symbol, &self.cfg.candle_interval, self.cfg.candle_limit)
            .await
        {
            Ok(candles) => candles,
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "EVIDENCE: candle fetch failed, degrading to neutral");
                return Evidence::neutral(symbol);
            }
        };

        if candles.len() < self.cfg.min_candles {
            debug!(
                symbol = %symbol,
                candles = candles.len(),
                min = self.cfg.min_candles,
                "EVIDENCE: not enough history, degrading to neutral"
            );
            return Evidence::neutral(symbol);
        }

        let Some(indicators) = compute_indicators(&candles) else {
            warn!(symbol = %symbol, "EVIDENCE: indicator computation failed, degrading to neutral");
            return Evidence::neutral(symbol);
        };

        let book = match self.market.fetch_order_book(&symbol, ORDER_BOOK_DEPTH).await {
            Ok(book) => Some(book),
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "EVIDENCE: order book fetch failed");
                None
            }
        };
        let (order_book_trend, bid_ask_ratio) = match &book {
            Some(book) => {
                let (trend, ratio) = analyze_order_book(book);
                (Some(trend), ratio)
            }
            None => (None, 1.0),
        };

        let ratio_for_counts = book.as_ref().map(|_| bid_ask_ratio);
        let (uptrend_signals, downtrend_signals) = signal_counts(&indicators, ratio_for_counts);

        let trend = regression_trend(&candles);
        let patterns = scan_patterns(&candles, trend);

        Evidence {
            symbol,
            order_book_trend,
            bid_ask_ratio,
            indicators,
            uptrend_signals,
            downtrend_signals,
            patterns,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(close: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            close_time: Utc::now(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.5,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn regression_trend_follows_slope_sign() {
        let rising: Vec<Candle> = (0..10).map(|i| candle(100.0 + i as f64)).collect();
        assert_eq!(regression_trend(&rising), TrendDirection::Upward);

        let falling: Vec<Candle> = (0..10).map(|i| candle(100.0 - i as f64)).collect();
        assert_eq!(regression_trend(&falling), TrendDirection::Downward);

        let short: Vec<Candle> = (0..3).map(|i| candle(100.0 + i as f64)).collect();
        assert_eq!(regression_trend(&short), TrendDirection::Flat);
    }

    #[test]
    fn order_book_imbalance_labels() {
        let bid_heavy = OrderBook {
            bids: vec![(100.0, 8.0), (99.0, 4.0)],
            asks: vec![(101.0, 3.0)],
        };
        let (trend, ratio) = analyze_order_book(&bid_heavy);
        assert_eq!(trend, OrderBookTrend::UptrendExpected);
        assert!((ratio - 4.0).abs() < 1e-9);

        let ask_heavy = OrderBook {
            bids: vec![(100.0, 2.0)],
            asks: vec![(101.0, 6.0)],
        };
        assert_eq!(
            analyze_order_book(&ask_heavy).0,
            OrderBookTrend::DowntrendExpected
        );

        let balanced = OrderBook {
            bids: vec![(100.0, 5.0)],
            asks: vec![(101.0, 5.0)],
        };
        assert_eq!(
            analyze_order_book(&balanced).0,
            OrderBookTrend::UncertainMarket
        );

        let one_sided = OrderBook {
            bids: vec![(100.0, 5.0)],
            asks: vec![],
        };
        assert_eq!(
            analyze_order_book(&one_sided).0,
            OrderBookTrend::NoClearTrend
        );
    }

    #[test]
    fn signal_counts_combine_all_votes() {
        let mut snapshot = Evidence::neutral("TEST".into()).indicators;
        snapshot.rsi = 25.0;
        snapshot.macd = 1.0;
        snapshot.macd_signal = 0.5;
        snapshot.bollinger_signal = BollingerSignal::Oversold;

        let (up, down) = signal_counts(&snapshot, Some(1.5));
        assert_eq!(up, 4);
        assert_eq!(down, 0);

        snapshot.rsi = 75.0;
        snapshot.macd = 0.0;
        snapshot.macd_signal = 0.5;
        snapshot.bollinger_signal = BollingerSignal::Overbought;
        let (up, down) = signal_counts(&snapshot, Some(0.5));
        assert_eq!(up, 0);
        assert_eq!(down, 4);
    }

    #[test]
    fn missing_order_book_contributes_no_vote() {
        let snapshot = Evidence::neutral("TEST".into()).indicators;
        let (up, down) = signal_counts(&snapshot, None);
        assert_eq!(up, 0);
        assert_eq!(down, 0);
    }

    #[test]
    fn indicators_need_at_least_two_candles() {
        assert!(compute_indicators(&[candle(100.0)]).is_none());
        let candles: Vec<Candle> = (0..60).map(|i| candle(100.0 + i as f64 * 0.1)).collect();
        let snapshot = compute_indicators(&candles).unwrap();
        assert!(snapshot.rsi > 50.0);
        assert!((snapshot.last_close - 105.9).abs() < 1e-9);
    }
}
