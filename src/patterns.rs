// PATTERNS: candlestick pattern catalogue
// Every detector is a pure function of the last k candles (oldest first) and,
// where the classic definition needs it, the trend context leading into the
// pattern. Thresholds are literal constants; they define what counts as a
// recognized pattern.

use crate::types::{Candle, TrendDirection};

/// Body may be at most this fraction of the range for a doji.
const DOJI_BODY_MAX_RATIO: f64 = 0.05;
/// Body may be at most this fraction of the range for a spinning top.
const SPINNING_TOP_BODY_MAX_RATIO: f64 = 0.3;
/// Hammer family: lower shadow must be at least twice the body...
const HAMMER_LOWER_SHADOW_MIN_RATIO: f64 = 2.0;
/// ...and the upper shadow at most half the body.
const HAMMER_UPPER_SHADOW_MAX_RATIO: f64 = 0.5;
/// Star middle candle body vs the first candle body.
const STAR_BODY_MAX_RATIO: f64 = 0.3;
/// A "long body" covers at least this fraction of the range.
const LONG_BODY_MIN_RATIO: f64 = 0.6;
/// Shadow small enough to count as absent, relative to the range.
const SHADOW_TOLERANCE_RATIO: f64 = 0.05;
/// Relative tolerance for matching price levels (tweezers, separating lines).
const PRICE_MATCH_TOLERANCE: f64 = 0.001;
/// On-neck/in-neck closeness band, relative to the previous body.
const NECK_TOLERANCE_RATIO: f64 = 0.1;
/// Dominant shadow of a dragonfly/gravestone doji, relative to the range.
const DOJI_DOMINANT_SHADOW_RATIO: f64 = 0.6;
/// Both shadows of a long-legged doji, relative to the range.
const DOJI_LONG_LEG_RATIO: f64 = 0.3;
/// Side-by-side white lines: bodies must match within this fraction.
const SIMILAR_BODY_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlePattern {
    Hammer,
    HangingMan,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    DarkCloudCover,
    Piercing,
    OnNeck,
    InNeck,
    Thrusting,
    MorningStar,
    MorningDojiStar,
    EveningStar,
    EveningDojiStar,
    BullishHarami,
    BearishHarami,
    BullishHaramiCross,
    BearishHaramiCross,
    BullishBeltHold,
    BearishBeltHold,
    TweezersTop,
    TweezersBottom,
    ThreeBlackCrows,
    ThreeWhiteSoldiers,
    UpsideGapTwoCrows,
    TowerTop,
    TowerBottom,
    RisingWindow,
    FallingWindow,
    UpwardGapTasuki,
    DownwardGapTasuki,
    SideBySideWhiteLines,
    RisingThreeMethods,
    FallingThreeMethods,
    BullishSeparatingLines,
    BearishSeparatingLines,
    DragonflyDoji,
    GravestoneDoji,
    LongLeggedDoji,
    Doji,
    SpinningTop,
}

impl CandlePattern {
    pub fn is_bullish_leaning(&self) -> bool {
        matches!(
            self,
            CandlePattern::BullishEngulfing
                | CandlePattern::BullishHarami
                | CandlePattern::BullishHaramiCross
                | CandlePattern::Piercing
                | CandlePattern::MorningStar
                | CandlePattern::MorningDojiStar
                | CandlePattern::Hammer
                | CandlePattern::ThreeWhiteSoldiers
        )
    }

    pub fn is_bearish_leaning(&self) -> bool {
        matches!(
            self,
            CandlePattern::BearishEngulfing
                | CandlePattern::BearishHarami
                | CandlePattern::BearishHaramiCross
                | CandlePattern::DarkCloudCover
                | CandlePattern::EveningStar
                | CandlePattern::EveningDojiStar
                | CandlePattern::HangingMan
                | CandlePattern::ShootingStar
                | CandlePattern::ThreeBlackCrows
        )
    }

    pub fn is_doji_like(&self) -> bool {
        matches!(
            self,
            CandlePattern::DragonflyDoji
                | CandlePattern::GravestoneDoji
                | CandlePattern::LongLeggedDoji
                | CandlePattern::Doji
                | CandlePattern::SpinningTop
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CandlePattern::Hammer => "hammer",
            CandlePattern::HangingMan => "hangingman",
            CandlePattern::ShootingStar => "shooting star",
            CandlePattern::BullishEngulfing => "bullish engulfing",
            CandlePattern::BearishEngulfing => "bearish engulfing",
            CandlePattern::DarkCloudCover => "dark cloud cover",
            CandlePattern::Piercing => "piercing",
            CandlePattern::OnNeck => "on-neck",
            CandlePattern::InNeck => "in-neck",
            CandlePattern::Thrusting => "thrusting",
            CandlePattern::MorningStar => "morning star",
            CandlePattern::MorningDojiStar => "morning doji star",
            CandlePattern::EveningStar => "evening star",
            CandlePattern::EveningDojiStar => "evening doji star",
            CandlePattern::BullishHarami => "bullish harami",
            CandlePattern::BearishHarami => "bearish harami",
            CandlePattern::BullishHaramiCross => "bullish harami cross",
            CandlePattern::BearishHaramiCross => "bearish harami cross",
            CandlePattern::BullishBeltHold => "bullish belt hold",
            CandlePattern::BearishBeltHold => "bearish belt hold",
            CandlePattern::TweezersTop => "tweezers top",
            CandlePattern::TweezersBottom => "tweezers bottom",
            CandlePattern::ThreeBlackCrows => "three black crows",
            CandlePattern::ThreeWhiteSoldiers => "three white soldiers",
            CandlePattern::UpsideGapTwoCrows => "upside gap two crows",
            CandlePattern::TowerTop => "tower top",
            CandlePattern::TowerBottom => "tower bottom",
            CandlePattern::RisingWindow => "rising window",
            CandlePattern::FallingWindow => "falling window",
            CandlePattern::UpwardGapTasuki => "upward gap tasuki",
            CandlePattern::DownwardGapTasuki => "downward gap tasuki",
            CandlePattern::SideBySideWhiteLines => "side-by-side white lines",
            CandlePattern::RisingThreeMethods => "rising three methods",
            CandlePattern::FallingThreeMethods => "falling three methods",
            CandlePattern::BullishSeparatingLines => "bullish separating lines",
            CandlePattern::BearishSeparatingLines => "bearish separating lines",
            CandlePattern::DragonflyDoji => "dragonfly doji",
            CandlePattern::GravestoneDoji => "gravestone doji",
            CandlePattern::LongLeggedDoji => "long-legged doji",
            CandlePattern::Doji => "doji",
            CandlePattern::SpinningTop => "spinning top",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Found(CandlePattern),
    NoPattern,
    InsufficientData,
}

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> f64 {
    c.high - c.low
}

fn body_top(c: &Candle) -> f64 {
    c.open.max(c.close)
}

fn body_bottom(c: &Candle) -> f64 {
    c.open.min(c.close)
}

fn upper_shadow(c: &Candle) -> f64 {
    c.high - body_top(c)
}

fn lower_shadow(c: &Candle) -> f64 {
    body_bottom(c) - c.low
}

fn midpoint(c: &Candle) -> f64 {
    (c.open + c.close) / 2.0
}

fn is_bull(c: &Candle) -> bool {
    c.close > c.open
}

fn is_bear(c: &Candle) -> bool {
    c.close < c.open
}

fn is_doji_candle(c: &Candle) -> bool {
    range(c) > 0.0 && body(c) <= DOJI_BODY_MAX_RATIO * range(c)
}

fn is_long_body(c: &Candle) -> bool {
    range(c) > 0.0 && body(c) >= LONG_BODY_MIN_RATIO * range(c)
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= PRICE_MATCH_TOLERANCE * a.abs().max(b.abs())
}

fn last_n(candles: &[Candle], n: usize) -> Option<&[Candle]> {
    if candles.len() < n {
        None
    } else {
        Some(&candles[candles.len() - n..])
    }
}

/// Hammer shape in a downtrend, hanging man in an uptrend.
pub fn hammer(candles: &[Candle], trend: TrendDirection) -> Detection {
    let Some(w) = last_n(candles, 1) else {
        return Detection::InsufficientData;
    };
    let c = &w[0];
    let b = body(c);
    if b <= 0.0 {
        return Detection::NoPattern;
    }
    let shape = lower_shadow(c) >= HAMMER_LOWER_SHADOW_MIN_RATIO * b
        && upper_shadow(c) <= HAMMER_UPPER_SHADOW_MAX_RATIO * b;
    if !shape {
        return Detection::NoPattern;
    }
    match trend {
        TrendDirection::Downward => Detection::Found(CandlePattern::Hammer),
        TrendDirection::Upward => Detection::Found(CandlePattern::HangingMan),
        TrendDirection::Flat => Detection::NoPattern,
    }
}

pub fn shooting_star(candles: &[Candle], trend: TrendDirection) -> Detection {
    let Some(w) = last_n(candles, 1) else {
        return Detection::InsufficientData;
    };
    let c = &w[0];
    let b = body(c);
    if b <= 0.0 || trend != TrendDirection::Upward {
        return Detection::NoPattern;
    }
    if upper_shadow(c) >= HAMMER_LOWER_SHADOW_MIN_RATIO * b
        && lower_shadow(c) <= HAMMER_UPPER_SHADOW_MAX_RATIO * b
    {
        Detection::Found(CandlePattern::ShootingStar)
    } else {
        Detection::NoPattern
    }
}

pub fn engulfing(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    if body(b) <= body(a) {
        return Detection::NoPattern;
    }
    if is_bear(a) && is_bull(b) && b.open <= a.close && b.close >= a.open {
        Detection::Found(CandlePattern::BullishEngulfing)
    } else if is_bull(a) && is_bear(b) && b.open >= a.close && b.close <= a.open {
        Detection::Found(CandlePattern::BearishEngulfing)
    } else {
        Detection::NoPattern
    }
}

pub fn dark_cloud_cover(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    if is_bull(a)
        && is_long_body(a)
        && is_bear(b)
        && b.open > a.high
        && b.close < midpoint(a)
        && b.close > a.open
    {
        Detection::Found(CandlePattern::DarkCloudCover)
    } else {
        Detection::NoPattern
    }
}

pub fn piercing(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    if is_bear(a)
        && is_long_body(a)
        && is_bull(b)
        && b.open < a.low
        && b.close > midpoint(a)
        && b.close < a.open
    {
        Detection::Found(CandlePattern::Piercing)
    } else {
        Detection::NoPattern
    }
}

/// On-neck, in-neck and thrusting share the setup (bearish long candle, next
/// opens below its low) and differ only in how far the close recovers.
pub fn neck_lines(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    if !(is_bear(a) && is_long_body(a) && is_bull(b) && b.open < a.low) {
        return Detection::NoPattern;
    }
    let band = NECK_TOLERANCE_RATIO * body(a);
    if (b.close - a.low).abs() <= band {
        Detection::Found(CandlePattern::OnNeck)
    } else if b.close >= a.close && b.close <= a.close + band {
        Detection::Found(CandlePattern::InNeck)
    } else if b.close > a.close + band && b.close < midpoint(a) {
        Detection::Found(CandlePattern::Thrusting)
    } else {
        Detection::NoPattern
    }
}

pub fn morning_star(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 3) else {
        return Detection::InsufficientData;
    };
    let (a, b, c) = (&w[0], &w[1], &w[2]);
    if is_bear(a)
        && is_long_body(a)
        && body(b) <= STAR_BODY_MAX_RATIO * body(a)
        && body_top(b) < a.close
        && is_bull(c)
        && c.close > midpoint(a)
    {
        if is_doji_candle(b) {
            Detection::Found(CandlePattern::MorningDojiStar)
        } else {
            Detection::Found(CandlePattern::MorningStar)
        }
    } else {
        Detection::NoPattern
    }
}

pub fn evening_star(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 3) else {
        return Detection::InsufficientData;
    };
    let (a, b, c) = (&w[0], &w[1], &w[2]);
    if is_bull(a)
        && is_long_body(a)
        && body(b) <= STAR_BODY_MAX_RATIO * body(a)
        && body_bottom(b) > a.close
        && is_bear(c)
        && c.close < midpoint(a)
    {
        if is_doji_candle(b) {
            Detection::Found(CandlePattern::EveningDojiStar)
        } else {
            Detection::Found(CandlePattern::EveningStar)
        }
    } else {
        Detection::NoPattern
    }
}

pub fn harami(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    let contained = is_long_body(a)
        && body_top(b) < body_top(a)
        && body_bottom(b) > body_bottom(a);
    if !contained {
        return Detection::NoPattern;
    }
    if is_doji_candle(b) {
        // Harami cross leans against the first candle's direction.
        return if is_bear(a) {
            Detection::Found(CandlePattern::BullishHaramiCross)
        } else {
            Detection::Found(CandlePattern::BearishHaramiCross)
        };
    }
    if is_bear(a) && is_bull(b) {
        Detection::Found(CandlePattern::BullishHarami)
    } else if is_bull(a) && is_bear(b) {
        Detection::Found(CandlePattern::BearishHarami)
    } else {
        Detection::NoPattern
    }
}

pub fn belt_hold(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 1) else {
        return Detection::InsufficientData;
    };
    let c = &w[0];
    if !is_long_body(c) {
        return Detection::NoPattern;
    }
    let tol = SHADOW_TOLERANCE_RATIO * range(c);
    if is_bull(c) && lower_shadow(c) <= tol {
        Detection::Found(CandlePattern::BullishBeltHold)
    } else if is_bear(c) && upper_shadow(c) <= tol {
        Detection::Found(CandlePattern::BearishBeltHold)
    } else {
        Detection::NoPattern
    }
}

pub fn tweezers(candles: &[Candle], trend: TrendDirection) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    if trend == TrendDirection::Upward && approx_eq(a.high, b.high) && is_bull(a) && is_bear(b) {
        Detection::Found(CandlePattern::TweezersTop)
    } else if trend == TrendDirection::Downward
        && approx_eq(a.low, b.low)
        && is_bear(a)
        && is_bull(b)
    {
        Detection::Found(CandlePattern::TweezersBottom)
    } else {
        Detection::NoPattern
    }
}

pub fn three_black_crows(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 3) else {
        return Detection::InsufficientData;
    };
    let (a, b, c) = (&w[0], &w[1], &w[2]);
    let all_bear_long = [a, b, c].into_iter().all(|x| is_bear(x) && is_long_body(x));
    if all_bear_long
        && b.close < a.close
        && c.close < b.close
        && b.open <= a.open
        && b.open >= a.close
        && c.open <= b.open
        && c.open >= b.close
    {
        Detection::Found(CandlePattern::ThreeBlackCrows)
    } else {
        Detection::NoPattern
    }
}

pub fn three_white_soldiers(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 3) else {
        return Detection::InsufficientData;
    };
    let (a, b, c) = (&w[0], &w[1], &w[2]);
    let all_bull_long = [a, b, c].into_iter().all(|x| is_bull(x) && is_long_body(x));
    if all_bull_long
        && b.close > a.close
        && c.close > b.close
        && b.open >= a.open
        && b.open <= a.close
        && c.open >= b.open
        && c.open <= b.close
    {
        Detection::Found(CandlePattern::ThreeWhiteSoldiers)
    } else {
        Detection::NoPattern
    }
}

pub fn upside_gap_two_crows(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 3) else {
        return Detection::InsufficientData;
    };
    let (a, b, c) = (&w[0], &w[1], &w[2]);
    if is_bull(a)
        && is_long_body(a)
        && is_bear(b)
        && body_bottom(b) > a.close
        && is_bear(c)
        && c.open > b.open
        && c.close < b.close
        && c.close > a.close
    {
        Detection::Found(CandlePattern::UpsideGapTwoCrows)
    } else {
        Detection::NoPattern
    }
}

pub fn tower(candles: &[Candle], trend: TrendDirection) -> Detection {
    let Some(w) = last_n(candles, 5) else {
        return Detection::InsufficientData;
    };
    let first = &w[0];
    let pause_small = w[1..4].iter().all(|c| body(c) <= 0.5 * body(first));
    let last = &w[4];
    if trend == TrendDirection::Upward
        && is_bull(first)
        && is_long_body(first)
        && pause_small
        && is_bear(last)
        && is_long_body(last)
        && last.close < midpoint(first)
    {
        Detection::Found(CandlePattern::TowerTop)
    } else if trend == TrendDirection::Downward
        && is_bear(first)
        && is_long_body(first)
        && pause_small
        && is_bull(last)
        && is_long_body(last)
        && last.close > midpoint(first)
    {
        Detection::Found(CandlePattern::TowerBottom)
    } else {
        Detection::NoPattern
    }
}

/// Rising/falling window: a plain gap between two consecutive candles.
pub fn window(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    if b.low > a.high {
        Detection::Found(CandlePattern::RisingWindow)
    } else if b.high < a.low {
        Detection::Found(CandlePattern::FallingWindow)
    } else {
        Detection::NoPattern
    }
}

pub fn gap_tasuki(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 3) else {
        return Detection::InsufficientData;
    };
    let (a, b, c) = (&w[0], &w[1], &w[2]);
    if is_bull(a)
        && is_bull(b)
        && b.low > a.high
        && is_bear(c)
        && c.open > b.open
        && c.open < b.close
        && c.close < b.low
        && c.close > a.high
    {
        Detection::Found(CandlePattern::UpwardGapTasuki)
    } else if is_bear(a)
        && is_bear(b)
        && b.high < a.low
        && is_bull(c)
        && c.open < b.open
        && c.open > b.close
        && c.close > b.high
        && c.close < a.low
    {
        Detection::Found(CandlePattern::DownwardGapTasuki)
    } else {
        Detection::NoPattern
    }
}

pub fn side_by_side_white_lines(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 3) else {
        return Detection::InsufficientData;
    };
    let (a, b, c) = (&w[0], &w[1], &w[2]);
    let similar_bodies = (body(b) - body(c)).abs() <= SIMILAR_BODY_RATIO * body(b).max(body(c));
    if is_bull(a)
        && is_bull(b)
        && b.low > a.high
        && is_bull(c)
        && c.low > a.high
        && approx_eq(b.open, c.open)
        && similar_bodies
    {
        Detection::Found(CandlePattern::SideBySideWhiteLines)
    } else {
        Detection::NoPattern
    }
}

pub fn three_methods(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 5) else {
        return Detection::InsufficientData;
    };
    let first = &w[0];
    let last = &w[4];
    let pause_inside = w[1..4]
        .iter()
        .all(|c| body(c) < body(first) && c.high <= first.high && c.low >= first.low);
    if is_bull(first)
        && is_long_body(first)
        && pause_inside
        && is_bull(last)
        && is_long_body(last)
        && last.close > first.close
    {
        Detection::Found(CandlePattern::RisingThreeMethods)
    } else if is_bear(first)
        && is_long_body(first)
        && pause_inside
        && is_bear(last)
        && is_long_body(last)
        && last.close < first.close
    {
        Detection::Found(CandlePattern::FallingThreeMethods)
    } else {
        Detection::NoPattern
    }
}

pub fn separating_lines(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 2) else {
        return Detection::InsufficientData;
    };
    let (a, b) = (&w[0], &w[1]);
    if !approx_eq(a.open, b.open) {
        return Detection::NoPattern;
    }
    if is_bear(a) && is_bull(b) {
        Detection::Found(CandlePattern::BullishSeparatingLines)
    } else if is_bull(a) && is_bear(b) {
        Detection::Found(CandlePattern::BearishSeparatingLines)
    } else {
        Detection::NoPattern
    }
}

pub fn doji(candles: &[Candle]) -> Detection {
    let Some(w) = last_n(candles, 1) else {
        return Detection::InsufficientData;
    };
    let c = &w[0];
    let r = range(c);
    if r <= 0.0 {
        return Detection::NoPattern;
    }
    if is_doji_candle(c) {
        let upper = upper_shadow(c);
        let lower = lower_shadow(c);
        if lower >= DOJI_DOMINANT_SHADOW_RATIO * r && upper <= SHADOW_TOLERANCE_RATIO * r {
            Detection::Found(CandlePattern::DragonflyDoji)
        } else if upper >= DOJI_DOMINANT_SHADOW_RATIO * r && lower <= SHADOW_TOLERANCE_RATIO * r {
            Detection::Found(CandlePattern::GravestoneDoji)
        } else if upper >= DOJI_LONG_LEG_RATIO * r && lower >= DOJI_LONG_LEG_RATIO * r {
            Detection::Found(CandlePattern::LongLeggedDoji)
        } else {
            Detection::Found(CandlePattern::Doji)
        }
    } else if body(c) <= SPINNING_TOP_BODY_MAX_RATIO * r
        && upper_shadow(c) > body(c)
        && lower_shadow(c) > body(c)
    {
        Detection::Found(CandlePattern::SpinningTop)
    } else {
        Detection::NoPattern
    }
}

/// Run the whole catalogue, multi-candle patterns first so the strongest
/// formation ends up as the primary pattern.
pub fn scan_patterns(candles: &[Candle], trend: TrendDirection) -> Vec<CandlePattern> {
    let detections = [
        three_methods(candles),
        tower(candles, trend),
        three_black_crows(candles),
        three_white_soldiers(candles),
        morning_star(candles),
        evening_star(candles),
        upside_gap_two_crows(candles),
        gap_tasuki(candles),
        side_by_side_white_lines(candles),
        engulfing(candles),
        harami(candles),
        dark_cloud_cover(candles),
        piercing(candles),
        neck_lines(candles),
        tweezers(candles, trend),
        separating_lines(candles),
        window(candles),
        belt_hold(candles),
        hammer(candles, trend),
        shooting_star(candles, trend),
        doji(candles),
    ];
    detections
        .into_iter()
        .filter_map(|d| match d {
            Detection::Found(p) => Some(p),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            close_time: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn hammer_in_downtrend_hanging_man_in_uptrend() {
        // body = 1, lower shadow = 10 (>= 2x body), upper shadow = 0.3 (<= 0.5x body)
        let c = vec![candle(100.0, 101.3, 90.0, 101.0)];
        assert_eq!(
            hammer(&c, TrendDirection::Downward),
            Detection::Found(CandlePattern::Hammer)
        );
        assert_eq!(
            hammer(&c, TrendDirection::Upward),
            Detection::Found(CandlePattern::HangingMan)
        );
        assert_eq!(hammer(&c, TrendDirection::Flat), Detection::NoPattern);
    }

    #[test]
    fn hammer_rejects_long_upper_shadow() {
        // upper shadow = 4 > 0.5x body
        let c = vec![candle(100.0, 105.0, 90.0, 101.0)];
        assert_eq!(hammer(&c, TrendDirection::Downward), Detection::NoPattern);
    }

    #[test]
    fn hammer_needs_a_candle() {
        assert_eq!(
            hammer(&[], TrendDirection::Downward),
            Detection::InsufficientData
        );
    }

    #[test]
    fn engulfing_both_directions() {
        let bull = vec![candle(105.0, 106.0, 99.0, 100.0), candle(99.0, 107.0, 98.0, 106.0)];
        assert_eq!(
            engulfing(&bull),
            Detection::Found(CandlePattern::BullishEngulfing)
        );

        let bear = vec![candle(100.0, 106.0, 99.0, 105.0), candle(106.0, 107.0, 98.0, 99.0)];
        assert_eq!(
            engulfing(&bear),
            Detection::Found(CandlePattern::BearishEngulfing)
        );
    }

    #[test]
    fn piercing_closes_above_midpoint() {
        let c = vec![candle(110.0, 111.0, 100.0, 101.0), candle(99.0, 107.0, 98.5, 106.0)];
        assert_eq!(piercing(&c), Detection::Found(CandlePattern::Piercing));
    }

    #[test]
    fn dark_cloud_cover_closes_below_midpoint() {
        let c = vec![candle(100.0, 110.5, 99.5, 110.0), candle(111.0, 112.0, 102.0, 103.0)];
        assert_eq!(
            dark_cloud_cover(&c),
            Detection::Found(CandlePattern::DarkCloudCover)
        );
    }

    #[test]
    fn morning_star_with_doji_middle() {
        let c = vec![
            candle(110.0, 111.0, 99.0, 100.0),
            candle(98.0, 98.6, 97.5, 98.05),
            candle(99.0, 108.0, 98.5, 107.0),
        ];
        assert_eq!(
            morning_star(&c),
            Detection::Found(CandlePattern::MorningDojiStar)
        );
    }

    #[test]
    fn three_white_soldiers_ascending_closes() {
        let c = vec![
            candle(100.0, 105.5, 99.8, 105.0),
            candle(103.0, 109.5, 102.8, 109.0),
            candle(107.0, 113.5, 106.8, 113.0),
        ];
        assert_eq!(
            three_white_soldiers(&c),
            Detection::Found(CandlePattern::ThreeWhiteSoldiers)
        );
    }

    #[test]
    fn three_black_crows_descending_closes() {
        let c = vec![
            candle(113.0, 113.2, 106.8, 107.0),
            candle(109.0, 109.2, 102.8, 103.0),
            candle(105.0, 105.2, 98.8, 99.0),
        ];
        assert_eq!(
            three_black_crows(&c),
            Detection::Found(CandlePattern::ThreeBlackCrows)
        );
    }

    #[test]
    fn rising_window_is_a_gap_up() {
        let c = vec![candle(100.0, 102.0, 99.0, 101.0), candle(103.0, 105.0, 102.5, 104.0)];
        assert_eq!(window(&c), Detection::Found(CandlePattern::RisingWindow));
    }

    #[test]
    fn doji_subtypes() {
        // Dragonfly: tiny body at the top, all lower shadow.
        let dragonfly = vec![candle(100.0, 100.2, 90.0, 100.1)];
        assert_eq!(
            doji(&dragonfly),
            Detection::Found(CandlePattern::DragonflyDoji)
        );

        // Gravestone: tiny body at the bottom, all upper shadow.
        let gravestone = vec![candle(100.1, 110.0, 99.9, 100.0)];
        assert_eq!(
            doji(&gravestone),
            Detection::Found(CandlePattern::GravestoneDoji)
        );

        // Long-legged: tiny body in the middle.
        let long_legged = vec![candle(100.0, 105.0, 95.0, 100.2)];
        assert_eq!(
            doji(&long_legged),
            Detection::Found(CandlePattern::LongLeggedDoji)
        );

        // Spinning top: small but not doji body, shadows both sides.
        let spinning = vec![candle(100.0, 103.0, 97.5, 101.0)];
        assert_eq!(doji(&spinning), Detection::Found(CandlePattern::SpinningTop));
    }

    #[test]
    fn harami_and_harami_cross() {
        let plain = vec![candle(110.0, 110.5, 99.5, 100.0), candle(103.0, 105.5, 102.0, 105.0)];
        assert_eq!(harami(&plain), Detection::Found(CandlePattern::BullishHarami));

        let cross = vec![candle(110.0, 110.5, 99.5, 100.0), candle(105.0, 105.6, 104.4, 105.02)];
        assert_eq!(
            harami(&cross),
            Detection::Found(CandlePattern::BullishHaramiCross)
        );
    }

    #[test]
    fn scan_prioritizes_multi_candle_patterns() {
        // Three white soldiers where the last candle alone is also a belt hold.
        let c = vec![
            candle(100.0, 105.5, 99.8, 105.0),
            candle(103.0, 109.5, 102.8, 109.0),
            candle(107.0, 113.5, 107.0, 113.0),
        ];
        let found = scan_patterns(&c, TrendDirection::Upward);
        assert_eq!(found.first(), Some(&CandlePattern::ThreeWhiteSoldiers));
        assert!(found.contains(&CandlePattern::BullishBeltHold));
    }
}
