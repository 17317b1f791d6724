// DECISION: the trading decision cascade
// Pure function of Evidence. Output is a directional signal (trend counts,
// order book, oscillators, MACD refinement) plus a strength label from the
// pattern/trend/indicator matrix; execution only acts when both agree.

use crate::evidence::{BollingerSignal, Evidence};
use crate::patterns::CandlePattern;
use crate::types::{Side, TrendDirection};

const RSI_OVERBOUGHT: f64 = 60.0;
const RSI_OVERSOLD: f64 = 40.0;
const RSI_MIDLINE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Long,
    Short,
    Neutral,
}

/// Directional signal from cascade steps 1-4. The position flags can be set
/// additively by the MACD refinement without changing the bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionSignal {
    pub bias: Bias,
    pub long_position: bool,
    pub short_position: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionLabel {
    StrongLong,
    Long,
    HoldPotentialLong,
    StrongShort,
    Short,
    HoldPotentialShort,
    HoldCareful,
    NeutralHold,
}

impl std::fmt::Display for DecisionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecisionLabel::StrongLong => "Strong Long",
            DecisionLabel::Long => "Long",
            DecisionLabel::HoldPotentialLong => "Hold (Potential Long)",
            DecisionLabel::StrongShort => "Strong Short",
            DecisionLabel::Short => "Short",
            DecisionLabel::HoldPotentialShort => "Hold (Potential Short)",
            DecisionLabel::HoldCareful => "Hold/Careful Consideration",
            DecisionLabel::NeutralHold => "Neutral/Hold",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub symbol: String,
    pub direction: DirectionSignal,
    pub label: DecisionLabel,
}

impl Decision {
    /// The side to act on, only when the directional signal and the strength
    /// label agree. Hold labels are never actionable.
    pub fn agreed_side(&self) -> Option<Side> {
        let label_side = match self.label {
            DecisionLabel::StrongLong | DecisionLabel::Long => Side::Buy,
            DecisionLabel::StrongShort | DecisionLabel::Short => Side::Sell,
            _ => return None,
        };
        let direction_side = match self.direction.bias {
            Bias::Long => Side::Buy,
            Bias::Short => Side::Sell,
            Bias::Neutral => {
                if self.direction.long_position && !self.direction.short_position {
                    Side::Buy
                } else if self.direction.short_position && !self.direction.long_position {
                    Side::Sell
                } else {
                    return None;
                }
            }
        };
        (label_side == direction_side).then_some(label_side)
    }
}

pub fn decide(evidence: &Evidence) -> Decision {
    Decision {
        symbol: evidence.symbol.clone(),
        direction: direction_signal(evidence),
        label: strength_label(evidence),
    }
}

/// Steps 1-4 of the cascade: trend-count priority, order-book tiebreak,
/// oscillator fallback, MACD refinement.
fn direction_signal(evidence: &Evidence) -> DirectionSignal {
    let ind = &evidence.indicators;
    let mut signal = DirectionSignal {
        bias: Bias::Neutral,
        long_position: false,
        short_position: false,
    };

    if evidence.uptrend_signals > evidence.downtrend_signals {
        signal.bias = Bias::Long;
        signal.long_position = true;
    } else if evidence.downtrend_signals > evidence.uptrend_signals {
        signal.bias = Bias::Short;
        signal.short_position = true;
    } else {
        match evidence.order_book_trend {
            Some(crate::types::OrderBookTrend::UptrendExpected) => {
                signal.bias = Bias::Long;
                signal.long_position = true;
            }
            Some(crate::types::OrderBookTrend::DowntrendExpected) => {
                signal.bias = Bias::Short;
                signal.short_position = true;
            }
            // An uncertain book forces neutral rather than falling through.
            Some(_) => {}
            None => {
                if ind.rsi > RSI_OVERBOUGHT || ind.bollinger_signal == BollingerSignal::Overbought
                {
                    signal.bias = Bias::Short;
                    signal.short_position = true;
                } else if ind.rsi < RSI_OVERSOLD
                    || ind.bollinger_signal == BollingerSignal::Oversold
                {
                    signal.bias = Bias::Long;
                    signal.long_position = true;
                }
            }
        }
    }

    // MACD refinement adds a position flag but never removes one.
    if ind.macd < ind.macd_signal && ind.rsi > RSI_MIDLINE {
        signal.short_position = true;
    } else if ind.macd > ind.macd_signal && ind.rsi < RSI_MIDLINE {
        signal.long_position = true;
    }

    signal
}

/// Step 5: the pattern/trend/indicator matrix producing the strength label.
fn strength_label(evidence: &Evidence) -> DecisionLabel {
    let ind = &evidence.indicators;
    let primary = evidence
        .patterns
        .iter()
        .copied()
        .find(|p| !p.is_doji_like())
        .or_else(|| evidence.patterns.first().copied());
    let Some(pattern) = primary else {
        return DecisionLabel::NeutralHold;
    };

    if pattern.is_bullish_leaning() && evidence.trend == TrendDirection::Upward {
        let fully_confirmed = ind.macd_cross_above
            && ind.macd_histogram > 0.0
            && ind.rsi > RSI_MIDLINE
            && ind.price_cross_above_ema50
            && ind.stoch_cross_above
            && ind.obv_rising;
        return if fully_confirmed {
            DecisionLabel::StrongLong
        } else if ind.rsi > RSI_MIDLINE && ind.obv_rising {
            DecisionLabel::Long
        } else {
            DecisionLabel::HoldPotentialLong
        };
    }

    if pattern.is_bearish_leaning() && evidence.trend == TrendDirection::Downward {
        let fully_confirmed = ind.macd_cross_below
            && ind.macd_histogram < 0.0
            && ind.rsi < RSI_MIDLINE
            && ind.price_cross_below_ema50
            && ind.stoch_cross_below
            && ind.obv_falling;
        return if fully_confirmed {
            DecisionLabel::StrongShort
        } else if ind.rsi < RSI_MIDLINE && ind.obv_falling {
            DecisionLabel::Short
        } else {
            DecisionLabel::HoldPotentialShort
        };
    }

    match pattern {
        CandlePattern::ThreeWhiteSoldiers => {
            if ind.macd > ind.macd_signal && ind.rsi > RSI_MIDLINE {
                DecisionLabel::Long
            } else {
                DecisionLabel::HoldCareful
            }
        }
        CandlePattern::ThreeBlackCrows => {
            if ind.macd < ind.macd_signal && ind.rsi < RSI_MIDLINE {
                DecisionLabel::Short
            } else {
                DecisionLabel::HoldCareful
            }
        }
        CandlePattern::BullishBeltHold => {
            if evidence.trend == TrendDirection::Upward && ind.macd > ind.macd_signal {
                DecisionLabel::Long
            } else {
                DecisionLabel::HoldCareful
            }
        }
        CandlePattern::BearishBeltHold => {
            if evidence.trend == TrendDirection::Downward && ind.macd < ind.macd_signal {
                DecisionLabel::Short
            } else {
                DecisionLabel::HoldCareful
            }
        }
        p if p.is_doji_like() => DecisionLabel::HoldCareful,
        _ => DecisionLabel::NeutralHold,
    }
}
