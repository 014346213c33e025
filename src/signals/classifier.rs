// =============================================================================
// Signal Classifier — RSI value => overbought / oversold / neutral
// =============================================================================
//
// Boundaries are inclusive on both sides:
//   value >= overbought  =>  OVERBOUGHT
//   value <= oversold    =>  OVERSOLD
//   otherwise            =>  NEUTRAL
//
// An undefined RSI value never produces a signal.

use serde::{Deserialize, Serialize};

use crate::types::{SignalState, RSI_LONG_PERIOD, RSI_SHORT_PERIOD};

fn default_thresholds_14() -> RsiThresholds {
    RsiThresholds {
        overbought: 65.0,
        oversold: 35.0,
    }
}

fn default_thresholds_6() -> RsiThresholds {
    RsiThresholds {
        overbought: 70.0,
        oversold: 30.0,
    }
}

/// Overbought / oversold cut-offs for one RSI period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiThresholds {
    pub overbought: f64,
    pub oversold: f64,
}

impl RsiThresholds {
    /// Oversold must sit strictly below overbought, both inside [0, 100].
    pub fn is_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.oversold)
            && (0.0..=100.0).contains(&self.overbought)
            && self.oversold < self.overbought
    }
}

/// Per-period thresholds; each period is configured independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalThresholds {
    #[serde(default = "default_thresholds_14")]
    pub rsi_14: RsiThresholds,

    #[serde(default = "default_thresholds_6")]
    pub rsi_6: RsiThresholds,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            rsi_14: default_thresholds_14(),
            rsi_6: default_thresholds_6(),
        }
    }
}

impl SignalThresholds {
    pub fn for_period(&self, period: usize) -> Option<&RsiThresholds> {
        match period {
            RSI_LONG_PERIOD => Some(&self.rsi_14),
            RSI_SHORT_PERIOD => Some(&self.rsi_6),
            _ => None,
        }
    }
}

/// Classify an RSI reading for `period`.
///
/// Returns `None` for an undefined value or a period with no thresholds.
pub fn classify(
    value: Option<f64>,
    period: usize,
    thresholds: &SignalThresholds,
) -> Option<SignalState> {
    let value = value?;
    let t = thresholds.for_period(period)?;

    let state = if value >= t.overbought {
        SignalState::Overbought
    } else if value <= t.oversold {
        SignalState::Oversold
    } else {
        SignalState::Neutral
    };

    Some(state)
}
