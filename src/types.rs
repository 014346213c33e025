// =============================================================================
// Shared types used across the RSI alert pipeline
// =============================================================================

use serde::{Deserialize, Serialize};

/// Long RSI lookback window.
pub const RSI_LONG_PERIOD: usize = 14;
/// Short RSI lookback window.
pub const RSI_SHORT_PERIOD: usize = 6;

/// Threshold classification of a single RSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalState {
    Overbought,
    Oversold,
    Neutral,
}

impl SignalState {
    /// Label used in the notification body.
    pub fn label_zh(&self) -> &'static str {
        match self {
            Self::Overbought => "超买",
            Self::Oversold => "超卖",
            Self::Neutral => "中性",
        }
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overbought => write!(f, "OVERBOUGHT"),
            Self::Oversold => write!(f, "OVERSOLD"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// One RSI value for one lookback window, plus its classification.
///
/// `value` is `None` when the series was too short or could not be fetched;
/// in that case `signal` is always `None` as well.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiReading {
    pub period: usize,
    pub value: Option<f64>,
    pub signal: Option<SignalState>,
}

impl RsiReading {
    pub fn undefined(period: usize) -> Self {
        Self {
            period,
            value: None,
            signal: None,
        }
    }

    /// Indicator label, e.g. `RSI-14`.
    pub fn indicator(&self) -> String {
        format!("RSI-{}", self.period)
    }
}

/// How far processing of a single asset got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetStatus {
    Ok,
    InsufficientData,
    FetchFailed(String),
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::InsufficientData => write!(f, "insufficient data"),
            Self::FetchFailed(reason) => write!(f, "fetch failed: {reason}"),
        }
    }
}

/// Per-asset result of one run. Always carries both the 14 and 6 readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetReport {
    pub symbol: String,
    pub rsi_14: RsiReading,
    pub rsi_6: RsiReading,
    pub latest_price: Option<f64>,
    pub status: AssetStatus,
}

impl AssetReport {
    /// Report for an asset whose price series could not be retrieved.
    pub fn fetch_failed(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            rsi_14: RsiReading::undefined(RSI_LONG_PERIOD),
            rsi_6: RsiReading::undefined(RSI_SHORT_PERIOD),
            latest_price: None,
            status: AssetStatus::FetchFailed(reason.into()),
        }
    }

    /// Both readings, long window first.
    pub fn readings(&self) -> [&RsiReading; 2] {
        [&self.rsi_14, &self.rsi_6]
    }

    /// Number of readings on this asset classified as `state`.
    pub fn count(&self, state: SignalState) -> usize {
        self.readings()
            .iter()
            .filter(|r| r.signal == Some(state))
            .count()
    }

    /// `true` when at least one reading is overbought or oversold.
    pub fn has_extreme(&self) -> bool {
        self.count(SignalState::Overbought) + self.count(SignalState::Oversold) > 0
    }
}
