// =============================================================================
// Signals Module
// =============================================================================
//
// Threshold classification of RSI readings into overbought / oversold /
// neutral states.

pub mod classifier;

pub use classifier::{classify, SignalThresholds};
