// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free momentum indicators.  Callers get `Option` / empty
// results for insufficient data and must handle them without aborting a run.

pub mod rsi;

pub use rsi::compute_rsi;
