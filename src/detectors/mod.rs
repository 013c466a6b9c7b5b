//! Pattern detectors
//!
//! Each submodule is one pipeline stage: a pure function from immutable
//! inputs (bars, swing points, volume deltas, configuration) to a fresh
//! collection of typed pattern records. No detector mutates another's
//! output, and a detector that lacks the history its lookback needs
//! returns an empty collection rather than an error.
//!
//! # Stages
//!
//! - [`swing`] - local extrema over a symmetric lookback window
//! - [`volume`] - buy/sell split, CVD, absorption, divergence, imbalance
//! - [`structure`] - change of character and break of structure
//! - [`zones`] - order zones, breaker zones, mitigation events
//! - [`gaps`] - fair-value gaps and refined entries
//! - [`liquidity`] - sweeps, equal levels, trendline liquidity
//! - [`confluence`] - nested zones and gap-in-zone overlap

pub mod confluence;
pub mod gaps;
pub mod helpers;
pub mod liquidity;
pub mod structure;
pub mod swing;
pub mod volume;
pub mod zones;
