//! Analysis configuration knobs
//!
//! Every tunable threshold of the engine lives here with its default,
//! valid range and a short description. The metadata table drives both
//! validation and parameter sweeps.
//!
//! # Example
//!
//! ```rust
//! use smc_engine::config::AnalysisConfig;
//!
//! let config = AnalysisConfig {
//!     break_threshold_pct: 0.015,
//!     ..AnalysisConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::{EngineError, Result};

// ============================================================
// KNOB METADATA
// ============================================================

/// Type of a configuration knob value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnobType {
    /// Fractional value (percentages are expressed as fractions, 0.01 = 1%)
    Fraction,
    /// Positive integer (bar counts)
    Bars,
    /// Unconstrained positive ratio (e.g. risk-reward)
    Multiplier,
}

/// Metadata for a single configuration knob
#[derive(Debug, Clone)]
pub struct KnobMeta {
    /// Knob name, matching the field on [`AnalysisConfig`]
    pub name: &'static str,
    pub knob_type: KnobType,
    /// Default value
    pub default: f64,
    /// Valid range (min, max), inclusive
    pub range: (f64, f64),
    /// Human-readable description
    pub description: &'static str,
}

impl KnobMeta {
    const fn new(
        name: &'static str,
        knob_type: KnobType,
        default: f64,
        range: (f64, f64),
        description: &'static str,
    ) -> Self {
        Self { name, knob_type, default, range, description }
    }

    /// Validate a value against this knob's range.
    pub fn validate(&self, value: f64) -> Result<()> {
        let (min, max) = self.range;
        if !value.is_finite() || value < min || value > max {
            return Err(EngineError::ConfigOutOfRange {
                field: self.name,
                value,
                min,
                max,
            });
        }
        if self.knob_type == KnobType::Bars && value.fract() != 0.0 {
            return Err(EngineError::InvalidConfig("bar-count knob must be an integer"));
        }
        Ok(())
    }
}

/// Metadata for every knob, in field order.
pub const KNOBS: &[KnobMeta] = &[
    KnobMeta::new(
        "swing_lookback",
        KnobType::Bars,
        5.0,
        (1.0, 50.0),
        "Symmetric window (bars) a swing extremum must dominate",
    ),
    KnobMeta::new(
        "break_threshold_pct",
        KnobType::Fraction,
        0.01,
        (0.0001, 0.2),
        "Minimum breach of the prior extreme for a break of structure",
    ),
    KnobMeta::new(
        "gap_min_pct",
        KnobType::Fraction,
        0.0005,
        (0.00001, 0.1),
        "Minimum fair-value-gap size relative to price",
    ),
    KnobMeta::new(
        "equal_level_tolerance_pct",
        KnobType::Fraction,
        0.002,
        (0.0001, 0.05),
        "Maximum price difference for two swings to count as equal",
    ),
    KnobMeta::new(
        "volume_confirmation_multiplier",
        KnobType::Multiplier,
        1.5,
        (1.0, 10.0),
        "Window-to-series volume ratio required to confirm an order zone",
    ),
    KnobMeta::new(
        "confidence_threshold",
        KnobType::Fraction,
        0.65,
        (0.0, 1.0),
        "Floor below which pattern candidates are discarded",
    ),
    KnobMeta::new(
        "min_risk_reward",
        KnobType::Multiplier,
        2.0,
        (0.5, 20.0),
        "Minimum reward-to-risk ratio for an actionable signal",
    ),
];

// ============================================================
// CONFIGURATION
// ============================================================

/// Engine configuration. Construct via [`Default`] and struct-update
/// syntax; omitted knobs keep their documented defaults.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisConfig {
    /// Symmetric lookback for swing-point detection (bars).
    pub swing_lookback: usize,
    /// Break-of-structure threshold as a fraction of price.
    pub break_threshold_pct: f64,
    /// Minimum gap size as a fraction of price.
    pub gap_min_pct: f64,
    /// Equal-level tolerance as a fraction of price.
    pub equal_level_tolerance_pct: f64,
    /// Volume multiple confirming institutional activity.
    pub volume_confirmation_multiplier: f64,
    /// Confidence floor applied to every emitted pattern.
    pub confidence_threshold: f64,
    /// Risk-reward gate for synthesized signals.
    pub min_risk_reward: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            swing_lookback: 5,
            break_threshold_pct: 0.01,
            gap_min_pct: 0.0005,
            equal_level_tolerance_pct: 0.002,
            volume_confirmation_multiplier: 1.5,
            confidence_threshold: 0.65,
            min_risk_reward: 2.0,
        }
    }
}

impl AnalysisConfig {
    /// Validate every knob against [`KNOBS`]. Fatal at engine entry:
    /// an out-of-range knob never produces a partial analysis.
    pub fn validate(&self) -> Result<()> {
        for (meta, value) in KNOBS.iter().zip(self.values()) {
            meta.validate(value)?;
        }
        Ok(())
    }

    /// Knob values in [`KNOBS`] order.
    fn values(&self) -> [f64; 7] {
        [
            self.swing_lookback as f64,
            self.break_threshold_pct,
            self.gap_min_pct,
            self.equal_level_tolerance_pct,
            self.volume_confirmation_multiplier,
            self.confidence_threshold,
            self.min_risk_reward,
        ]
    }
}

// ============================================================
// TESTS
// ============================================================
