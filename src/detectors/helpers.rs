//! Shared thresholds and predicates for the pattern detectors.
//!
//! Every numeric rule that more than one detector relies on lives here as
//! a named constant or a small pure function, so each classification rule
//! stays independently testable.

use crate::{Bar, Direction, VolumeDeltaSample};

// ============================================================
// FIXED THRESHOLDS
// ============================================================

/// Bars on each side of a swing point forming an order-zone window
pub const ZONE_WINDOW: usize = 3;
/// Minimum order-zone height as a fraction of the swing price
pub const ZONE_MIN_HEIGHT_PCT: f64 = 0.002;
/// Breach of a swing extreme that counts as a liquidity sweep
pub const SWEEP_BREACH_PCT: f64 = 0.001;
/// Bars after the breach within which price must close back through the level
pub const SWEEP_REVERSAL_BARS: usize = 5;
/// Two swing levels within this fraction of price are "similar" for
/// internal/external sweep categorization
pub const SWEEP_SIMILAR_LEVEL_PCT: f64 = 0.005;
/// Close-to-close lookback for price/CVD divergence
pub const DIVERGENCE_LOOKBACK: usize = 10;
/// Minimum window length before divergence detection engages
pub const DIVERGENCE_MIN_BARS: usize = 20;
/// Volume multiple over the trailing average that marks absorption
pub const ABSORPTION_VOLUME_FACTOR: f64 = 2.0;
/// Maximum body-to-range ratio for an absorption bar
pub const ABSORPTION_BODY_MAX_RATIO: f64 = 0.3;
/// Trailing bars for the absorption volume average
pub const ABSORPTION_TRAILING_BARS: usize = 20;
/// Buy/sell dominance that counts as a volume imbalance
pub const IMBALANCE_MIN_RATIO: f64 = 2.0;
/// Volume multiple over the trailing 5-bar average marking a spike
pub const IMBALANCE_SPIKE_FACTOR: f64 = 1.5;
/// Delta ratio beyond which volume delta confirms a direction
pub const DELTA_AGREEMENT_MIN: f64 = 0.1;
/// Close beyond a zone edge that flips it into a breaker
pub const BREAKER_BREACH_PCT: f64 = 0.001;
/// Volume multiple over the zone's mean confirming a breaker
pub const BREAKER_VOLUME_FACTOR: f64 = 1.2;
/// Body multiple over the series mean that qualifies as a mitigation bar
pub const MITIGATION_BODY_FACTOR: f64 = 2.0;
/// Maximum projected deviation for a swing to sit on a trendline
pub const TRENDLINE_DEVIATION_PCT: f64 = 0.02;
/// Close beyond the projected line that marks a trendline break
pub const TRENDLINE_BREAK_PCT: f64 = 0.01;
/// Most recent swings considered by the O(n²) pairwise detectors
pub const MAX_SWING_CANDIDATES: usize = 64;

pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 24 * HOUR_MS;
/// Trailing window defining "recent" structural evidence
pub const RECENT_STRUCTURE_MS: i64 = 20 * HOUR_MS;
/// Window within which a zone or gap supports a structural event
pub const SUPPORT_WINDOW_MS: i64 = DAY_MS;

// ============================================================
// PREDICATES & SMALL HELPERS
// ============================================================

#[inline]
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// `value` as a fraction of `base`; 0 when the base is degenerate.
#[inline]
pub fn pct_of(value: f64, base: f64) -> f64 {
    if base.abs() > f64::EPSILON {
        value / base
    } else {
        0.0
    }
}

/// Mean volume over the whole window; 0 for an empty window.
#[inline]
pub fn mean_volume(bars: &[Bar]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64
}

/// Mean absolute body over the whole window; 0 for an empty window.
#[inline]
pub fn mean_body(bars: &[Bar]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    bars.iter().map(|b| b.body()).sum::<f64>() / bars.len() as f64
}

/// Trailing mean volume over `period` bars strictly before `at`. Falls
/// back to the bar's own volume at the window start.
#[inline]
pub fn trailing_avg_volume(bars: &[Bar], at: usize, period: usize) -> f64 {
    if at == 0 {
        return bars[0].volume;
    }
    let start = at.saturating_sub(period);
    let slice = &bars[start..at];
    slice.iter().map(|b| b.volume).sum::<f64>() / slice.len() as f64
}

/// True when the estimated delta ratio confirms `direction`.
#[inline]
pub fn delta_agrees(delta_ratio: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => delta_ratio > DELTA_AGREEMENT_MIN,
        Direction::Bearish => delta_ratio < -DELTA_AGREEMENT_MIN,
    }
}

/// Volume-delta sample at an exact timestamp. Samples are emitted in bar
/// order, so a binary search suffices.
#[inline]
pub fn delta_at(deltas: &[VolumeDeltaSample], timestamp: i64) -> Option<&VolumeDeltaSample> {
    deltas
        .binary_search_by_key(&timestamp, |sample| sample.timestamp)
        .ok()
        .map(|index| &deltas[index])
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(volume: f64) -> Bar {
        Bar::new(0, 100.0, 101.0, 99.0, 100.0, volume)
    }

    #[test]
    fn pct_of_guards_zero_base() {
        assert_eq!(pct_of(5.0, 0.0), 0.0);
        assert!((pct_of(5.0, 100.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn trailing_avg_volume_excludes_current_bar() {
        let bars = vec![bar(10.0), bar(20.0), bar(90.0)];
        assert!((trailing_avg_volume(&bars, 2, 2) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn delta_agreement_is_directional() {
        assert!(delta_agrees(0.2, Direction::Bullish));
        assert!(!delta_agrees(0.2, Direction::Bearish));
        assert!(delta_agrees(-0.2, Direction::Bearish));
        assert!(!delta_agrees(0.05, Direction::Bullish));
    }

    #[test]
    fn delta_at_finds_exact_timestamp() {
        let deltas: Vec<VolumeDeltaSample> = (0..5)
            .map(|i| VolumeDeltaSample {
                timestamp: i * 1_000,
                buy_volume: 1.0,
                sell_volume: 1.0,
                delta: 0.0,
                delta_ratio: 0.0,
            })
            .collect();
        assert!(delta_at(&deltas, 3_000).is_some());
        assert!(delta_at(&deltas, 3_500).is_none());
    }
}
