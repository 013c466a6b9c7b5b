//! Swing-point detection
//!
//! A swing high is a bar whose high strictly exceeds every other high in
//! a symmetric lookback window; a swing low mirrors the condition on
//! lows. Ties are not swing points: the unique-extremum rule needs no
//! external tie-break, which keeps the detector deterministic.

use crate::{Bar, SwingKind, SwingPoint};

/// Swing highs and lows of one window, each chronologically sorted.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwingPoints {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

impl SwingPoints {
    pub fn is_empty(&self) -> bool {
        self.highs.is_empty() && self.lows.is_empty()
    }

    /// Both sequences merged chronologically (tie-broken by bar index),
    /// the view the structural-break walker consumes.
    pub fn merged(&self) -> Vec<SwingPoint> {
        let mut all: Vec<SwingPoint> =
            self.highs.iter().chain(self.lows.iter()).copied().collect();
        all.sort_by_key(|swing| (swing.timestamp, swing.index));
        all
    }
}

/// True when bar `i`'s high strictly dominates the window around it.
#[inline]
fn is_unique_high(bars: &[Bar], i: usize, lookback: usize) -> bool {
    let high = bars[i].high;
    (i - lookback..=i + lookback).all(|j| j == i || bars[j].high < high)
}

/// True when bar `i`'s low strictly undercuts the window around it.
#[inline]
fn is_unique_low(bars: &[Bar], i: usize, lookback: usize) -> bool {
    let low = bars[i].low;
    (i - lookback..=i + lookback).all(|j| j == i || bars[j].low > low)
}

/// Scan all interior bars for swing points. Fewer than `2 * lookback + 1`
/// bars yield empty output. A bar dominating the window on both sides at
/// once (a wide outside bar) is ambiguous and classified as neither, so
/// no index ever appears in both sequences.
pub fn detect_swing_points(bars: &[Bar], lookback: usize) -> SwingPoints {
    let mut swings = SwingPoints::default();
    if lookback == 0 || bars.len() < 2 * lookback + 1 {
        return swings;
    }

    for i in lookback..bars.len() - lookback {
        let swing_high = is_unique_high(bars, i, lookback);
        let swing_low = is_unique_low(bars, i, lookback);
        if swing_high && swing_low {
            continue;
        }

        if swing_high {
            swings.highs.push(SwingPoint {
                timestamp: bars[i].timestamp,
                index: i,
                price: bars[i].high,
                kind: SwingKind::High,
            });
        } else if swing_low {
            swings.lows.push(SwingPoint {
                timestamp: bars[i].timestamp,
                index: i,
                price: bars[i].low,
                kind: SwingKind::Low,
            });
        }
    }

    swings
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, high: f64, low: f64) -> Bar {
        let mid = (high + low) / 2.0;
        Bar::new(ts, mid, high, low, mid, 100.0)
    }

    /// Bars whose highs/lows follow the given offsets around 100.
    fn bars_from_offsets(offsets: &[f64]) -> Vec<Bar> {
        offsets
            .iter()
            .enumerate()
            .map(|(i, off)| bar(i as i64 * 60_000, 100.0 + off + 1.0, 100.0 + off - 1.0))
            .collect()
    }

    #[test]
    fn detects_single_peak_and_valley() {
        // Peak at index 3, valley at index 9
        let bars = bars_from_offsets(&[0.0, 1.0, 2.0, 5.0, 2.0, 1.0, 0.0, -1.0, -2.0, -5.0, -2.0, -1.0, 0.0]);
        let swings = detect_swing_points(&bars, 3);

        assert_eq!(swings.highs.len(), 1);
        assert_eq!(swings.highs[0].index, 3);
        assert_eq!(swings.highs[0].price, 106.0);
        assert_eq!(swings.lows.len(), 1);
        assert_eq!(swings.lows[0].index, 9);
        assert_eq!(swings.lows[0].price, 94.0);
    }

    #[test]
    fn tied_highs_are_not_swing_points() {
        // Two equal tops inside one window: neither is a unique maximum
        let bars = bars_from_offsets(&[0.0, 5.0, 1.0, 5.0, 0.0, -1.0, 0.0]);
        let swings = detect_swing_points(&bars, 2);
        assert!(swings.highs.is_empty());
    }

    #[test]
    fn insufficient_history_yields_empty() {
        let bars = bars_from_offsets(&[0.0, 1.0, 0.0]);
        assert!(detect_swing_points(&bars, 5).is_empty());
    }

    #[test]
    fn no_index_is_both_high_and_low() {
        // A huge outside bar dominating both sides is classified as neither
        let mut bars = bars_from_offsets(&[0.0, 0.5, 0.0, 0.5, 0.0]);
        bars[2] = bar(2 * 60_000, 120.0, 80.0);
        let swings = detect_swing_points(&bars, 2);

        assert!(swings.highs.iter().all(|s| s.index != 2));
        assert!(swings.lows.iter().all(|s| s.index != 2));
    }

    #[test]
    fn merged_view_is_chronological() {
        let bars = bars_from_offsets(&[0.0, 3.0, 0.0, -3.0, 0.0, 3.0, 0.0, -3.0, 0.0]);
        let swings = detect_swing_points(&bars, 1);
        let merged = swings.merged();

        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(merged.len(), swings.highs.len() + swings.lows.len());
    }

    #[test]
    fn flat_window_has_no_swings() {
        let bars: Vec<Bar> = (0..20).map(|i| bar(i * 60_000, 100.0, 100.0)).collect();
        assert!(detect_swing_points(&bars, 5).is_empty());
    }
}
