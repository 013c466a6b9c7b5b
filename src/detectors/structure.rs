//! Structural-break detection: change of character (CHoCH) and break of
//! structure (BOS)
//!
//! The detector walks the time-merged swing sequence. A CHoCH needs a
//! full reversal pattern (new extreme plus an undercut of the prior
//! opposite extreme); a BOS needs a decisive breach of the recent
//! same-kind extremes. Candidates below the configured confidence floor
//! are discarded, never emitted speculatively.

use crate::config::AnalysisConfig;
use crate::{
    Direction, PatternContext, Result, StructuralEvent, StructuralKind, SwingKind, SwingPoint,
    VolumeDeltaSample,
};

use super::helpers::{clamp01, delta_agrees, delta_at, pct_of};
use super::swing::SwingPoints;
use crate::Bar;

/// Number of prior same-kind swings a BOS must clear.
const BOS_REFERENCE_SWINGS: usize = 3;

// ============================================================
// RULE PREDICATES
// ============================================================

/// Last swing of `kind` strictly before `index` in the merged sequence.
fn previous_swing_of_kind(merged: &[SwingPoint], index: usize, kind: SwingKind) -> Option<&SwingPoint> {
    merged[..index].iter().rev().find(|swing| swing.kind == kind)
}

/// Up to `count` most recent same-kind swing prices strictly before `index`.
fn recent_prices_of_kind(
    merged: &[SwingPoint],
    index: usize,
    kind: SwingKind,
    count: usize,
) -> Vec<f64> {
    merged[..index]
        .iter()
        .rev()
        .filter(|swing| swing.kind == kind)
        .take(count)
        .map(|swing| swing.price)
        .collect()
}

/// Bullish CHoCH: high -> low -> high where the new high clears the prior
/// high and the intervening low undercut the swing low before it.
fn is_bullish_choch(merged: &[SwingPoint], i: usize) -> bool {
    let (pp, p, c) = (&merged[i - 2], &merged[i - 1], &merged[i]);
    if pp.kind != SwingKind::High || p.kind != SwingKind::Low || c.kind != SwingKind::High {
        return false;
    }
    if c.price <= pp.price {
        return false;
    }
    match previous_swing_of_kind(merged, i - 1, SwingKind::Low) {
        Some(prior_low) => p.price < prior_low.price,
        None => false,
    }
}

/// Mirror of [`is_bullish_choch`].
fn is_bearish_choch(merged: &[SwingPoint], i: usize) -> bool {
    let (pp, p, c) = (&merged[i - 2], &merged[i - 1], &merged[i]);
    if pp.kind != SwingKind::Low || p.kind != SwingKind::High || c.kind != SwingKind::Low {
        return false;
    }
    if c.price >= pp.price {
        return false;
    }
    match previous_swing_of_kind(merged, i - 1, SwingKind::High) {
        Some(prior_high) => p.price > prior_high.price,
        None => false,
    }
}

/// BOS: the new swing clears the extreme of the last
/// [`BOS_REFERENCE_SWINGS`] same-kind swings by the break threshold.
fn bos_direction(merged: &[SwingPoint], i: usize, threshold_pct: f64) -> Option<Direction> {
    let current = &merged[i];
    let references = recent_prices_of_kind(merged, i, current.kind, BOS_REFERENCE_SWINGS);
    if references.len() < BOS_REFERENCE_SWINGS {
        return None;
    }

    match current.kind {
        SwingKind::High => {
            let reference = references.iter().cloned().fold(f64::MIN, f64::max);
            (current.price > reference * (1.0 + threshold_pct)).then_some(Direction::Bullish)
        }
        SwingKind::Low => {
            let reference = references.iter().cloned().fold(f64::MAX, f64::min);
            (current.price < reference * (1.0 - threshold_pct)).then_some(Direction::Bearish)
        }
    }
}

/// Base 0.6, +0.2 for volume agreement, up to +0.1 for the size of the
/// move relative to the previous swing.
fn event_confidence(move_pct: f64, volume_confirmed: bool) -> f64 {
    let volume_bonus = if volume_confirmed { 0.2 } else { 0.0 };
    let movement_bonus = (move_pct.abs() * 10.0).min(0.1);
    clamp01(0.6 + volume_bonus + movement_bonus)
}

// ============================================================
// DETECTOR
// ============================================================

pub fn detect_structural_events(
    _bars: &[Bar],
    swings: &SwingPoints,
    deltas: &[VolumeDeltaSample],
    config: &AnalysisConfig,
) -> Result<Vec<StructuralEvent>> {
    let merged = swings.merged();
    let mut events = Vec::new();
    if merged.len() < 3 {
        return Ok(events);
    }

    for i in 2..merged.len() {
        let current = &merged[i];
        let previous = &merged[i - 1];

        let classified = if is_bullish_choch(&merged, i) {
            Some((StructuralKind::ChangeOfCharacter, Direction::Bullish))
        } else if is_bearish_choch(&merged, i) {
            Some((StructuralKind::ChangeOfCharacter, Direction::Bearish))
        } else {
            bos_direction(&merged, i, config.break_threshold_pct)
                .map(|direction| (StructuralKind::BreakOfStructure, direction))
        };

        let Some((kind, direction)) = classified else {
            continue;
        };

        let volume_confirmed = delta_at(deltas, current.timestamp)
            .map(|sample| delta_agrees(sample.delta_ratio, direction))
            .unwrap_or(false);
        let move_pct = pct_of(current.price - previous.price, previous.price);
        let confidence = event_confidence(move_pct, volume_confirmed);
        if confidence < config.confidence_threshold {
            continue;
        }

        events.push(StructuralEvent {
            timestamp: current.timestamp,
            kind,
            direction,
            price: current.price,
            confidence,
            volume_confirmed,
            context: PatternContext::default(),
        });
    }

    Ok(events)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn swing(ts: i64, price: f64, kind: SwingKind) -> SwingPoint {
        SwingPoint { timestamp: ts, index: ts as usize, price, kind }
    }

    fn deltas_confirming(ts: i64, ratio: f64) -> Vec<VolumeDeltaSample> {
        vec![VolumeDeltaSample {
            timestamp: ts,
            buy_volume: 0.0,
            sell_volume: 0.0,
            delta: ratio,
            delta_ratio: ratio,
        }]
    }

    fn swings_from(points: Vec<SwingPoint>) -> SwingPoints {
        let mut swings = SwingPoints::default();
        for point in points {
            match point.kind {
                SwingKind::High => swings.highs.push(point),
                SwingKind::Low => swings.lows.push(point),
            }
        }
        swings
    }

    #[test]
    fn bullish_choch_detected() {
        // low(90) high(100) low(88, undercuts 90) high(104, clears 100)
        let swings = swings_from(vec![
            swing(1, 90.0, SwingKind::Low),
            swing(2, 100.0, SwingKind::High),
            swing(3, 88.0, SwingKind::Low),
            swing(4, 104.0, SwingKind::High),
        ]);
        let deltas = deltas_confirming(4, 0.5);
        let events =
            detect_structural_events(&[], &swings, &deltas, &AnalysisConfig::default()).unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind, StructuralKind::ChangeOfCharacter);
        assert_eq!(event.direction, Direction::Bullish);
        assert!(event.volume_confirmed);
        assert!(event.confidence >= 0.8);
    }

    #[test]
    fn no_choch_without_undercut() {
        // Intervening low (92) stays above the prior low (90): trend continuation
        let swings = swings_from(vec![
            swing(1, 90.0, SwingKind::Low),
            swing(2, 100.0, SwingKind::High),
            swing(3, 92.0, SwingKind::Low),
            swing(4, 104.0, SwingKind::High),
        ]);
        let deltas = deltas_confirming(4, 0.5);
        let events =
            detect_structural_events(&[], &swings, &deltas, &AnalysisConfig::default()).unwrap();
        assert!(events.iter().all(|e| e.kind != StructuralKind::ChangeOfCharacter));
    }

    #[test]
    fn bearish_choch_detected() {
        let swings = swings_from(vec![
            swing(1, 110.0, SwingKind::High),
            swing(2, 100.0, SwingKind::Low),
            swing(3, 113.0, SwingKind::High),
            swing(4, 96.0, SwingKind::Low),
        ]);
        let deltas = deltas_confirming(4, -0.5);
        let events =
            detect_structural_events(&[], &swings, &deltas, &AnalysisConfig::default()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Bearish);
    }

    #[test]
    fn bos_clears_three_prior_highs() {
        // Three highs near 100, then a high 2% above them
        let swings = swings_from(vec![
            swing(1, 100.0, SwingKind::High),
            swing(2, 95.0, SwingKind::Low),
            swing(3, 99.5, SwingKind::High),
            swing(4, 95.5, SwingKind::Low),
            swing(5, 99.8, SwingKind::High),
            swing(6, 96.0, SwingKind::Low),
            swing(7, 102.5, SwingKind::High),
        ]);
        let deltas = deltas_confirming(7, 0.5);
        let events =
            detect_structural_events(&[], &swings, &deltas, &AnalysisConfig::default()).unwrap();

        let bos: Vec<_> =
            events.iter().filter(|e| e.kind == StructuralKind::BreakOfStructure).collect();
        assert_eq!(bos.len(), 1);
        assert_eq!(bos[0].direction, Direction::Bullish);
        assert_eq!(bos[0].timestamp, 7);
    }

    #[test]
    fn sub_threshold_break_is_not_bos() {
        // Breach of only 0.5% against the 1% default threshold
        let swings = swings_from(vec![
            swing(1, 100.0, SwingKind::High),
            swing(2, 95.0, SwingKind::Low),
            swing(3, 99.5, SwingKind::High),
            swing(4, 95.5, SwingKind::Low),
            swing(5, 99.8, SwingKind::High),
            swing(6, 96.0, SwingKind::Low),
            swing(7, 100.5, SwingKind::High),
        ]);
        let deltas = deltas_confirming(7, 0.5);
        let events =
            detect_structural_events(&[], &swings, &deltas, &AnalysisConfig::default()).unwrap();
        assert!(events.iter().all(|e| e.kind != StructuralKind::BreakOfStructure));
    }

    #[test]
    fn unconfirmed_small_move_gated_out() {
        // No volume agreement and a tiny move: 0.6 + 0.025 < 0.65
        let swings = swings_from(vec![
            swing(1, 100.0, SwingKind::Low),
            swing(2, 100.1, SwingKind::High),
            swing(3, 99.9, SwingKind::Low),
            swing(4, 100.15, SwingKind::High),
        ]);
        let deltas = deltas_confirming(4, 0.0);
        let events =
            detect_structural_events(&[], &swings, &deltas, &AnalysisConfig::default()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn confidence_formula_bounds() {
        assert!((event_confidence(0.0, false) - 0.6).abs() < 1e-12);
        assert!((event_confidence(0.5, true) - 0.9).abs() < 1e-12);
        assert!(event_confidence(10.0, true) <= 1.0);
    }
}
