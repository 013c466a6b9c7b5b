//! Liquidity detectors: sweeps, equal levels, trendline liquidity
//!
//! A sweep is a brief breach of a swing extreme followed by a close back
//! through it - the classic stop-harvest. Equal highs/lows mark resting
//! liquidity at (nearly) repeated prices; trendlines collect the same
//! thing along a slope.

use crate::config::AnalysisConfig;
use crate::{
    Bar, Direction, EqualKind, EqualLevel, LiquiditySweep, PatternContext, Result, SweepCategory,
    SwingKind, SwingPoint, TrendlineBreak, TrendlineLevel, ZoneSide,
};

use super::helpers::{
    clamp01, pct_of, DAY_MS, HOUR_MS, MAX_SWING_CANDIDATES, SWEEP_BREACH_PCT,
    SWEEP_REVERSAL_BARS, SWEEP_SIMILAR_LEVEL_PCT, TRENDLINE_BREAK_PCT, TRENDLINE_DEVIATION_PCT,
};
use super::swing::SwingPoints;

// ============================================================
// LIQUIDITY SWEEPS
// ============================================================

/// Internal when another same-kind swing sat at a similar level in the
/// prior 24 hours; external sweeps take out a range extreme and carry
/// more weight.
fn sweep_category(origin: &SwingPoint, same_kind: &[SwingPoint]) -> SweepCategory {
    let tolerance = origin.price * SWEEP_SIMILAR_LEVEL_PCT;
    let nearby = same_kind.iter().any(|swing| {
        swing.timestamp < origin.timestamp
            && origin.timestamp - swing.timestamp <= DAY_MS
            && (swing.price - origin.price).abs() <= tolerance
    });
    if nearby {
        SweepCategory::Internal
    } else {
        SweepCategory::External
    }
}

fn sweep_confidence(breach_pct: f64, breach_volume: f64, category: SweepCategory) -> f64 {
    let distance_score = (breach_pct * 100.0).min(0.3);
    let volume_score = if breach_volume > 0.0 { 0.3 } else { 0.1 };
    let category_score = match category {
        SweepCategory::External => 0.3,
        SweepCategory::Internal => 0.2,
    };
    clamp01(0.2 + distance_score + volume_score + category_score)
}

/// Scan one side of the book: breach of `origin`'s level, then a close
/// back through it within [`SWEEP_REVERSAL_BARS`].
fn sweeps_for_kind(
    bars: &[Bar],
    swings: &[SwingPoint],
    kind: SwingKind,
    config: &AnalysisConfig,
) -> Vec<LiquiditySweep> {
    let mut sweeps = Vec::new();

    for (pos, origin) in swings.iter().enumerate() {
        let level = origin.price;
        let window_end = swings.get(pos + 1).map(|next| next.index).unwrap_or(bars.len());
        if origin.index + 1 >= window_end {
            continue;
        }

        // First bar breaching the level.
        let breach = (origin.index + 1..window_end).find(|&i| match kind {
            SwingKind::High => bars[i].high > level * (1.0 + SWEEP_BREACH_PCT),
            SwingKind::Low => bars[i].low < level * (1.0 - SWEEP_BREACH_PCT),
        });
        let Some(breach_idx) = breach else {
            continue;
        };

        // Reversal: a close back through the level shortly after.
        let reversal_end = (breach_idx + SWEEP_REVERSAL_BARS).min(window_end - 1);
        let reversal = (breach_idx..=reversal_end).find(|&i| match kind {
            SwingKind::High => bars[i].close < level,
            SwingKind::Low => bars[i].close > level,
        });
        let Some(reversal_idx) = reversal else {
            continue;
        };

        // The sweep extreme over the breach-to-reversal stretch.
        let stretch = &bars[breach_idx..=reversal_idx];
        let (sweep_price, direction) = match kind {
            SwingKind::High => {
                (stretch.iter().map(|b| b.high).fold(f64::MIN, f64::max), Direction::Bearish)
            }
            SwingKind::Low => {
                (stretch.iter().map(|b| b.low).fold(f64::MAX, f64::min), Direction::Bullish)
            }
        };

        let breach_pct = pct_of((sweep_price - level).abs(), level);
        let category = sweep_category(origin, swings);
        let confidence = sweep_confidence(breach_pct, bars[breach_idx].volume, category);
        if confidence < config.confidence_threshold {
            continue;
        }

        sweeps.push(LiquiditySweep {
            timestamp: bars[breach_idx].timestamp,
            direction,
            sweep_price,
            origin_level: level,
            category,
            confidence,
            context: PatternContext::default(),
        });
    }

    sweeps
}

pub fn detect_liquidity_sweeps(
    bars: &[Bar],
    swings: &SwingPoints,
    config: &AnalysisConfig,
) -> Result<Vec<LiquiditySweep>> {
    let mut sweeps = sweeps_for_kind(bars, &swings.highs, SwingKind::High, config);
    sweeps.extend(sweeps_for_kind(bars, &swings.lows, SwingKind::Low, config));
    sweeps.sort_by_key(|sweep| sweep.timestamp);
    Ok(sweeps)
}

// ============================================================
// EQUAL LEVELS
// ============================================================

/// Precision within tolerance plus time proximity.
fn equal_level_confidence(price_diff: f64, tolerance: f64, hours_apart: f64) -> f64 {
    let precision_score = (1.0 - price_diff / tolerance) * 0.4;
    let time_score = (0.4 - hours_apart / 24.0 * 0.1).max(0.2);
    clamp01(0.3 + precision_score + time_score)
}

fn equal_levels_for_kind(
    swings: &[SwingPoint],
    kind: EqualKind,
    config: &AnalysisConfig,
) -> Vec<EqualLevel> {
    let mut levels = Vec::new();
    // Pairwise comparison is quadratic; bound the candidate set to the
    // most recent swings to keep worst-case cost predictable.
    let start = swings.len().saturating_sub(MAX_SWING_CANDIDATES);
    let candidates = &swings[start..];

    for i in 0..candidates.len() {
        for j in i + 1..candidates.len() {
            let first = &candidates[i];
            let second = &candidates[j];
            let tolerance = first.price * config.equal_level_tolerance_pct;
            let price_diff = (first.price - second.price).abs();
            if price_diff > tolerance || tolerance <= 0.0 {
                continue;
            }

            let hours_apart = (second.timestamp - first.timestamp).abs() as f64 / HOUR_MS as f64;
            let confidence = equal_level_confidence(price_diff, tolerance, hours_apart);
            if confidence < config.confidence_threshold {
                continue;
            }

            levels.push(EqualLevel {
                timestamp: first.timestamp.max(second.timestamp),
                kind,
                price_level: (first.price + second.price) / 2.0,
                source_points: [first.price, second.price],
                confidence,
                context: PatternContext::default(),
            });
        }
    }

    levels
}

pub fn detect_equal_levels(
    swings: &SwingPoints,
    config: &AnalysisConfig,
) -> Result<Vec<EqualLevel>> {
    let mut levels = equal_levels_for_kind(&swings.highs, EqualKind::EqualHighs, config);
    levels.extend(equal_levels_for_kind(&swings.lows, EqualKind::EqualLows, config));
    levels.sort_by(|a, b| {
        a.timestamp.cmp(&b.timestamp).then_with(|| a.price_level.total_cmp(&b.price_level))
    });
    Ok(levels)
}

// ============================================================
// TRENDLINE LIQUIDITY
// ============================================================

fn projected(anchor: &SwingPoint, slope: f64, timestamp: i64) -> f64 {
    anchor.price + slope * (timestamp - anchor.timestamp) as f64
}

/// First bar poking through the projected line after `after`.
fn find_trendline_break(
    bars: &[Bar],
    anchor: &SwingPoint,
    slope: f64,
    after: i64,
    kind: ZoneSide,
) -> Option<TrendlineBreak> {
    for bar in bars.iter().filter(|bar| bar.timestamp > after) {
        let line = projected(anchor, slope, bar.timestamp);
        let breached = match kind {
            ZoneSide::Resistance => bar.high > line * (1.0 + TRENDLINE_BREAK_PCT),
            ZoneSide::Support => bar.low < line * (1.0 - TRENDLINE_BREAK_PCT),
        };
        if breached {
            let break_price = match kind {
                ZoneSide::Resistance => bar.high,
                ZoneSide::Support => bar.low,
            };
            return Some(TrendlineBreak {
                timestamp: bar.timestamp,
                break_price,
                projected_price: line,
                break_strength: pct_of((break_price - line).abs(), line),
            });
        }
    }
    None
}

fn trendlines_for_kind(
    bars: &[Bar],
    swings: &[SwingPoint],
    kind: ZoneSide,
    config: &AnalysisConfig,
) -> Vec<TrendlineLevel> {
    let mut lines = Vec::new();
    if swings.len() < 3 {
        return lines;
    }
    let start = swings.len().saturating_sub(MAX_SWING_CANDIDATES);
    let candidates = &swings[start..];

    for i in 0..candidates.len() - 2 {
        let (p1, p2, p3) = (&candidates[i], &candidates[i + 1], &candidates[i + 2]);
        let dt = p2.timestamp - p1.timestamp;
        if dt <= 0 {
            continue;
        }
        let slope = (p2.price - p1.price) / dt as f64;

        let deviation = pct_of((p3.price - projected(p1, slope, p3.timestamp)).abs(), p3.price);
        if deviation >= TRENDLINE_DEVIATION_PCT {
            continue;
        }

        let extra_touches = candidates[i + 3..]
            .iter()
            .filter(|point| {
                let line = projected(p1, slope, point.timestamp);
                pct_of((point.price - line).abs(), point.price) < TRENDLINE_DEVIATION_PCT
            })
            .count();
        let touch_count = 3 + extra_touches;

        let broken = find_trendline_break(bars, p1, slope, p3.timestamp, kind);
        let confidence = clamp01(
            0.5 + touch_count as f64 * 0.1 + if broken.is_some() { 0.3 } else { 0.0 },
        );
        if confidence < config.confidence_threshold {
            continue;
        }

        lines.push(TrendlineLevel {
            timestamp: p1.timestamp,
            kind,
            direction: kind.bias(),
            slope,
            touch_count,
            liquidity_strength: (0.4 + touch_count as f64 * 0.15).min(1.0),
            broken,
            confidence,
        });
    }

    lines
}

pub fn detect_trendline_levels(
    bars: &[Bar],
    swings: &SwingPoints,
    config: &AnalysisConfig,
) -> Result<Vec<TrendlineLevel>> {
    let mut lines = trendlines_for_kind(bars, &swings.highs, ZoneSide::Resistance, config);
    lines.extend(trendlines_for_kind(bars, &swings.lows, ZoneSide::Support, config));
    lines.sort_by_key(|line| line.timestamp);
    Ok(lines)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(ts, open, high, low, close, 500.0)
    }

    fn swing(ts: i64, index: usize, price: f64, kind: SwingKind) -> SwingPoint {
        SwingPoint { timestamp: ts, index, price, kind }
    }

    #[test]
    fn breach_and_reversal_is_bearish_sweep() {
        // Swing high at 100; bar 3 pokes 0.2% above, bar 4 closes back below.
        let bars = vec![
            bar(0, 98.0, 100.0, 97.0, 99.0),
            bar(1_000, 99.0, 99.5, 98.0, 99.2),
            bar(2_000, 99.2, 99.8, 98.5, 99.5),
            bar(3_000, 99.5, 100.2, 99.0, 100.1),
            bar(4_000, 100.1, 100.3, 98.8, 99.0),
            bar(5_000, 99.0, 99.4, 98.0, 98.5),
        ];
        let swings = SwingPoints {
            highs: vec![swing(0, 0, 100.0, SwingKind::High)],
            lows: vec![],
        };
        let sweeps =
            detect_liquidity_sweeps(&bars, &swings, &AnalysisConfig::default()).unwrap();

        assert_eq!(sweeps.len(), 1);
        let sweep = &sweeps[0];
        assert_eq!(sweep.direction, Direction::Bearish);
        assert_eq!(sweep.origin_level, 100.0);
        assert_eq!(sweep.sweep_price, 100.3);
        assert_eq!(sweep.category, SweepCategory::External);
    }

    #[test]
    fn breach_without_reversal_is_no_sweep() {
        // Price breaks the high and keeps going.
        let bars = vec![
            bar(0, 98.0, 100.0, 97.0, 99.0),
            bar(1_000, 99.5, 100.5, 99.2, 100.4),
            bar(2_000, 100.4, 101.5, 100.2, 101.2),
            bar(3_000, 101.2, 102.0, 100.8, 101.8),
        ];
        let swings = SwingPoints {
            highs: vec![swing(0, 0, 100.0, SwingKind::High)],
            lows: vec![],
        };
        assert!(detect_liquidity_sweeps(&bars, &swings, &AnalysisConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn nearby_prior_level_categorizes_internal() {
        let bars = vec![
            bar(0, 98.0, 100.0, 97.0, 99.0),
            bar(1_000, 99.5, 100.2, 99.0, 100.0),
            bar(2_000, 100.0, 100.1, 98.5, 99.0),
        ];
        // A swing at a similar level two hours earlier makes it internal.
        let swings = SwingPoints {
            highs: vec![
                swing(-2 * HOUR_MS, 0, 100.2, SwingKind::High),
                swing(0, 0, 100.0, SwingKind::High),
            ],
            lows: vec![],
        };
        let sweeps =
            detect_liquidity_sweeps(&bars, &swings, &AnalysisConfig::default()).unwrap();
        assert!(!sweeps.is_empty());
        assert_eq!(sweeps[0].category, SweepCategory::Internal);
    }

    #[test]
    fn bullish_sweep_of_swing_low() {
        let bars = vec![
            bar(0, 51_000.0, 51_500.0, 50_000.0, 51_200.0),
            bar(1_000, 51_200.0, 51_300.0, 49_900.0, 50_100.0), // pokes below
            bar(2_000, 50_100.0, 50_600.0, 50_050.0, 50_500.0), // closes back above
        ];
        let swings = SwingPoints {
            highs: vec![],
            lows: vec![swing(0, 0, 50_000.0, SwingKind::Low)],
        };
        let sweeps =
            detect_liquidity_sweeps(&bars, &swings, &AnalysisConfig::default()).unwrap();

        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].direction, Direction::Bullish);
        assert_eq!(sweeps[0].sweep_price, 49_900.0);
    }

    #[test]
    fn equal_highs_within_tolerance() {
        let swings = SwingPoints {
            highs: vec![
                swing(0, 5, 50_000.0, SwingKind::High),
                swing(4 * HOUR_MS, 20, 50_080.0, SwingKind::High),
            ],
            lows: vec![],
        };
        let levels = detect_equal_levels(&swings, &AnalysisConfig::default()).unwrap();

        assert_eq!(levels.len(), 1);
        let level = &levels[0];
        assert_eq!(level.kind, EqualKind::EqualHighs);
        assert_eq!(level.price_level, 50_040.0);
        assert_eq!(level.source_points, [50_000.0, 50_080.0]);
    }

    #[test]
    fn distant_prices_are_not_equal() {
        // 0.3% apart against the 0.2% tolerance
        let swings = SwingPoints {
            highs: vec![
                swing(0, 5, 50_000.0, SwingKind::High),
                swing(4 * HOUR_MS, 20, 50_150.0, SwingKind::High),
            ],
            lows: vec![],
        };
        assert!(detect_equal_levels(&swings, &AnalysisConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn equal_lows_detected() {
        let swings = SwingPoints {
            highs: vec![],
            lows: vec![
                swing(0, 5, 30_000.0, SwingKind::Low),
                swing(2 * HOUR_MS, 20, 30_030.0, SwingKind::Low),
            ],
        };
        let levels = detect_equal_levels(&swings, &AnalysisConfig::default()).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].kind, EqualKind::EqualLows);
    }

    #[test]
    fn ascending_support_trendline_with_break() {
        // Three collinear lows, then a bar dropping >1% through the line.
        let swings = SwingPoints {
            highs: vec![],
            lows: vec![
                swing(0, 2, 100.0, SwingKind::Low),
                swing(HOUR_MS, 8, 101.0, SwingKind::Low),
                swing(2 * HOUR_MS, 14, 102.0, SwingKind::Low),
            ],
        };
        let bars = vec![bar(3 * HOUR_MS, 102.5, 102.8, 101.0, 101.2)];
        let lines =
            detect_trendline_levels(&bars, &swings, &AnalysisConfig::default()).unwrap();

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.kind, ZoneSide::Support);
        assert_eq!(line.touch_count, 3);
        let broken = line.broken.as_ref().expect("line should be broken");
        // Projected at 3h is 103; the bar's low of 101 is ~1.9% through.
        assert_eq!(broken.break_price, 101.0);
        assert!(broken.break_strength > TRENDLINE_BREAK_PCT);
    }

    #[test]
    fn scattered_swings_form_no_trendline() {
        let swings = SwingPoints {
            highs: vec![],
            lows: vec![
                swing(0, 2, 100.0, SwingKind::Low),
                swing(HOUR_MS, 8, 110.0, SwingKind::Low),
                swing(2 * HOUR_MS, 14, 90.0, SwingKind::Low),
            ],
        };
        assert!(detect_trendline_levels(&[], &swings, &AnalysisConfig::default())
            .unwrap()
            .is_empty());
    }
}
