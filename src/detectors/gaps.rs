//! Fair-value gap detection
//!
//! A three-bar imbalance: the outer bars never traded a band of prices
//! and the middle bar committed to a direction through it. A gap may
//! carry a refined entry - an order zone that later formed inside the
//! gap, or failing that the gap's 61.8% retracement.

use crate::config::AnalysisConfig;
use crate::{Bar, Direction, OrderZone, PatternContext, PriceGap, RefinedEntry, Result, VolumeDeltaSample};

use super::helpers::{clamp01, delta_agrees, pct_of};

/// Retracement depth for the fallback refined entry.
const RETRACEMENT_RATIO: f64 = 0.618;

// ============================================================
// DETECTION
// ============================================================

/// Gap-size share, delta agreement at the middle bar and the middle
/// bar's commitment (body-to-range) blended into one confidence.
fn gap_confidence(gap_pct: f64, mid: &Bar, delta_ratio: f64, direction: Direction) -> f64 {
    let size_score = (gap_pct * 100.0).min(0.4);
    let volume_score = if delta_agrees(delta_ratio, direction) { 0.3 } else { 0.1 };
    let body_score = mid.body_ratio() * 0.3;
    clamp01(size_score + volume_score + body_score)
}

pub fn detect_price_gaps(
    bars: &[Bar],
    deltas: &[VolumeDeltaSample],
    config: &AnalysisConfig,
) -> Result<Vec<PriceGap>> {
    let mut gaps = Vec::new();
    if bars.len() < 3 {
        return Ok(gaps);
    }

    for i in 1..bars.len() - 1 {
        let prev = &bars[i - 1];
        let mid = &bars[i];
        let next = &bars[i + 1];

        let candidate = if prev.high < next.low && mid.is_bullish() {
            Some((Direction::Bullish, next.low, prev.high))
        } else if prev.low > next.high && mid.is_bearish() {
            Some((Direction::Bearish, prev.low, next.high))
        } else {
            None
        };
        let Some((direction, gap_high, gap_low)) = candidate else {
            continue;
        };

        let gap_size_pct = pct_of(gap_high - gap_low, mid.close);
        if gap_size_pct < config.gap_min_pct {
            continue;
        }

        let delta_ratio = deltas[i].delta_ratio;
        let confidence = gap_confidence(gap_size_pct, mid, delta_ratio, direction);
        if confidence < config.confidence_threshold {
            continue;
        }

        gaps.push(PriceGap {
            timestamp: mid.timestamp,
            direction,
            gap_high,
            gap_low,
            gap_size_pct,
            confidence,
            refined_entry: None,
            context: PatternContext::default(),
        });
    }

    Ok(gaps)
}

// ============================================================
// REFINED ENTRIES
// ============================================================

/// The gap's 61.8% retracement, measured into the direction price would
/// retrace from: down from the top of a bullish gap, up from the bottom
/// of a bearish one.
fn retracement_level(gap: &PriceGap) -> f64 {
    let span = gap.gap_high - gap.gap_low;
    match gap.direction {
        Direction::Bullish => gap.gap_low + span * RETRACEMENT_RATIO,
        Direction::Bearish => gap.gap_high - span * RETRACEMENT_RATIO,
    }
}

/// Attach a refined entry to every gap: the best order zone fully inside
/// the gap that formed no earlier than the gap itself, else the
/// retracement fallback. The internal-zone case carries the larger
/// confidence boost.
pub fn refine_entries(gaps: Vec<PriceGap>, zones: &[OrderZone]) -> Vec<PriceGap> {
    gaps.into_iter()
        .map(|mut gap| {
            let internal = zones
                .iter()
                .filter(|zone| {
                    zone.timestamp >= gap.timestamp
                        && zone.price_low >= gap.gap_low
                        && zone.price_high <= gap.gap_high
                })
                .max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.timestamp.cmp(&b.timestamp))
                });

            let boost = match internal {
                Some(zone) => {
                    gap.refined_entry = Some(RefinedEntry::InternalZone {
                        high: zone.price_high,
                        low: zone.price_low,
                        zone_timestamp: zone.timestamp,
                    });
                    0.2
                }
                None => {
                    gap.refined_entry =
                        Some(RefinedEntry::Retracement { level: retracement_level(&gap) });
                    0.15
                }
            };
            gap.confidence = (gap.confidence + boost).min(1.0);
            gap
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::volume;
    use crate::ZoneSide;

    fn bar(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(ts, open, high, low, close, 1_000.0)
    }

    /// The canonical clean bullish gap: [h:100,l:95] [101->103] [h:120,l:106].
    fn clean_gap_bars() -> Vec<Bar> {
        vec![
            bar(0, 96.0, 100.0, 95.0, 99.0),
            bar(60_000, 101.0, 104.0, 101.0, 103.0),
            bar(120_000, 107.0, 120.0, 106.0, 115.0),
        ]
    }

    #[test]
    fn clean_bullish_gap_detected() {
        let bars = clean_gap_bars();
        let deltas = volume::volume_deltas(&bars);
        let gaps = detect_price_gaps(&bars, &deltas, &AnalysisConfig::default()).unwrap();

        assert_eq!(gaps.len(), 1);
        let gap = &gaps[0];
        assert_eq!(gap.direction, Direction::Bullish);
        assert_eq!(gap.gap_low, 100.0);
        assert_eq!(gap.gap_high, 106.0);
        assert!(gap.gap_high > gap.gap_low);
    }

    #[test]
    fn bearish_mid_bar_invalidates_bullish_gap() {
        let mut bars = clean_gap_bars();
        bars[1] = bar(60_000, 103.0, 104.0, 101.0, 101.5); // bearish middle
        let deltas = volume::volume_deltas(&bars);
        assert!(detect_price_gaps(&bars, &deltas, &AnalysisConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn tiny_gap_below_min_pct_dropped() {
        let bars = vec![
            bar(0, 99.0, 100.0, 98.0, 99.5),
            bar(60_000, 100.0, 100.2, 100.0, 100.1),
            bar(120_000, 100.3, 101.0, 100.02, 100.8),
        ];
        let deltas = volume::volume_deltas(&bars);
        assert!(detect_price_gaps(&bars, &deltas, &AnalysisConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bearish_gap_detected() {
        let bars = vec![
            bar(0, 105.0, 110.0, 104.0, 106.0),
            bar(60_000, 103.0, 103.5, 100.0, 100.5),
            bar(120_000, 98.0, 99.0, 95.0, 96.0),
        ];
        let deltas = volume::volume_deltas(&bars);
        let gaps = detect_price_gaps(&bars, &deltas, &AnalysisConfig::default()).unwrap();

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, Direction::Bearish);
        assert_eq!(gaps[0].gap_high, 104.0);
        assert_eq!(gaps[0].gap_low, 99.0);
    }

    #[test]
    fn refinement_prefers_internal_zone() {
        let bars = clean_gap_bars();
        let deltas = volume::volume_deltas(&bars);
        let gaps = detect_price_gaps(&bars, &deltas, &AnalysisConfig::default()).unwrap();

        let zone = OrderZone {
            timestamp: 120_000,
            side: ZoneSide::Support,
            price_high: 104.0,
            price_low: 101.0,
            volume_ratio: 1.6,
            confidence: 0.8,
            context: PatternContext::default(),
        };
        let refined = refine_entries(gaps, std::slice::from_ref(&zone));

        match refined[0].refined_entry {
            Some(RefinedEntry::InternalZone { high, low, zone_timestamp }) => {
                assert_eq!(high, 104.0);
                assert_eq!(low, 101.0);
                assert_eq!(zone_timestamp, 120_000);
            }
            ref other => panic!("expected internal zone entry, got {other:?}"),
        }
    }

    #[test]
    fn refinement_falls_back_to_retracement() {
        let bars = clean_gap_bars();
        let deltas = volume::volume_deltas(&bars);
        let gaps = detect_price_gaps(&bars, &deltas, &AnalysisConfig::default()).unwrap();
        let refined = refine_entries(gaps, &[]);

        match refined[0].refined_entry {
            Some(RefinedEntry::Retracement { level }) => {
                // 100 + 6 * 0.618
                assert!((level - 103.708).abs() < 1e-9);
            }
            ref other => panic!("expected retracement entry, got {other:?}"),
        }
    }
}
