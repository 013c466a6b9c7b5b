//! Order-zone detection, plus the two follow-up patterns derived from
//! zones: breakers (a broken zone flipping role) and mitigations (a
//! large bar re-filling a zone).
//!
//! An order zone is a band around a swing point where the market traded
//! unusually heavy volume; resistance around swing highs, support around
//! swing lows.

use crate::config::AnalysisConfig;
use crate::{
    Bar, BreakerZone, Direction, MitigationEvent, OrderZone, PatternContext, Result, ZoneSide,
};

use super::helpers::{
    clamp01, delta_at, mean_body, mean_volume, pct_of, BREAKER_BREACH_PCT, BREAKER_VOLUME_FACTOR,
    DELTA_AGREEMENT_MIN, MITIGATION_BODY_FACTOR, ZONE_MIN_HEIGHT_PCT, ZONE_WINDOW,
};
use super::swing::SwingPoints;
use crate::{SwingPoint, VolumeDeltaSample};

// ============================================================
// ORDER ZONES
// ============================================================

/// Confidence from volume dominance, zone height and delta agreement at
/// formation.
fn zone_confidence(volume_ratio: f64, height_pct: f64, delta_ratio: f64) -> f64 {
    let volume_score = (volume_ratio * 0.2).min(0.4);
    let height_score = (height_pct * 100.0).min(0.3);
    let delta_score = if delta_ratio.abs() > DELTA_AGREEMENT_MIN { 0.2 } else { 0.1 };
    clamp01(0.3 + volume_score + height_score + delta_score)
}

fn zone_around_swing(
    bars: &[Bar],
    swing: &SwingPoint,
    side: ZoneSide,
    series_mean: f64,
    deltas: &[VolumeDeltaSample],
    config: &AnalysisConfig,
) -> Option<OrderZone> {
    let idx = swing.index;
    if idx < ZONE_WINDOW || idx + ZONE_WINDOW >= bars.len() {
        return None;
    }
    let window = &bars[idx - ZONE_WINDOW..=idx + ZONE_WINDOW];

    let window_mean = mean_volume(window);
    if series_mean <= 0.0 || window_mean < series_mean * config.volume_confirmation_multiplier {
        return None;
    }

    let (price_high, price_low) = match side {
        ZoneSide::Resistance => {
            (swing.price, window.iter().map(|b| b.low).fold(f64::MAX, f64::min))
        }
        ZoneSide::Support => {
            (window.iter().map(|b| b.high).fold(f64::MIN, f64::max), swing.price)
        }
    };
    let height_pct = pct_of(price_high - price_low, swing.price);
    if height_pct < ZONE_MIN_HEIGHT_PCT {
        return None;
    }

    let volume_ratio = window_mean / series_mean;
    let delta_ratio =
        delta_at(deltas, swing.timestamp).map(|sample| sample.delta_ratio).unwrap_or(0.0);
    let confidence = zone_confidence(volume_ratio, height_pct, delta_ratio);
    if confidence < config.confidence_threshold {
        return None;
    }

    Some(OrderZone {
        timestamp: swing.timestamp,
        side,
        price_high,
        price_low,
        volume_ratio,
        confidence,
        context: PatternContext::default(),
    })
}

pub fn detect_order_zones(
    bars: &[Bar],
    swings: &SwingPoints,
    deltas: &[VolumeDeltaSample],
    config: &AnalysisConfig,
) -> Result<Vec<OrderZone>> {
    let mut zones = Vec::new();
    if bars.len() < 2 * ZONE_WINDOW + 1 {
        return Ok(zones);
    }
    let series_mean = mean_volume(bars);

    for swing in &swings.highs {
        if let Some(zone) =
            zone_around_swing(bars, swing, ZoneSide::Resistance, series_mean, deltas, config)
        {
            zones.push(zone);
        }
    }
    for swing in &swings.lows {
        if let Some(zone) =
            zone_around_swing(bars, swing, ZoneSide::Support, series_mean, deltas, config)
        {
            zones.push(zone);
        }
    }

    zones.sort_by_key(|zone| zone.timestamp);
    Ok(zones)
}

// ============================================================
// BREAKER ZONES
// ============================================================

/// A zone whose far edge is closed through flips role: the broken
/// resistance becomes support for the re-entry and mirror. Only the
/// first breaking bar per zone counts.
pub fn detect_breaker_zones(
    bars: &[Bar],
    zones: &[OrderZone],
    config: &AnalysisConfig,
) -> Result<Vec<BreakerZone>> {
    let mut breakers = Vec::new();
    let series_mean = mean_volume(bars);

    for zone in zones {
        let zone_volume = zone.volume_ratio * series_mean;
        let later = bars.iter().filter(|bar| bar.timestamp > zone.timestamp);

        for bar in later {
            let flip = match zone.side {
                ZoneSide::Resistance
                    if bar.close > zone.price_high * (1.0 + BREAKER_BREACH_PCT) =>
                {
                    Some((ZoneSide::Support, pct_of(bar.close - zone.price_high, zone.price_high)))
                }
                ZoneSide::Support if bar.close < zone.price_low * (1.0 - BREAKER_BREACH_PCT) => {
                    Some((ZoneSide::Resistance, pct_of(zone.price_low - bar.close, zone.price_low)))
                }
                _ => None,
            };

            if let Some((side, break_strength)) = flip {
                let confidence = (0.7 + pct_of(bar.volume, zone_volume) * 0.3).min(1.0);
                if confidence >= config.confidence_threshold {
                    breakers.push(BreakerZone {
                        timestamp: bar.timestamp,
                        side,
                        price_high: zone.price_high,
                        price_low: zone.price_low,
                        break_price: bar.close,
                        break_strength,
                        volume_confirmed: bar.volume > zone_volume * BREAKER_VOLUME_FACTOR,
                        confidence,
                        context: PatternContext::default(),
                    });
                }
                break;
            }
        }
    }

    breakers.sort_by_key(|breaker| breaker.timestamp);
    Ok(breakers)
}

// ============================================================
// MITIGATIONS
// ============================================================

/// A body at least twice the series mean that re-fills a zone marks it
/// as acknowledged by the market. First qualifying bar per zone.
pub fn detect_mitigations(bars: &[Bar], zones: &[OrderZone]) -> Result<Vec<MitigationEvent>> {
    let mut mitigations = Vec::new();
    let avg_body = mean_body(bars);
    if avg_body <= 0.0 {
        return Ok(mitigations);
    }
    let series_mean = mean_volume(bars);

    for zone in zones {
        let zone_volume = zone.volume_ratio * series_mean;
        let height = zone.price_high - zone.price_low;
        let later = bars.iter().filter(|bar| bar.timestamp > zone.timestamp);

        for bar in later {
            if bar.body() <= avg_body * MITIGATION_BODY_FACTOR {
                continue;
            }
            let fills = match zone.side {
                ZoneSide::Resistance => {
                    bar.is_bullish() && bar.open < zone.price_high && bar.close > zone.price_low
                }
                ZoneSide::Support => {
                    bar.is_bearish() && bar.open > zone.price_low && bar.close < zone.price_high
                }
            };
            if !fills {
                continue;
            }

            let fill_fraction = if height > 0.0 { (bar.body() / height).min(1.0) } else { 1.0 };
            let volume_strength = pct_of(bar.volume, zone_volume);
            mitigations.push(MitigationEvent {
                timestamp: bar.timestamp,
                direction: match zone.side {
                    ZoneSide::Resistance => Direction::Bullish,
                    ZoneSide::Support => Direction::Bearish,
                },
                zone_timestamp: zone.timestamp,
                fill_fraction,
                volume_strength,
                confidence: clamp01(0.6 + fill_fraction * 0.2 + volume_strength.min(1.0) * 0.2),
            });
            break;
        }
    }

    mitigations.sort_by_key(|event| event.timestamp);
    Ok(mitigations)
}

// ============================================================
// TESTS
// ============================================================
