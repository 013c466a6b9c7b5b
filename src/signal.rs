//! Confidence aggregation, market-structure verdict and signal synthesis
//!
//! The aggregator folds every surviving pattern family into one score
//! with fixed weights; the verdict counts directional evidence; the
//! synthesizer turns the strongest structural events into entry/stop/
//! target candidates and keeps only those clearing the risk-reward gate.

use crate::config::AnalysisConfig;
use crate::detectors::helpers::{clamp01, RECENT_STRUCTURE_MS, SUPPORT_WINDOW_MS};
use crate::detectors::swing::SwingPoints;
use crate::{
    CvdDivergence, Direction, EqualKind, EqualLevel, LiquiditySweep, MarketBias, MarketStructure,
    OrderZone, PriceGap, Result, StructuralEvent, TradingSignal, ZoneSide,
};

/// Fallback reward multiple when no opposing level exists to target.
const DEFAULT_TARGET_RR: f64 = 2.5;
/// Fallback protective distance when no opposing swing exists.
const DEFAULT_STOP_PCT: f64 = 0.005;
/// Minimum blended strength before a structural event becomes a signal.
const SIGNAL_STRENGTH_FLOOR: f64 = 0.7;
/// Divergence strength that counts as strong in the aggregate bonus.
const STRONG_DIVERGENCE: f64 = 0.5;

// ============================================================
// MARKET STRUCTURE
// ============================================================

/// Count recent directional evidence (structural events and CVD
/// divergences) into a bias verdict. Recency is measured against the
/// last bar's timestamp, never the wall clock.
pub fn derive_market_structure(
    events: &[StructuralEvent],
    divergences: &[CvdDivergence],
    as_of: i64,
) -> MarketStructure {
    let cutoff = as_of - RECENT_STRUCTURE_MS;
    let recent_events: Vec<&StructuralEvent> =
        events.iter().filter(|event| event.timestamp > cutoff).collect();
    let recent_divergences: Vec<&CvdDivergence> =
        divergences.iter().filter(|div| div.timestamp > cutoff).collect();

    let count_direction = |direction: Direction| {
        recent_events.iter().filter(|e| e.direction == direction).count()
            + recent_divergences.iter().filter(|d| d.direction == direction).count()
    };
    let bullish = count_direction(Direction::Bullish);
    let bearish = count_direction(Direction::Bearish);
    let total = bullish + bearish;

    let bias = match bullish.cmp(&bearish) {
        std::cmp::Ordering::Greater => MarketBias::Bullish,
        std::cmp::Ordering::Less => MarketBias::Bearish,
        std::cmp::Ordering::Equal => MarketBias::Neutral,
    };
    let bias_strength =
        if total > 0 { bullish.abs_diff(bearish) as f64 / total as f64 } else { 0.0 };

    let count_score = ((recent_events.len() + recent_divergences.len()) as f64 * 0.1).min(0.5);
    let quality_score = if recent_events.is_empty() {
        0.25
    } else {
        recent_events.iter().map(|e| e.confidence).sum::<f64>() / recent_events.len() as f64 * 0.5
    };

    MarketStructure {
        bias,
        bias_strength,
        structure_quality: clamp01(count_score + quality_score),
        bullish_evidence: bullish,
        bearish_evidence: bearish,
    }
}

// ============================================================
// CONFIDENCE AGGREGATION
// ============================================================

fn mean_confidence_of<T>(items: &[T], confidence: impl Fn(&T) -> f64) -> Option<f64> {
    if items.is_empty() {
        return None;
    }
    Some(items.iter().map(&confidence).sum::<f64>() / items.len() as f64)
}

/// Weighted blend of the surviving pattern families, plus small bonuses
/// for confluence and strong divergences. A window with no patterns at
/// all scores 0.0.
pub fn aggregate_confidence(
    events: &[StructuralEvent],
    zones: &[OrderZone],
    gaps: &[PriceGap],
    sweeps: &[LiquiditySweep],
    confluence_count: usize,
    divergences: &[CvdDivergence],
) -> f64 {
    let mut score = 0.0;
    if let Some(mean) = mean_confidence_of(events, |e| e.confidence) {
        score += mean * 0.30;
    }
    if let Some(mean) = mean_confidence_of(zones, |z| z.confidence) {
        score += mean * 0.25;
    }
    if let Some(mean) = mean_confidence_of(gaps, |g| g.confidence) {
        score += mean * 0.20;
    }
    if let Some(mean) = mean_confidence_of(sweeps, |s| s.confidence) {
        score += mean * 0.15;
    }

    let confluence_bonus = (confluence_count as f64 * 0.02).min(0.1);
    let strong_divergences =
        divergences.iter().filter(|div| div.strength > STRONG_DIVERGENCE).count();
    let divergence_bonus = (strong_divergences as f64 * 0.01).min(0.05);

    clamp01(score + confluence_bonus + divergence_bonus)
}

// ============================================================
// SIGNAL SYNTHESIS
// ============================================================

/// Reward per unit of risk; 0 when the risk side is degenerate.
pub fn risk_reward(entry: f64, stop: f64, target: f64) -> f64 {
    let risk = (entry - stop).abs();
    if risk <= f64::EPSILON {
        return 0.0;
    }
    (target - entry).abs() / risk
}

/// Protective level: the nearest opposing swing, else a fixed fraction
/// away from entry.
fn protective_stop(entry: f64, direction: Direction, swings: &SwingPoints) -> f64 {
    match direction {
        Direction::Bullish => swings
            .lows
            .iter()
            .map(|swing| swing.price)
            .filter(|price| *price < entry)
            .fold(f64::NAN, f64::max),
        Direction::Bearish => swings
            .highs
            .iter()
            .map(|swing| swing.price)
            .filter(|price| *price > entry)
            .fold(f64::NAN, f64::min),
    }
    .into_option()
    .unwrap_or(match direction {
        Direction::Bullish => entry * (1.0 - DEFAULT_STOP_PCT),
        Direction::Bearish => entry * (1.0 + DEFAULT_STOP_PCT),
    })
}

/// Target: the nearest opposing liquidity (order-zone edge or equal
/// level), else a default multiple of the risk.
fn target_level(
    entry: f64,
    risk: f64,
    direction: Direction,
    zones: &[OrderZone],
    equal_levels: &[EqualLevel],
) -> f64 {
    match direction {
        Direction::Bullish => {
            let zone_edges = zones
                .iter()
                .filter(|zone| zone.side == ZoneSide::Resistance)
                .map(|zone| zone.price_low);
            let levels = equal_levels
                .iter()
                .filter(|level| level.kind == EqualKind::EqualHighs)
                .map(|level| level.price_level);
            zone_edges
                .chain(levels)
                .filter(|price| *price > entry)
                .fold(f64::NAN, f64::min)
                .into_option()
                .unwrap_or(entry + risk * DEFAULT_TARGET_RR)
        }
        Direction::Bearish => {
            let zone_edges = zones
                .iter()
                .filter(|zone| zone.side == ZoneSide::Support)
                .map(|zone| zone.price_high);
            let levels = equal_levels
                .iter()
                .filter(|level| level.kind == EqualKind::EqualLows)
                .map(|level| level.price_level);
            zone_edges
                .chain(levels)
                .filter(|price| *price < entry)
                .fold(f64::NAN, f64::max)
                .into_option()
                .unwrap_or(entry - risk * DEFAULT_TARGET_RR)
        }
    }
}

trait IntoOption {
    fn into_option(self) -> Option<f64>;
}

impl IntoOption for f64 {
    fn into_option(self) -> Option<f64> {
        if self.is_nan() {
            None
        } else {
            Some(self)
        }
    }
}

/// Turn above-threshold structural events into trade candidates and keep
/// those clearing the configured risk-reward gate.
pub fn synthesize_signals(
    events: &[StructuralEvent],
    zones: &[OrderZone],
    gaps: &[PriceGap],
    equal_levels: &[EqualLevel],
    swings: &SwingPoints,
    structure: &MarketStructure,
    config: &AnalysisConfig,
) -> Result<Vec<TradingSignal>> {
    let mut signals = Vec::new();

    for event in events {
        let supporting_zones = zones
            .iter()
            .filter(|zone| (zone.timestamp - event.timestamp).abs() < SUPPORT_WINDOW_MS)
            .count();
        let supporting_gaps = gaps
            .iter()
            .filter(|gap| (gap.timestamp - event.timestamp).abs() < SUPPORT_WINDOW_MS)
            .count();

        let strength = clamp01(
            event.confidence
                + (supporting_zones as f64 * 0.05).min(0.2)
                + (supporting_gaps as f64 * 0.05).min(0.15),
        );
        if strength < SIGNAL_STRENGTH_FLOOR {
            continue;
        }

        let entry = event.price;
        let stop = protective_stop(entry, event.direction, swings);
        let risk = (entry - stop).abs();
        if risk <= f64::EPSILON {
            continue;
        }
        let target = target_level(entry, risk, event.direction, zones, equal_levels);
        let ratio = risk_reward(entry, stop, target);
        if ratio < config.min_risk_reward {
            continue;
        }

        let bias_aligned = matches!(
            (event.direction, structure.bias),
            (Direction::Bullish, MarketBias::Bullish) | (Direction::Bearish, MarketBias::Bearish)
        );

        signals.push(TradingSignal {
            timestamp: event.timestamp,
            direction: event.direction,
            pattern: event.kind,
            entry,
            stop,
            target,
            risk_reward: ratio,
            strength,
            confidence: event.confidence,
            supporting_zones,
            supporting_gaps,
            bias_aligned,
        });
    }

    Ok(signals)
}

// ============================================================
// TESTS
// ============================================================
