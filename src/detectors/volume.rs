//! Volume delta estimation and derived volume signals
//!
//! The buy/sell split is estimated from the close's position inside the
//! bar's range; there is no real order-flow feed behind it. Everything
//! downstream (CVD, absorption, divergence, imbalance) treats the split
//! as a proxy and says so in its confidence numbers.

use crate::{
    AbsorptionEvent, Bar, CvdDivergence, CvdSample, Direction, VolumeDeltaSample, VolumeImbalance,
};

use super::helpers::{
    clamp01, pct_of, trailing_avg_volume, ABSORPTION_BODY_MAX_RATIO, ABSORPTION_TRAILING_BARS,
    ABSORPTION_VOLUME_FACTOR, DIVERGENCE_LOOKBACK, DIVERGENCE_MIN_BARS, IMBALANCE_MIN_RATIO,
    IMBALANCE_SPIKE_FACTOR,
};
use crate::config::AnalysisConfig;

// ============================================================
// DELTA & CVD
// ============================================================

/// Estimate the per-bar buy/sell split. `buy + sell == volume` holds
/// exactly; a rangeless bar splits 50/50.
pub fn volume_deltas(bars: &[Bar]) -> Vec<VolumeDeltaSample> {
    bars.iter()
        .map(|bar| {
            let position = bar.close_position();
            let buy_volume = bar.volume * position;
            let sell_volume = bar.volume - buy_volume;
            let delta = buy_volume - sell_volume;
            VolumeDeltaSample {
                timestamp: bar.timestamp,
                buy_volume,
                sell_volume,
                delta,
                delta_ratio: pct_of(delta, bar.volume),
            }
        })
        .collect()
}

/// Cumulative volume delta: the running sum of per-bar deltas.
pub fn cumulative_delta(deltas: &[VolumeDeltaSample]) -> Vec<CvdSample> {
    let mut running = 0.0;
    deltas
        .iter()
        .map(|sample| {
            running += sample.delta;
            CvdSample { timestamp: sample.timestamp, cumulative_delta: running }
        })
        .collect()
}

// ============================================================
// ABSORPTION
// ============================================================

/// High volume with a small body: someone is absorbing the flow. Volume
/// is compared against a trailing average so one regime change does not
/// poison the whole window.
pub fn detect_absorption(bars: &[Bar], deltas: &[VolumeDeltaSample]) -> Vec<AbsorptionEvent> {
    let mut events = Vec::new();

    for i in 2..bars.len() {
        let bar = &bars[i];
        let trailing = trailing_avg_volume(bars, i, ABSORPTION_TRAILING_BARS);
        if trailing <= 0.0 {
            continue;
        }
        let high_volume = bar.volume >= trailing * ABSORPTION_VOLUME_FACTOR;
        let small_body = bar.body() <= bar.range() * ABSORPTION_BODY_MAX_RATIO;
        if high_volume && small_body && bar.range() > 0.0 {
            let delta = deltas[i].delta;
            events.push(AbsorptionEvent {
                timestamp: bar.timestamp,
                direction: if delta > 0.0 { Direction::Bullish } else { Direction::Bearish },
                volume: bar.volume,
                volume_ratio: bar.volume / trailing,
                delta,
                body: bar.body(),
                range: bar.range(),
            });
        }
    }

    events
}

// ============================================================
// PRICE / CVD DIVERGENCE
// ============================================================

/// Price moving one way while CVD moves the other over the divergence
/// lookback. Needs at least [`DIVERGENCE_MIN_BARS`] bars.
pub fn detect_cvd_divergences(bars: &[Bar], cvd: &[CvdSample]) -> Vec<CvdDivergence> {
    let mut divergences = Vec::new();
    if bars.len() < DIVERGENCE_MIN_BARS || cvd.len() < DIVERGENCE_MIN_BARS {
        return divergences;
    }

    for i in DIVERGENCE_LOOKBACK..bars.len() {
        let price_now = bars[i].close;
        let price_then = bars[i - DIVERGENCE_LOOKBACK].close;
        let cvd_now = cvd[i].cumulative_delta;
        let cvd_then = cvd[i - DIVERGENCE_LOOKBACK].cumulative_delta;

        let direction = if price_now < price_then && cvd_now > cvd_then {
            Direction::Bullish
        } else if price_now > price_then && cvd_now < cvd_then {
            Direction::Bearish
        } else {
            continue;
        };

        let price_change_pct = pct_of(price_now - price_then, price_then);
        let cvd_change = cvd_now - cvd_then;
        let cvd_scale = cvd_now.abs().max(cvd_then.abs()).max(1.0);
        divergences.push(CvdDivergence {
            timestamp: bars[i].timestamp,
            direction,
            price_change_pct,
            cvd_change,
            strength: clamp01(price_change_pct.abs() * cvd_change.abs() / cvd_scale),
        });
    }

    divergences
}

// ============================================================
// VOLUME IMBALANCE
// ============================================================

/// A bar whose estimated split is one-sided by at least
/// [`IMBALANCE_MIN_RATIO`]. Confidence grows with the ratio and is gated
/// by the configured floor like every other pattern.
pub fn detect_volume_imbalances(
    bars: &[Bar],
    deltas: &[VolumeDeltaSample],
    config: &AnalysisConfig,
) -> Vec<VolumeImbalance> {
    let mut imbalances = Vec::new();

    for i in 1..deltas.len() {
        let sample = &deltas[i];
        if sample.buy_volume <= 0.0 || sample.sell_volume <= 0.0 {
            continue;
        }

        let (ratio, direction, dominant) = if sample.buy_volume > sample.sell_volume {
            (sample.buy_volume / sample.sell_volume, Direction::Bullish, sample.buy_volume)
        } else {
            (sample.sell_volume / sample.buy_volume, Direction::Bearish, sample.sell_volume)
        };
        if ratio < IMBALANCE_MIN_RATIO {
            continue;
        }

        let trailing = trailing_avg_volume(bars, i, 5);
        let confidence = (0.4 + ratio / 10.0).min(0.9);
        if confidence < config.confidence_threshold {
            continue;
        }

        imbalances.push(VolumeImbalance {
            timestamp: bars[i].timestamp,
            direction,
            imbalance_ratio: ratio,
            dominant_volume: dominant,
            volume_spike: trailing > 0.0 && bars[i].volume > trailing * IMBALANCE_SPIKE_FACTOR,
            price_level: bars[i].close,
            confidence,
        });
    }

    imbalances
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar::new(ts, open, high, low, close, volume)
    }

    #[test]
    fn split_sums_to_bar_volume() {
        let bars = vec![
            bar(0, 100.0, 110.0, 90.0, 108.0, 1_000.0),
            bar(1, 108.0, 112.0, 104.0, 105.0, 2_500.0),
        ];
        for (sample, bar) in volume_deltas(&bars).iter().zip(&bars) {
            assert!((sample.buy_volume + sample.sell_volume - bar.volume).abs() < 1e-9);
        }
    }

    #[test]
    fn rangeless_bar_splits_evenly() {
        let bars = vec![bar(0, 100.0, 100.0, 100.0, 100.0, 800.0)];
        let deltas = volume_deltas(&bars);
        assert!((deltas[0].buy_volume - 400.0).abs() < 1e-9);
        assert_eq!(deltas[0].delta, 0.0);
    }

    #[test]
    fn close_at_high_is_all_buying() {
        let bars = vec![bar(0, 100.0, 110.0, 100.0, 110.0, 600.0)];
        let deltas = volume_deltas(&bars);
        assert!((deltas[0].buy_volume - 600.0).abs() < 1e-9);
        assert!((deltas[0].delta_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cvd_accumulates() {
        let bars = vec![
            bar(0, 100.0, 110.0, 100.0, 110.0, 100.0), // +100
            bar(1, 110.0, 110.0, 100.0, 100.0, 100.0), // -100
            bar(2, 100.0, 110.0, 100.0, 110.0, 50.0),  // +50
        ];
        let cvd = cumulative_delta(&volume_deltas(&bars));
        assert!((cvd[0].cumulative_delta - 100.0).abs() < 1e-9);
        assert!((cvd[1].cumulative_delta - 0.0).abs() < 1e-9);
        assert!((cvd[2].cumulative_delta - 50.0).abs() < 1e-9);
    }

    #[test]
    fn absorption_needs_volume_and_small_body() {
        let mut bars: Vec<Bar> =
            (0..25).map(|i| bar(i, 100.0, 102.0, 98.0, 101.0, 100.0)).collect();
        // Big volume, tiny body relative to range
        bars.push(bar(25, 100.0, 105.0, 95.0, 100.5, 400.0));
        let deltas = volume_deltas(&bars);
        let events = detect_absorption(&bars, &deltas);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 25);
        assert!(events[0].volume_ratio >= ABSORPTION_VOLUME_FACTOR);
    }

    #[test]
    fn big_body_is_not_absorption() {
        let mut bars: Vec<Bar> =
            (0..25).map(|i| bar(i, 100.0, 102.0, 98.0, 101.0, 100.0)).collect();
        // Same volume spike but directional body
        bars.push(bar(25, 95.1, 105.0, 95.0, 104.9, 400.0));
        let deltas = volume_deltas(&bars);
        assert!(detect_absorption(&bars, &deltas).is_empty());
    }

    #[test]
    fn bullish_divergence_price_down_cvd_up() {
        // Price drifts down while every close sits at the high (buying)
        let bars: Vec<Bar> = (0..25)
            .map(|i| {
                let base = 100.0 - i as f64 * 0.5;
                bar(i, base - 1.0, base, base - 1.5, base, 100.0)
            })
            .collect();
        let cvd = cumulative_delta(&volume_deltas(&bars));
        let divergences = detect_cvd_divergences(&bars, &cvd);

        assert!(!divergences.is_empty());
        assert!(divergences.iter().all(|d| d.direction == Direction::Bullish));
    }

    #[test]
    fn divergence_needs_minimum_history() {
        let bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0, 10.0)).collect();
        let cvd = cumulative_delta(&volume_deltas(&bars));
        assert!(detect_cvd_divergences(&bars, &cvd).is_empty());
    }

    #[test]
    fn strong_imbalance_detected_and_gated() {
        let config = AnalysisConfig::default();
        // close position 0.9 -> buy 90%, sell 10% -> ratio 9 -> confidence 0.9
        let bars = vec![
            bar(0, 100.0, 101.0, 99.0, 100.0, 100.0),
            bar(1, 100.0, 110.0, 100.0, 109.0, 100.0),
        ];
        let deltas = volume_deltas(&bars);
        let imbalances = detect_volume_imbalances(&bars, &deltas, &config);

        assert_eq!(imbalances.len(), 1);
        assert_eq!(imbalances[0].direction, Direction::Bullish);
        assert!(imbalances[0].confidence >= config.confidence_threshold);
    }

    #[test]
    fn mild_imbalance_below_floor_dropped() {
        let config = AnalysisConfig::default();
        // close position ~0.68 -> ratio ~2.1 -> confidence ~0.61 < 0.65
        let bars = vec![
            bar(0, 100.0, 101.0, 99.0, 100.0, 100.0),
            bar(1, 100.0, 110.0, 100.0, 106.8, 100.0),
        ];
        let deltas = volume_deltas(&bars);
        assert!(detect_volume_imbalances(&bars, &deltas, &config).is_empty());
    }
}
