//! Context enrichers: session weighting and premium/discount mapping
//!
//! Neither enricher creates patterns; they annotate the ones the
//! detectors produced and nudge their confidence. Session weight favors
//! the openings of the major trading sessions; range position rewards
//! patterns sitting on the "right" side of the recent swing range
//! (longs in discount, shorts in premium).
//!
//! Hours are derived from bar timestamps by plain UTC arithmetic so the
//! annotation never depends on the host's clock or timezone.

use crate::detectors::helpers::{clamp01, DAY_MS, HOUR_MS};
use crate::detectors::swing::SwingPoints;
use crate::{Direction, PatternContext};

/// Patterns the last 3 swings on each side define the active range from.
const RANGE_SWINGS: usize = 3;
/// Range share at and above which price is premium.
const PREMIUM_THRESHOLD: f64 = 0.618;
/// Range share at and below which price is discount.
const DISCOUNT_THRESHOLD: f64 = 0.382;
/// Session weight floor outside every killzone.
const OFF_SESSION_WEIGHT: f64 = 0.3;
/// Session weight above which a pattern earns the timing boost.
const BOOST_FLOOR: f64 = 0.7;

// ============================================================
// SESSIONS
// ============================================================

/// The three killzone sessions, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Session {
    /// 00:00-03:00 UTC, lower volatility
    Asia,
    /// 07:00-10:00 UTC, trend initiation
    London,
    /// 13:00-16:00 UTC, highest volatility
    NewYork,
}

impl Session {
    /// Session bounds as fractional UTC hours, half-open.
    fn bounds(self) -> (f64, f64) {
        match self {
            Session::Asia => (0.0, 3.0),
            Session::London => (7.0, 10.0),
            Session::NewYork => (13.0, 16.0),
        }
    }

    const ALL: [Session; 3] = [Session::Asia, Session::London, Session::NewYork];
}

/// Fractional UTC hour of day for a millisecond timestamp.
#[inline]
fn utc_hour(timestamp: i64) -> f64 {
    timestamp.rem_euclid(DAY_MS) as f64 / HOUR_MS as f64
}

/// The active session (if any) and its weight at `timestamp`. Weight is
/// highest at the session open and decays through the session; outside
/// every session it is [`OFF_SESSION_WEIGHT`].
pub fn session_weight_at(timestamp: i64) -> (Option<Session>, f64) {
    let hour = utc_hour(timestamp);
    for session in Session::ALL {
        let (start, end) = session.bounds();
        if hour >= start && hour < end {
            let progress = (hour - start) / (end - start);
            let weight = if progress <= 0.5 {
                1.0 - progress * 0.3
            } else {
                0.7 - (progress - 0.5) * 0.4
            };
            return (Some(session), weight);
        }
    }
    (None, OFF_SESSION_WEIGHT)
}

// ============================================================
// RANGE POSITION
// ============================================================

/// Where a price sits relative to the recent swing range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RangePosition {
    /// Upper 38.2% of the range: look for sells
    Premium,
    Equilibrium,
    /// Lower 38.2% of the range: look for buys
    Discount,
}

/// The active swing range: max of the recent swing highs over min of
/// the recent swing lows.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwingRange {
    pub high: f64,
    pub low: f64,
}

impl SwingRange {
    #[inline]
    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    /// Position of `price` in the range and its classification.
    pub fn position(&self, price: f64) -> (RangePosition, f64) {
        let ratio = (price - self.low) / self.span();
        let position = if ratio >= PREMIUM_THRESHOLD {
            RangePosition::Premium
        } else if ratio <= DISCOUNT_THRESHOLD {
            RangePosition::Discount
        } else {
            RangePosition::Equilibrium
        };
        (position, ratio)
    }
}

/// Range spanned by the last [`RANGE_SWINGS`] swings on each side; none
/// without at least one swing high and one swing low.
pub fn recent_swing_range(swings: &SwingPoints) -> Option<SwingRange> {
    let high = swings
        .highs
        .iter()
        .rev()
        .take(RANGE_SWINGS)
        .map(|swing| swing.price)
        .fold(f64::MIN, f64::max);
    let low = swings
        .lows
        .iter()
        .rev()
        .take(RANGE_SWINGS)
        .map(|swing| swing.price)
        .fold(f64::MAX, f64::min);

    if swings.highs.is_empty() || swings.lows.is_empty() || high <= low {
        return None;
    }
    Some(SwingRange { high, low })
}

// ============================================================
// CONTEXTUAL PATTERNS
// ============================================================

/// The seam the enrichers work through: anything with a timestamp, an
/// anchor price, an optional directional bias and an adjustable
/// confidence can be annotated.
pub trait Contextual {
    fn timestamp(&self) -> i64;
    fn anchor_price(&self) -> f64;
    /// Directional claim of the pattern, if it makes one.
    fn bias(&self) -> Option<Direction>;
    fn confidence(&self) -> f64;
    fn set_confidence(&mut self, value: f64);
    fn context_mut(&mut self) -> &mut PatternContext;
}

macro_rules! impl_contextual {
    ($type:ty, price: $price:expr, bias: $bias:expr) => {
        impl Contextual for $type {
            fn timestamp(&self) -> i64 {
                self.timestamp
            }

            fn anchor_price(&self) -> f64 {
                let price_of = $price;
                price_of(self)
            }

            fn bias(&self) -> Option<Direction> {
                let bias_of = $bias;
                bias_of(self)
            }

            fn confidence(&self) -> f64 {
                self.confidence
            }

            fn set_confidence(&mut self, value: f64) {
                self.confidence = clamp01(value);
            }

            fn context_mut(&mut self) -> &mut PatternContext {
                &mut self.context
            }
        }
    };
}

impl_contextual!(
    crate::StructuralEvent,
    price: |e: &crate::StructuralEvent| e.price,
    bias: |e: &crate::StructuralEvent| Some(e.direction)
);
impl_contextual!(
    crate::OrderZone,
    price: |z: &crate::OrderZone| (z.price_high + z.price_low) / 2.0,
    bias: |z: &crate::OrderZone| Some(z.side.bias())
);
impl_contextual!(
    crate::BreakerZone,
    price: |z: &crate::BreakerZone| (z.price_high + z.price_low) / 2.0,
    bias: |z: &crate::BreakerZone| Some(z.side.bias())
);
impl_contextual!(
    crate::PriceGap,
    price: |g: &crate::PriceGap| (g.gap_high + g.gap_low) / 2.0,
    bias: |g: &crate::PriceGap| Some(g.direction)
);
impl_contextual!(
    crate::LiquiditySweep,
    price: |s: &crate::LiquiditySweep| s.sweep_price,
    bias: |s: &crate::LiquiditySweep| Some(s.direction)
);
// Equal levels mark resting liquidity without a directional claim, so
// they get session/range annotations but no alignment adjustment.
impl_contextual!(
    crate::EqualLevel,
    price: |l: &crate::EqualLevel| l.price_level,
    bias: |_: &crate::EqualLevel| None
);

// ============================================================
// ENRICHMENT PASSES
// ============================================================

/// Annotate each pattern with its session and weight; patterns formed
/// early in a killzone earn a timing boost.
pub fn apply_session_weight<T: Contextual>(items: &mut [T]) {
    for item in items.iter_mut() {
        let (session, weight) = session_weight_at(item.timestamp());
        let context = item.context_mut();
        context.session = session;
        context.session_weight = weight;

        if session.is_some() && weight > BOOST_FLOOR {
            let boosted = (item.confidence() + weight * 0.2).min(1.0);
            item.set_confidence(boosted);
        }
    }
}

/// Annotate each pattern with its range position; aligned patterns
/// (discount+bullish, premium+bearish) gain confidence, misaligned ones
/// lose it down to a floor of 0.2.
pub fn apply_range_position<T: Contextual>(range: Option<&SwingRange>, items: &mut [T]) {
    let Some(range) = range else {
        return;
    };

    for item in items.iter_mut() {
        let price = item.anchor_price();
        if price <= 0.0 {
            continue;
        }
        let (position, ratio) = range.position(price);
        let bias = item.bias();
        let context = item.context_mut();
        context.range_position = Some(position);
        context.range_ratio = ratio;

        let Some(direction) = bias else {
            continue;
        };
        let aligned = matches!(
            (position, direction),
            (RangePosition::Discount, Direction::Bullish)
                | (RangePosition::Premium, Direction::Bearish)
        );
        let misaligned = matches!(
            (position, direction),
            (RangePosition::Premium, Direction::Bullish)
                | (RangePosition::Discount, Direction::Bearish)
        );

        if aligned {
            item.set_confidence((item.confidence() + 0.15).min(1.0));
        } else if misaligned {
            item.set_confidence((item.confidence() - 0.1).max(0.2));
        }
    }
}

/// Drop every pattern whose (possibly adjusted) confidence fell below
/// the floor, so the monotonic-floor property holds on the final result.
pub fn retain_confident<T: Contextual>(items: &mut Vec<T>, threshold: f64) {
    items.retain(|item| item.confidence() >= threshold);
}

// ============================================================
// TESTS
// ============================================================
