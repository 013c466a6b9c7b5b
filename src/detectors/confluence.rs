//! Confluence detection: places where independent detections stack.
//!
//! Two shapes matter here: an order zone fully inside another of the
//! same side (nested), and a fair-value gap fully inside an order zone
//! of compatible side (gap-in-zone). Both mark bands where independent
//! evidence points the same way.

use crate::{ConfluenceKind, ConfluenceZone, Direction, OrderZone, PriceGap, Result, ZoneSide};

use super::helpers::clamp01;

// ============================================================
// PREDICATES
// ============================================================

/// `inner` sits fully inside `outer`, same side, and is strictly the
/// smaller band (rules out the symmetric double-count of identical
/// zones).
fn is_nested(outer: &OrderZone, inner: &OrderZone) -> bool {
    outer.side == inner.side
        && outer.price_low <= inner.price_low
        && outer.price_high >= inner.price_high
        && (outer.price_high - outer.price_low) > (inner.price_high - inner.price_low)
}

/// Gap direction compatible with the zone's role: bullish gaps in
/// support zones, bearish gaps in resistance zones.
fn gap_fits_zone(gap: &PriceGap, zone: &OrderZone) -> bool {
    let compatible = match zone.side {
        ZoneSide::Support => gap.direction == Direction::Bullish,
        ZoneSide::Resistance => gap.direction == Direction::Bearish,
    };
    compatible && zone.price_low <= gap.gap_low && zone.price_high >= gap.gap_high
}

// ============================================================
// DETECTORS
// ============================================================

/// Order zones contained in larger same-side zones. O(n²) over the
/// already-gated zone set, which the engine keeps small.
pub fn detect_nested_zones(zones: &[OrderZone]) -> Result<Vec<ConfluenceZone>> {
    let mut nested = Vec::new();

    for outer in zones {
        for inner in zones {
            if !is_nested(outer, inner) {
                continue;
            }
            nested.push(ConfluenceZone {
                kind: ConfluenceKind::NestedOrderZone,
                side: outer.side,
                price_high: outer.price_high,
                price_low: outer.price_low,
                strength: clamp01((outer.confidence + inner.confidence) / 2.0 + 0.1),
                outer_timestamp: outer.timestamp,
                inner_timestamp: inner.timestamp,
            });
        }
    }

    nested.sort_by_key(|zone| (zone.outer_timestamp, zone.inner_timestamp));
    Ok(nested)
}

/// Gaps fully contained in a compatible order zone. The emitted band is
/// the intersection - the highest-probability slice of both.
pub fn detect_gap_in_zone(gaps: &[PriceGap], zones: &[OrderZone]) -> Result<Vec<ConfluenceZone>> {
    let mut confluences = Vec::new();

    for gap in gaps {
        for zone in zones {
            if !gap_fits_zone(gap, zone) {
                continue;
            }
            confluences.push(ConfluenceZone {
                kind: ConfluenceKind::GapInZone,
                side: zone.side,
                price_high: gap.gap_high.min(zone.price_high),
                price_low: gap.gap_low.max(zone.price_low),
                strength: clamp01((gap.confidence + zone.confidence) / 2.0),
                outer_timestamp: zone.timestamp,
                inner_timestamp: gap.timestamp,
            });
        }
    }

    confluences.sort_by_key(|zone| (zone.outer_timestamp, zone.inner_timestamp));
    Ok(confluences)
}

// ============================================================
// TESTS
// ============================================================
