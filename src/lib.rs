//! # smc-engine - Smart Money Concept market-structure analysis
//!
//! Deterministic, batch pattern-detection engine over a bounded window of
//! OHLCV bars. One call to [`SmcEngine::analyze`] derives swing points,
//! volume delta and CVD, structural breaks (CHoCH/BOS), order zones,
//! fair-value gaps, liquidity sweeps, equal levels and confluence zones,
//! then aggregates everything into a confidence score, a market bias and
//! risk-reward-gated trading signals.
//!
//! The engine is purely functional: it holds only its configuration, every
//! stage consumes immutable inputs and returns a fresh collection, and
//! identical `(bars, config)` always produce an identical
//! [`AnalysisResult`]. All I/O, caching and scheduling belong to the
//! caller.
//!
//! ## Quick Start
//!
//! ```rust
//! use smc_engine::prelude::*;
//!
//! // Any ascending, well-formed OHLCV window
//! let bars: Vec<Bar> = (0..60)
//!     .map(|i| {
//!         let base = 100.0 + (i % 7) as f64;
//!         Bar::new(i as i64 * 3_600_000, base, base + 2.0, base - 2.0, base + 1.0, 1_000.0)
//!     })
//!     .collect();
//!
//! let engine = SmcEngine::with_defaults();
//! let result = engine.analyze("BTC-USDT", "1H", &bars).unwrap();
//! assert!(result.confidence_score <= 1.0);
//! ```

pub mod config;
pub mod context;
pub mod detectors;
pub mod signal;

use config::AnalysisConfig;
use context::{apply_range_position, apply_session_weight, recent_swing_range, retain_confident};
use detectors::swing::SwingPoints;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::{AnalysisConfig, KnobMeta, KNOBS},
        // Context enrichment
        context::{Contextual, RangePosition, Session, SwingRange},
        detectors::swing::SwingPoints,
        // Parallel
        analyze_parallel,
        // Core types
        AbsorptionEvent,
        AnalysisFailure,
        AnalysisResult,
        Bar,
        BarFault,
        BreakerZone,
        ConfluenceKind,
        ConfluenceZone,
        CvdDivergence,
        CvdSample,
        Direction,
        // Errors
        EngineError,
        EqualKind,
        EqualLevel,
        LiquiditySweep,
        MarketBias,
        MarketStructure,
        MitigationEvent,
        OrderZone,
        PatternContext,
        PriceGap,
        RefinedEntry,
        Result,
        // Engine
        SmcEngine,
        StructuralEvent,
        StructuralKind,
        SweepCategory,
        SwingKind,
        SwingPoint,
        TradingSignal,
        TrendlineBreak,
        TrendlineLevel,
        VolumeDeltaSample,
        VolumeImbalance,
        ZoneSide,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, EngineError>;

/// A single validation failure on an input bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarFault {
    /// Index of the offending bar in the (canonicalized) input window
    pub index: usize,
    /// Field the fault was detected on
    pub field: &'static str,
    pub reason: &'static str,
}

/// Errors that abort an analysis. Insufficient history is deliberately
/// not here: a detector lacking lookback yields an empty collection so
/// partial analyses stay possible.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Malformed input window. Fatal, no partial result is produced.
    #[error("invalid bar data ({} offending bars)", .faults.len())]
    InvalidBarData { faults: Vec<BarFault> },

    #[error("{field} = {value} out of range [{min}, {max}]")]
    ConfigOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Internal detector fault; the engine converts these into a degraded
    /// (empty) stage rather than propagating them to the caller.
    #[error("{stage} stage failed: {reason}")]
    StageFailed {
        stage: &'static str,
        reason: &'static str,
    },
}

// ============================================================
// BARS
// ============================================================

/// One immutable OHLCV bar. Timestamps are milliseconds since the Unix
/// epoch and must be strictly ascending within a window.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Body as a fraction of range; 0 when the bar has no range.
    #[inline]
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range > f64::EPSILON {
            self.body() / range
        } else {
            0.0
        }
    }

    /// Close position inside [low, high]; 0.5 when the bar has no range.
    #[inline]
    pub fn close_position(&self) -> f64 {
        let range = self.range();
        if range > f64::EPSILON {
            (self.close - self.low) / range
        } else {
            0.5
        }
    }

    fn collect_faults(&self, index: usize, faults: &mut Vec<BarFault>) {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                faults.push(BarFault { index, field, reason: "not a finite number" });
            }
        }
        if self.high < self.low {
            faults.push(BarFault { index, field: "high", reason: "high below low" });
        }
        if self.high < self.open.max(self.close) {
            faults.push(BarFault { index, field: "high", reason: "high below body" });
        }
        if self.low > self.open.min(self.close) {
            faults.push(BarFault { index, field: "low", reason: "low above body" });
        }
        if self.volume < 0.0 {
            faults.push(BarFault { index, field: "volume", reason: "negative volume" });
        }
    }
}

/// Validate and canonicalize a raw bar window: every OHLCV field must be
/// finite and relationally sane, the output is sorted ascending, and
/// duplicate timestamps are rejected. All faults are reported together
/// rather than one at a time.
pub fn normalize_bars(bars: &[Bar]) -> Result<Vec<Bar>> {
    if bars.is_empty() {
        return Err(EngineError::InvalidBarData {
            faults: vec![BarFault { index: 0, field: "bars", reason: "empty input window" }],
        });
    }

    let mut faults = Vec::new();
    for (index, bar) in bars.iter().enumerate() {
        bar.collect_faults(index, &mut faults);
    }
    if !faults.is_empty() {
        return Err(EngineError::InvalidBarData { faults });
    }

    let mut canonical = bars.to_vec();
    canonical.sort_by_key(|bar| bar.timestamp);

    for (index, pair) in canonical.windows(2).enumerate() {
        if pair[0].timestamp == pair[1].timestamp {
            faults.push(BarFault {
                index: index + 1,
                field: "timestamp",
                reason: "duplicate timestamp",
            });
        }
    }
    if !faults.is_empty() {
        return Err(EngineError::InvalidBarData { faults });
    }

    Ok(canonical)
}

// ============================================================
// PATTERN ENTITIES
// ============================================================

/// Direction of a pattern or signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }
}

/// Overall market verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MarketBias {
    Bullish,
    #[default]
    Neutral,
    Bearish,
}

/// Role of a price zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ZoneSide {
    Support,
    Resistance,
}

impl ZoneSide {
    /// The direction a zone of this side argues for.
    #[inline]
    pub fn bias(self) -> Direction {
        match self {
            ZoneSide::Support => Direction::Bullish,
            ZoneSide::Resistance => Direction::Bearish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StructuralKind {
    ChangeOfCharacter,
    BreakOfStructure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SweepCategory {
    /// Swept level sits inside the recent range (other same-kind swings nearby)
    Internal,
    /// Swept level is a range extreme; more significant
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EqualKind {
    EqualHighs,
    EqualLows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConfluenceKind {
    NestedOrderZone,
    GapInZone,
}

/// Session/range annotations attached to a pattern by the context
/// enrichers. Patterns start with the default and are annotated in place
/// by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PatternContext {
    pub session: Option<context::Session>,
    pub session_weight: f64,
    pub range_position: Option<context::RangePosition>,
    /// Position inside the recent swing range, 0 = range low, 1 = range high
    pub range_ratio: f64,
}

/// A local price extremum over a symmetric lookback window.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwingPoint {
    pub timestamp: i64,
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// Estimated intrabar buy/sell split. The split is a close-position
/// heuristic, not real order-flow data; `buy_volume + sell_volume`
/// always equals the bar volume.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VolumeDeltaSample {
    pub timestamp: i64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub delta: f64,
    pub delta_ratio: f64,
}

/// Running sum of volume deltas.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CvdSample {
    pub timestamp: i64,
    pub cumulative_delta: f64,
}

/// High volume absorbed with little price movement.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AbsorptionEvent {
    pub timestamp: i64,
    pub direction: Direction,
    pub volume: f64,
    pub volume_ratio: f64,
    pub delta: f64,
    pub body: f64,
    pub range: f64,
}

/// Price/CVD divergence over the divergence lookback.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CvdDivergence {
    pub timestamp: i64,
    pub direction: Direction,
    pub price_change_pct: f64,
    pub cvd_change: f64,
    pub strength: f64,
}

/// Sudden one-sided dominance of the estimated buy/sell split.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VolumeImbalance {
    pub timestamp: i64,
    pub direction: Direction,
    pub imbalance_ratio: f64,
    pub dominant_volume: f64,
    pub volume_spike: bool,
    pub price_level: f64,
    pub confidence: f64,
}

/// Change of character or break of structure.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StructuralEvent {
    pub timestamp: i64,
    pub kind: StructuralKind,
    pub direction: Direction,
    pub price: f64,
    pub confidence: f64,
    pub volume_confirmed: bool,
    pub context: PatternContext,
}

/// Institutional order zone around a swing point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrderZone {
    pub timestamp: i64,
    pub side: ZoneSide,
    pub price_high: f64,
    pub price_low: f64,
    pub volume_ratio: f64,
    pub confidence: f64,
    pub context: PatternContext,
}

/// A broken order zone that flipped role.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BreakerZone {
    pub timestamp: i64,
    /// Side after the flip (a broken resistance becomes support)
    pub side: ZoneSide,
    pub price_high: f64,
    pub price_low: f64,
    pub break_price: f64,
    pub break_strength: f64,
    pub volume_confirmed: bool,
    pub confidence: f64,
    pub context: PatternContext,
}

/// A large bar re-filling a prior order zone.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MitigationEvent {
    pub timestamp: i64,
    pub direction: Direction,
    /// Formation timestamp of the mitigated zone
    pub zone_timestamp: i64,
    pub fill_fraction: f64,
    pub volume_strength: f64,
    pub confidence: f64,
}

/// Refined entry inside a fair-value gap.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RefinedEntry {
    /// An order zone formed inside the gap
    InternalZone { high: f64, low: f64, zone_timestamp: i64 },
    /// 61.8% retracement of the gap
    Retracement { level: f64 },
}

/// Three-bar fair-value gap.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceGap {
    pub timestamp: i64,
    pub direction: Direction,
    pub gap_high: f64,
    pub gap_low: f64,
    /// Gap size as a fraction of the middle bar's close
    pub gap_size_pct: f64,
    pub confidence: f64,
    pub refined_entry: Option<RefinedEntry>,
    pub context: PatternContext,
}

/// Breach of a swing extreme followed by a reversal back through it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LiquiditySweep {
    pub timestamp: i64,
    pub direction: Direction,
    pub sweep_price: f64,
    /// The swept swing level
    pub origin_level: f64,
    pub category: SweepCategory,
    pub confidence: f64,
    pub context: PatternContext,
}

/// Two same-kind swings at (nearly) the same price.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EqualLevel {
    pub timestamp: i64,
    pub kind: EqualKind,
    pub price_level: f64,
    /// The two source swing prices, chronological
    pub source_points: [f64; 2],
    pub confidence: f64,
    pub context: PatternContext,
}

/// Break of a multi-touch trendline.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrendlineBreak {
    pub timestamp: i64,
    pub break_price: f64,
    pub projected_price: f64,
    pub break_strength: f64,
}

/// Sloped support/resistance touched three or more times.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrendlineLevel {
    pub timestamp: i64,
    pub kind: ZoneSide,
    pub direction: Direction,
    /// Price change per millisecond along the line
    pub slope: f64,
    pub touch_count: usize,
    pub liquidity_strength: f64,
    pub broken: Option<TrendlineBreak>,
    pub confidence: f64,
}

/// Spatial overlap of two independent detections.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfluenceZone {
    pub kind: ConfluenceKind,
    pub side: ZoneSide,
    pub price_high: f64,
    pub price_low: f64,
    pub strength: f64,
    /// Formation timestamp of the containing member
    pub outer_timestamp: i64,
    /// Formation timestamp of the contained member
    pub inner_timestamp: i64,
}

/// Evidence-counted market verdict.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketStructure {
    pub bias: MarketBias,
    pub bias_strength: f64,
    pub structure_quality: f64,
    pub bullish_evidence: usize,
    pub bearish_evidence: usize,
}

impl Default for MarketStructure {
    fn default() -> Self {
        Self {
            bias: MarketBias::Neutral,
            bias_strength: 0.0,
            structure_quality: 0.0,
            bullish_evidence: 0,
            bearish_evidence: 0,
        }
    }
}

/// Actionable trade candidate that passed the risk-reward gate.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TradingSignal {
    pub timestamp: i64,
    pub direction: Direction,
    pub pattern: StructuralKind,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub risk_reward: f64,
    pub strength: f64,
    pub confidence: f64,
    pub supporting_zones: usize,
    pub supporting_gaps: usize,
    pub bias_aligned: bool,
}

// ============================================================
// ANALYSIS RESULT
// ============================================================

/// Aggregate root of one analysis run. Serializable as a structured
/// document; all confidences are in [0, 1] and all price fields use the
/// input unit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub timeframe: String,
    /// Timestamp of the last input bar
    pub as_of: i64,
    pub last_close: f64,

    pub swing_highs: Vec<SwingPoint>,
    pub swing_lows: Vec<SwingPoint>,
    pub volume_deltas: Vec<VolumeDeltaSample>,
    pub cvd: Vec<CvdSample>,
    pub absorptions: Vec<AbsorptionEvent>,
    pub divergences: Vec<CvdDivergence>,
    pub volume_imbalances: Vec<VolumeImbalance>,

    pub structural_events: Vec<StructuralEvent>,
    pub order_zones: Vec<OrderZone>,
    pub breaker_zones: Vec<BreakerZone>,
    pub mitigations: Vec<MitigationEvent>,
    pub price_gaps: Vec<PriceGap>,
    pub liquidity_sweeps: Vec<LiquiditySweep>,
    pub equal_levels: Vec<EqualLevel>,
    pub trendline_levels: Vec<TrendlineLevel>,
    pub confluence_zones: Vec<ConfluenceZone>,

    pub market_structure: MarketStructure,
    pub confidence_score: f64,
    pub signals: Vec<TradingSignal>,

    /// Names of stages whose internal fault degraded them to empty output
    pub degraded_stages: Vec<String>,
}

// ============================================================
// ENGINE
// ============================================================

/// The analysis engine. Holds only its configuration; a single instance
/// can serve concurrent [`analyze`](SmcEngine::analyze) calls with
/// different inputs without locking.
#[derive(Debug, Clone)]
pub struct SmcEngine {
    config: AnalysisConfig,
}

impl SmcEngine {
    /// Build an engine, validating the configuration up front.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self { config: AnalysisConfig::default() }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full pipeline over one bar window.
    ///
    /// Fatal errors ([`EngineError::InvalidBarData`]) abort with no
    /// partial result. A fault inside an individual detector never
    /// aborts its siblings: that stage's output degrades to empty and
    /// the stage name is recorded on
    /// [`AnalysisResult::degraded_stages`].
    pub fn analyze(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> Result<AnalysisResult> {
        let bars = normalize_bars(bars)?;
        let config = &self.config;
        let mut degraded: Vec<String> = Vec::new();

        // Foundation: volume estimation and swing points are total
        // functions over a normalized window.
        let volume_deltas = detectors::volume::volume_deltas(&bars);
        let cvd = detectors::volume::cumulative_delta(&volume_deltas);
        let absorptions = detectors::volume::detect_absorption(&bars, &volume_deltas);
        let divergences = detectors::volume::detect_cvd_divergences(&bars, &cvd);
        let volume_imbalances =
            detectors::volume::detect_volume_imbalances(&bars, &volume_deltas, config);
        let swings = detectors::swing::detect_swing_points(&bars, config.swing_lookback);

        // Pattern detectors, each isolated behind the stage wrapper.
        let mut structural_events = run_stage("structure", &mut degraded, || {
            detectors::structure::detect_structural_events(&bars, &swings, &volume_deltas, config)
        });
        let mut order_zones = run_stage("order_zones", &mut degraded, || {
            detectors::zones::detect_order_zones(&bars, &swings, &volume_deltas, config)
        });
        let mut price_gaps = run_stage("price_gaps", &mut degraded, || {
            detectors::gaps::detect_price_gaps(&bars, &volume_deltas, config)
        });
        let mut liquidity_sweeps = run_stage("liquidity_sweeps", &mut degraded, || {
            detectors::liquidity::detect_liquidity_sweeps(&bars, &swings, config)
        });
        let mut equal_levels = run_stage("equal_levels", &mut degraded, || {
            detectors::liquidity::detect_equal_levels(&swings, config)
        });
        let trendline_levels = run_stage("trendline_levels", &mut degraded, || {
            detectors::liquidity::detect_trendline_levels(&bars, &swings, config)
        });
        let mut breaker_zones = run_stage("breaker_zones", &mut degraded, || {
            detectors::zones::detect_breaker_zones(&bars, &order_zones, config)
        });
        let mitigations = run_stage("mitigations", &mut degraded, || {
            detectors::zones::detect_mitigations(&bars, &order_zones)
        });

        // Context enrichment: session weighting then premium/discount
        // mapping, followed by a re-gate so the confidence floor holds
        // on the final result.
        let range = recent_swing_range(&swings);
        apply_session_weight(&mut structural_events);
        apply_session_weight(&mut order_zones);
        apply_session_weight(&mut breaker_zones);
        apply_session_weight(&mut price_gaps);
        apply_session_weight(&mut liquidity_sweeps);
        apply_session_weight(&mut equal_levels);
        apply_range_position(range.as_ref(), &mut structural_events);
        apply_range_position(range.as_ref(), &mut order_zones);
        apply_range_position(range.as_ref(), &mut breaker_zones);
        apply_range_position(range.as_ref(), &mut price_gaps);
        apply_range_position(range.as_ref(), &mut liquidity_sweeps);
        apply_range_position(range.as_ref(), &mut equal_levels);

        let threshold = config.confidence_threshold;
        retain_confident(&mut structural_events, threshold);
        retain_confident(&mut order_zones, threshold);
        retain_confident(&mut breaker_zones, threshold);
        retain_confident(&mut price_gaps, threshold);
        retain_confident(&mut liquidity_sweeps, threshold);
        retain_confident(&mut equal_levels, threshold);

        // Gap refinement runs on the surviving zones.
        let price_gaps = detectors::gaps::refine_entries(price_gaps, &order_zones);

        // Confluence over the final zones and gaps.
        let mut confluence_zones = run_stage("confluence", &mut degraded, || {
            detectors::confluence::detect_nested_zones(&order_zones)
        });
        confluence_zones.extend(run_stage("confluence_gaps", &mut degraded, || {
            detectors::confluence::detect_gap_in_zone(&price_gaps, &order_zones)
        }));

        let as_of = bars.last().map(|bar| bar.timestamp).unwrap_or_default();
        let last_close = bars.last().map(|bar| bar.close).unwrap_or_default();

        let market_structure =
            signal::derive_market_structure(&structural_events, &divergences, as_of);
        let confidence_score = signal::aggregate_confidence(
            &structural_events,
            &order_zones,
            &price_gaps,
            &liquidity_sweeps,
            confluence_zones.len(),
            &divergences,
        );
        let signals = run_stage("signals", &mut degraded, || {
            signal::synthesize_signals(
                &structural_events,
                &order_zones,
                &price_gaps,
                &equal_levels,
                &swings,
                &market_structure,
                config,
            )
        });

        tracing::debug!(
            symbol,
            timeframe,
            bars = bars.len(),
            swings = swings.highs.len() + swings.lows.len(),
            events = structural_events.len(),
            zones = order_zones.len(),
            gaps = price_gaps.len(),
            sweeps = liquidity_sweeps.len(),
            signals = signals.len(),
            degraded = degraded.len(),
            "analysis complete"
        );

        let SwingPoints { highs: swing_highs, lows: swing_lows } = swings;

        Ok(AnalysisResult {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            as_of,
            last_close,
            swing_highs,
            swing_lows,
            volume_deltas,
            cvd,
            absorptions,
            divergences,
            volume_imbalances,
            structural_events,
            order_zones,
            breaker_zones,
            mitigations,
            price_gaps,
            liquidity_sweeps,
            equal_levels,
            trendline_levels,
            confluence_zones,
            market_structure,
            confidence_score,
            signals,
            degraded_stages: degraded,
        })
    }
}

/// Run one detector stage; an `Err` degrades the stage to empty output
/// instead of aborting the analysis.
fn run_stage<T>(
    name: &'static str,
    degraded: &mut Vec<String>,
    stage: impl FnOnce() -> Result<Vec<T>>,
) -> Vec<T> {
    match stage() {
        Ok(items) => items,
        Err(error) => {
            tracing::warn!(stage = name, %error, "stage degraded to empty output");
            degraded.push(name.to_string());
            Vec::new()
        }
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Error from analyzing a single instrument.
#[derive(Debug)]
pub struct AnalysisFailure {
    pub symbol: String,
    pub error: EngineError,
}

/// Analyze many `(symbol, timeframe, bars)` batches in parallel. The
/// engine itself stays single-threaded per invocation; parallelism is
/// purely across instruments.
pub fn analyze_parallel<'a, I>(
    engine: &SmcEngine,
    batches: I,
) -> (Vec<AnalysisResult>, Vec<AnalysisFailure>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a str, &'a [Bar])>,
{
    let outcomes: Vec<_> = batches
        .into_par_iter()
        .map(|(symbol, timeframe, bars)| {
            engine
                .analyze(symbol, timeframe, bars)
                .map_err(|error| AnalysisFailure { symbol: symbol.to_string(), error })
        })
        .collect();

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(failure) => failures.push(failure),
        }
    }

    (results, failures)
}

// ============================================================
// TESTS
// ============================================================
