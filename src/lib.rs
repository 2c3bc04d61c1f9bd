//! # SDZones - Supply and Demand Zone Detection
//!
//! Detects impulse–base–impulse structures (Rally-Base-Rally, Drop-Base-Drop,
//! Rally-Base-Drop, Drop-Base-Rally) in daily OHLC series and scans the bars that
//! follow each structure for retests of the zone.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::FixedOffset;
//! use sdzones::prelude::*;
//!
//! let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
//! let day = |i: i64| 1_704_067_200 + i * 86_400;
//!
//! let candles = vec![
//!     Candle::from_unix_seconds(day(0), ist, 100.0, 100.0, 100.0, 100.0).unwrap(),
//!     Candle::from_unix_seconds(day(1), ist, 100.0, 111.0, 99.0, 110.0).unwrap(),
//!     Candle::from_unix_seconds(day(2), ist, 109.0, 110.0, 107.0, 108.0).unwrap(),
//!     Candle::from_unix_seconds(day(3), ist, 108.0, 119.0, 107.0, 118.0).unwrap(),
//! ];
//!
//! let analyzer = AnalyzerBuilder::new()
//!     .variant(PatternVariant::RallyBaseRally)
//!     .max_bases(4)
//!     .build()
//!     .unwrap();
//!
//! let results = analyzer.run(&candles).unwrap();
//! assert_eq!(results.len(), 1);
//! assert_eq!(results[0].zone.zone_low, 107.0);
//! assert_eq!(results[0].zone.zone_high, 109.0);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};

pub mod analysis;
pub mod detectors;
pub mod export;
pub mod params;
pub mod retest;

pub mod prelude {
    pub use crate::{
        // Orchestration
        analysis::{
            analyze_parallel, Analysis, AnalysisError, AnalyzerBuilder, CandleSource,
            InMemorySource, SourceError, ZoneAnalyzer, ZoneConfig,
        },
        // Detectors
        detectors::*,
        // Export
        export::{export_csv_file, write_analyses, write_results},
        // Parameters
        params::{get_count, get_ratio, ParamMeta, ParamType, Parameterized},
        // Retests
        retest::{
            scan_retests, scan_retests_par, scan_retests_with, scan_zone, RetestConfig,
            RetestResult, RetestStatus,
        },
        // Types
        validate_candles,
        Candle,
        CandleExt,
        Direction,
        MaxBases,
        PatternVariant,
        Ratio,
        Result,
        SignalSide,
        Timestamp,
        Zone,
        ZoneError,
        ZoneKind,
        OHLC,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ZoneError>;

/// Errors that can occur during zone detection and analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum ZoneError {
    #[error("No candles available")]
    EmptyInput,

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range {range}")]
    InvalidThreshold {
        field: &'static str,
        value: f64,
        range: &'static str,
    },

    #[error("max_bases = {value} out of range [1, {max}]")]
    InvalidMaxBases { value: usize, max: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Malformed candle at index {index}: {reason}")]
    MalformedCandle { index: usize, reason: &'static str },

    #[error("Candle source failed: {0}")]
    Source(#[from] analysis::SourceError),

    #[error("Export failed: {0}")]
    Export(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(ZoneError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ZoneError::InvalidThreshold {
                field: "Ratio",
                value,
                range: "[0, 1]",
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Maximum number of base candles between two impulses (1..=4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MaxBases(usize);

impl MaxBases {
    pub const MAX: usize = 4;

    pub fn new(value: usize) -> Result<Self> {
        if !(1..=Self::MAX).contains(&value) {
            return Err(ZoneError::InvalidMaxBases {
                value,
                max: Self::MAX,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for MaxBases {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

impl serde::Serialize for MaxBases {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for MaxBases {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        MaxBases::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLC TRAITS
// ============================================================

/// Timezone-aware candle instant
pub type Timestamp = DateTime<FixedOffset>;

/// Core OHLC data trait
pub trait OHLC {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn timestamp(&self) -> Timestamp;
}

impl<T: OHLC + ?Sized> OHLC for &T {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn timestamp(&self) -> Timestamp {
        (**self).timestamp()
    }
}

/// Extension trait with computed candle geometry
pub trait CandleExt: OHLC {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    /// High-low range, floored at [`detectors::RANGE_EPSILON`] so flat candles
    /// never divide by zero.
    #[inline]
    fn range(&self) -> f64 {
        (self.high() - self.low()).max(detectors::RANGE_EPSILON)
    }

    #[inline]
    fn upper_wick(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_wick(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    /// Upper plus lower wick
    #[inline]
    fn wick(&self) -> f64 {
        self.upper_wick() + self.lower_wick()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.open() > self.close()
    }

    #[inline]
    fn direction(&self) -> Direction {
        if self.is_bullish() {
            Direction::Bullish
        } else if self.is_bearish() {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }

    #[inline]
    fn body_ratio(&self) -> f64 {
        self.body() / self.range()
    }

    #[inline]
    fn wick_ratio(&self) -> f64 {
        self.wick() / self.range()
    }

    /// Validate OHLC data consistency
    fn validate(&self) -> Result<()> {
        let (o, h, l, c) = (self.open(), self.high(), self.low(), self.close());
        if [o, h, l, c].iter().any(|v| v.is_nan()) {
            return Err(ZoneError::MalformedCandle {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if [o, h, l, c].iter().any(|v| v.is_infinite()) {
            return Err(ZoneError::MalformedCandle {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if h < l {
            return Err(ZoneError::MalformedCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if o > h || o < l {
            return Err(ZoneError::MalformedCandle {
                index: 0,
                reason: "open outside [low, high]",
            });
        }
        if c > h || c < l {
            return Err(ZoneError::MalformedCandle {
                index: 0,
                reason: "close outside [low, high]",
            });
        }
        Ok(())
    }
}

impl<T: OHLC + ?Sized> CandleExt for T {}

/// Validate every candle, reporting the index of the first bad one.
pub fn validate_candles<T: OHLC>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            ZoneError::MalformedCandle { reason, .. } => {
                ZoneError::MalformedCandle { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}

/// A daily OHLC candle
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: Timestamp, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Build a candle from a unix timestamp (seconds), shown in `offset`.
    /// Returns None if the timestamp is out of range.
    pub fn from_unix_seconds(
        secs: i64,
        offset: FixedOffset,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Option<Self> {
        let timestamp = DateTime::from_timestamp(secs, 0)?.with_timezone(&offset);
        Some(Self::new(timestamp, open, high, low, close))
    }
}

impl OHLC for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

// ============================================================
// PATTERN TYPES
// ============================================================

/// Directional bias of a single candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Whether a zone is expected to hold price from below or from above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ZoneKind {
    Demand,
    Supply,
}

impl ZoneKind {
    /// Side of the entry a retest of this zone signals
    #[inline]
    pub fn side(self) -> SignalSide {
        match self {
            ZoneKind::Demand => SignalSide::Buy,
            ZoneKind::Supply => SignalSide::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSide {
    Buy,
    Sell,
}

impl SignalSide {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalSide::Buy => "BUY",
            SignalSide::Sell => "SELL",
        }
    }
}

/// Impulse–base–impulse variant
///
/// | Variant | First impulse | Second impulse | Zone   |
/// |---------|---------------|----------------|--------|
/// | RBR     | rally         | rally          | demand |
/// | DBD     | drop          | drop           | supply |
/// | RBD     | rally         | drop           | supply |
/// | DBR     | drop          | rally          | demand |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PatternVariant {
    #[serde(rename = "RBR", alias = "bullish")]
    RallyBaseRally,
    #[serde(rename = "DBD", alias = "bearish")]
    DropBaseDrop,
    #[serde(rename = "RBD", alias = "rbd")]
    RallyBaseDrop,
    #[serde(rename = "DBR", alias = "dbr")]
    DropBaseRally,
}

impl PatternVariant {
    pub const ALL: [PatternVariant; 4] = [
        PatternVariant::RallyBaseRally,
        PatternVariant::DropBaseDrop,
        PatternVariant::RallyBaseDrop,
        PatternVariant::DropBaseRally,
    ];

    /// Short code ("RBR", "DBD", "RBD", "DBR")
    pub fn code(self) -> &'static str {
        match self {
            PatternVariant::RallyBaseRally => "RBR",
            PatternVariant::DropBaseDrop => "DBD",
            PatternVariant::RallyBaseDrop => "RBD",
            PatternVariant::DropBaseRally => "DBR",
        }
    }

    pub fn kind(self) -> ZoneKind {
        match self {
            PatternVariant::RallyBaseRally | PatternVariant::DropBaseRally => ZoneKind::Demand,
            PatternVariant::DropBaseDrop | PatternVariant::RallyBaseDrop => ZoneKind::Supply,
        }
    }

    /// Direction of the impulse that precedes the bases
    pub fn first_impulse(self) -> Direction {
        match self {
            PatternVariant::RallyBaseRally | PatternVariant::RallyBaseDrop => Direction::Bullish,
            PatternVariant::DropBaseDrop | PatternVariant::DropBaseRally => Direction::Bearish,
        }
    }

    /// Direction of the impulse that follows the bases
    pub fn second_impulse(self) -> Direction {
        match self {
            PatternVariant::RallyBaseRally | PatternVariant::DropBaseRally => Direction::Bullish,
            PatternVariant::DropBaseDrop | PatternVariant::RallyBaseDrop => Direction::Bearish,
        }
    }

    /// True for the variants whose second impulse reverses the first
    pub fn is_reversal(self) -> bool {
        self.first_impulse() != self.second_impulse()
    }
}

impl fmt::Display for PatternVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PatternVariant {
    type Err = ZoneError;

    /// Accepts the short codes and the legacy direction names
    /// ("bullish", "bearish", "rbd", "dbr"), case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rbr" | "bullish" => Ok(PatternVariant::RallyBaseRally),
            "dbd" | "bearish" => Ok(PatternVariant::DropBaseDrop),
            "rbd" => Ok(PatternVariant::RallyBaseDrop),
            "dbr" => Ok(PatternVariant::DropBaseRally),
            _ => Err(ZoneError::InvalidConfig(format!(
                "unknown pattern variant '{s}'"
            ))),
        }
    }
}

// ============================================================
// ZONE - result of detection
// ============================================================

/// A detected supply or demand zone, bounded by its base candles
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Zone {
    pub pattern_type: PatternVariant,
    /// Timestamp of the first base candle
    pub anchor_date: Timestamp,
    pub zone_low: f64,
    pub zone_high: f64,
    pub base_count: usize,
    /// Index of the first base candle
    pub base_start_index: usize,
    /// Index of the second impulse candle
    pub continuation_index: usize,
}

impl Zone {
    #[inline]
    pub fn zone_height(&self) -> f64 {
        self.zone_high - self.zone_low
    }

    #[inline]
    pub fn kind(&self) -> ZoneKind {
        self.pattern_type.kind()
    }

    /// True if `price` lies in the zone widened by `tolerance` on both sides
    #[inline]
    pub fn contains(&self, price: f64, tolerance: f64) -> bool {
        price >= self.zone_low - tolerance && price <= self.zone_high + tolerance
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
    }

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::from_unix_seconds(1_704_067_200, ist(), o, h, l, c).unwrap()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_max_bases_validation() {
        assert!(MaxBases::new(1).is_ok());
        assert!(MaxBases::new(4).is_ok());
        assert!(matches!(
            MaxBases::new(0),
            Err(ZoneError::InvalidMaxBases { value: 0, max: 4 })
        ));
        assert!(MaxBases::new(5).is_err());
        assert_eq!(MaxBases::default().get(), 4);
    }

    #[test]
    fn test_max_bases_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<MaxBases>("2").is_ok());
        assert!(serde_json::from_str::<MaxBases>("7").is_err());
    }

    #[test]
    fn test_candle_geometry() {
        let c = bar(100.0, 111.0, 99.0, 110.0);
        assert_eq!(c.body(), 10.0);
        assert_eq!(c.range(), 12.0);
        assert_eq!(c.upper_wick(), 1.0);
        assert_eq!(c.lower_wick(), 1.0);
        assert_eq!(c.wick(), 2.0);
        assert!(c.is_bullish());
        assert!(!c.is_bearish());
        assert!((c.body_ratio() - 10.0 / 12.0).abs() < 1e-12);
        assert!((c.wick_ratio() - 2.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_candle_uses_epsilon_range() {
        let c = bar(100.0, 100.0, 100.0, 100.0);
        assert_eq!(c.range(), detectors::RANGE_EPSILON);
        assert_eq!(c.body_ratio(), 0.0);
        assert_eq!(c.wick_ratio(), 0.0);
        assert_eq!(c.direction(), Direction::Neutral);
    }

    #[test]
    fn test_validate_candles_reports_index() {
        let bars = vec![
            bar(100.0, 101.0, 99.0, 100.5),
            bar(100.0, 101.0, 99.0, 100.5),
            bar(100.0, 98.0, 99.0, 100.5),
        ];
        match validate_candles(&bars) {
            Err(ZoneError::MalformedCandle { index, reason }) => {
                assert_eq!(index, 2);
                assert_eq!(reason, "high < low");
            }
            other => panic!("expected MalformedCandle, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_open_outside_range() {
        assert!(bar(102.0, 101.0, 99.0, 100.0).validate().is_err());
        assert!(bar(100.0, 101.0, 99.0, 98.0).validate().is_err());
        assert!(bar(f64::NAN, 101.0, 99.0, 100.0).validate().is_err());
        assert!(bar(100.0, 101.0, 99.0, 100.0).validate().is_ok());
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!(
            "RBR".parse::<PatternVariant>().unwrap(),
            PatternVariant::RallyBaseRally
        );
        assert_eq!(
            "bearish".parse::<PatternVariant>().unwrap(),
            PatternVariant::DropBaseDrop
        );
        assert_eq!(
            " dbr ".parse::<PatternVariant>().unwrap(),
            PatternVariant::DropBaseRally
        );
        assert!("XYZ".parse::<PatternVariant>().is_err());
    }

    #[test]
    fn test_variant_geometry() {
        use PatternVariant::*;
        assert_eq!(RallyBaseRally.kind(), ZoneKind::Demand);
        assert_eq!(DropBaseRally.kind(), ZoneKind::Demand);
        assert_eq!(DropBaseDrop.kind(), ZoneKind::Supply);
        assert_eq!(RallyBaseDrop.kind(), ZoneKind::Supply);
        assert!(RallyBaseDrop.is_reversal());
        assert!(!DropBaseDrop.is_reversal());
        assert_eq!(ZoneKind::Supply.side(), SignalSide::Sell);
    }

    #[test]
    fn test_variant_serde_codes() {
        let json = serde_json::to_string(&PatternVariant::RallyBaseDrop).unwrap();
        assert_eq!(json, "\"RBD\"");
        let v: PatternVariant = serde_json::from_str("\"bullish\"").unwrap();
        assert_eq!(v, PatternVariant::RallyBaseRally);
    }

    #[test]
    fn test_zone_contains_with_tolerance() {
        let zone = Zone {
            pattern_type: PatternVariant::RallyBaseRally,
            anchor_date: bar(1.0, 1.0, 1.0, 1.0).timestamp,
            zone_low: 107.0,
            zone_high: 109.0,
            base_count: 1,
            base_start_index: 2,
            continuation_index: 3,
        };
        assert_eq!(zone.zone_height(), 2.0);
        assert!(zone.contains(107.0, 0.0));
        assert!(zone.contains(109.0, 0.0));
        assert!(!zone.contains(106.99995, 0.0));
        assert!(zone.contains(106.99995, 1e-4));
    }
}
