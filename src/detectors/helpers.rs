//! Candle classification shared by the zone detector
//!
//! An impulse is a strong directional candle: big body, small wicks. A base is
//! the opposite, with the two thresholds swapped: small body, long wicks.

use crate::{CandleExt, Direction, Ratio, Result, ZoneError, OHLC};

// ============================================================
// THRESHOLDS
// ============================================================

/// Floor for the high-low range of a candle
pub const RANGE_EPSILON: f64 = 1e-9;

/// Impulse body must be at least this share of the range
pub const DEFAULT_BODY_THRESHOLD: f64 = 0.65;
/// Impulse wicks must be at most this share of the range
pub const DEFAULT_WICK_THRESHOLD: f64 = 0.35;

/// Body/wick thresholds used to classify impulses and bases
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Thresholds {
    /// Minimum body ratio of an impulse, in (0, 1]
    #[serde(rename = "body_threshold")]
    pub body: Ratio,
    /// Maximum wick ratio of an impulse, in [0, 1)
    #[serde(rename = "wick_threshold")]
    pub wick: Ratio,
}

fn default_body_threshold() -> f64 {
    DEFAULT_BODY_THRESHOLD
}

fn default_wick_threshold() -> f64 {
    DEFAULT_WICK_THRESHOLD
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            body: Ratio::new_const(DEFAULT_BODY_THRESHOLD),
            wick: Ratio::new_const(DEFAULT_WICK_THRESHOLD),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Thresholds {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            #[serde(default = "default_body_threshold")]
            body_threshold: f64,
            #[serde(default = "default_wick_threshold")]
            wick_threshold: f64,
        }

        let raw = Raw::deserialize(d)?;
        Thresholds::new(raw.body_threshold, raw.wick_threshold).map_err(serde::de::Error::custom)
    }
}

impl Thresholds {
    pub fn new(body_threshold: f64, wick_threshold: f64) -> Result<Self> {
        let thresholds = Self {
            body: Ratio::new(body_threshold).map_err(|_| ZoneError::InvalidThreshold {
                field: "body_threshold",
                value: body_threshold,
                range: "(0, 1]",
            })?,
            wick: Ratio::new(wick_threshold).map_err(|_| ZoneError::InvalidThreshold {
                field: "wick_threshold",
                value: wick_threshold,
                range: "[0, 1)",
            })?,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Slider semantics: "min body %" and "max wick %" as 0..=100.
    pub fn from_percent(min_body_pct: f64, max_wick_pct: f64) -> Result<Self> {
        Self::new(min_body_pct / 100.0, max_wick_pct / 100.0)
    }

    /// Enforce the open ends of the ranges that [`Ratio`] cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.body.get() <= 0.0 {
            return Err(ZoneError::InvalidThreshold {
                field: "body_threshold",
                value: self.body.get(),
                range: "(0, 1]",
            });
        }
        if self.wick.get() >= 1.0 {
            return Err(ZoneError::InvalidThreshold {
                field: "wick_threshold",
                value: self.wick.get(),
                range: "[0, 1)",
            });
        }
        Ok(())
    }

    #[inline]
    pub fn body_threshold(&self) -> f64 {
        self.body.get()
    }

    #[inline]
    pub fn wick_threshold(&self) -> f64 {
        self.wick.get()
    }
}

// ============================================================
// CLASSIFICATION
// ============================================================

/// Strong directional candle in `direction`.
///
/// `Direction::Neutral` never matches: a doji cannot be an impulse.
#[inline]
pub fn is_impulse<T: OHLC + ?Sized>(bar: &T, direction: Direction, t: &Thresholds) -> bool {
    direction != Direction::Neutral
        && bar.direction() == direction
        && bar.body_ratio() >= t.body_threshold()
        && bar.wick_ratio() <= t.wick_threshold()
}

/// Small consolidating candle, direction ignored
#[inline]
pub fn is_base<T: OHLC + ?Sized>(bar: &T, t: &Thresholds) -> bool {
    bar.body_ratio() <= t.wick_threshold() && bar.wick_ratio() >= t.body_threshold()
}

/// Number of consecutive base candles starting at `start`, capped at `max`.
#[inline]
pub fn count_bases<T: OHLC>(bars: &[T], start: usize, max: usize, t: &Thresholds) -> usize {
    bars.iter()
        .skip(start)
        .take(max)
        .take_while(|bar| is_base(*bar, t))
        .count()
}

// ============================================================
// ZONE BOUNDS
// ============================================================

/// Demand zone: highest body top down to the lowest low of the bases.
/// Returns `(low, high)`.
pub fn demand_bounds<T: OHLC>(bases: &[T]) -> (f64, f64) {
    bases.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
        (lo.min(b.low()), hi.max(b.open().max(b.close())))
    })
}

/// Supply zone: highest high down to the lowest body bottom of the bases.
/// Returns `(low, high)`.
pub fn supply_bounds<T: OHLC>(bases: &[T]) -> (f64, f64) {
    bases.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
        (lo.min(b.open().min(b.close())), hi.max(b.high()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;
    use chrono::FixedOffset;

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Candle {
        let utc = FixedOffset::east_opt(0).unwrap();
        Candle::from_unix_seconds(0, utc, o, h, l, c).unwrap()
    }

    #[test]
    fn test_thresholds_ranges() {
        assert!(Thresholds::new(0.65, 0.35).is_ok());
        assert!(Thresholds::new(1.0, 0.0).is_ok());
        assert!(matches!(
            Thresholds::new(0.0, 0.35),
            Err(ZoneError::InvalidThreshold { field: "body_threshold", .. })
        ));
        assert!(matches!(
            Thresholds::new(0.65, 1.0),
            Err(ZoneError::InvalidThreshold { field: "wick_threshold", .. })
        ));
        assert!(Thresholds::new(1.2, 0.35).is_err());
        assert!(Thresholds::new(0.65, -0.1).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let t: Thresholds =
            serde_json::from_str(r#"{"body_threshold": 0.7, "wick_threshold": 0.3}"#).unwrap();
        assert!((t.body_threshold() - 0.7).abs() < 1e-12);
        assert_eq!(serde_json::from_str::<Thresholds>("{}").unwrap(), Thresholds::default());

        assert!(serde_json::from_str::<Thresholds>(r#"{"body_threshold": 0.0}"#).is_err());
        assert!(serde_json::from_str::<Thresholds>(r#"{"wick_threshold": 1.0}"#).is_err());
        assert!(serde_json::from_str::<Thresholds>(r#"{"body_threshold": 1.5}"#).is_err());
    }

    #[test]
    fn test_from_percent() {
        let t = Thresholds::from_percent(70.0, 30.0).unwrap();
        assert!((t.body_threshold() - 0.7).abs() < 1e-12);
        assert!((t.wick_threshold() - 0.3).abs() < 1e-12);
        assert!(Thresholds::from_percent(0.0, 30.0).is_err());
    }

    #[test]
    fn test_bullish_impulse() {
        let t = Thresholds::default();
        let c = bar(100.0, 111.0, 99.0, 110.0);
        assert!(is_impulse(&c, Direction::Bullish, &t));
        assert!(!is_impulse(&c, Direction::Bearish, &t));
        assert!(!is_impulse(&c, Direction::Neutral, &t));
        assert!(!is_base(&c, &t));
    }

    #[test]
    fn test_base_candle() {
        let t = Thresholds::default();
        let c = bar(109.0, 110.0, 107.0, 108.0);
        assert!(is_base(&c, &t));
        assert!(!is_impulse(&c, Direction::Bearish, &t));
    }

    #[test]
    fn test_flat_candle_is_neither() {
        let t = Thresholds::default();
        let c = bar(100.0, 100.0, 100.0, 100.0);
        assert!(!is_impulse(&c, Direction::Bullish, &t));
        assert!(!is_base(&c, &t));
    }

    #[test]
    fn test_count_bases_stops_at_max_and_at_non_base() {
        let t = Thresholds::default();
        let base = bar(109.0, 110.0, 107.0, 108.0);
        let impulse = bar(108.0, 119.0, 107.0, 118.0);
        let bars = vec![impulse, base, base, base, impulse];
        assert_eq!(count_bases(&bars, 1, 4, &t), 3);
        assert_eq!(count_bases(&bars, 1, 2, &t), 2);
        assert_eq!(count_bases(&bars, 4, 4, &t), 0);
        assert_eq!(count_bases(&bars, 9, 4, &t), 0);
    }

    #[test]
    fn test_bounds() {
        let bases = vec![bar(109.0, 110.0, 107.0, 108.0), bar(108.0, 109.5, 107.5, 108.5)];
        assert_eq!(demand_bounds(&bases), (107.0, 109.0));
        assert_eq!(supply_bounds(&bases), (108.0, 110.0));
    }
}
