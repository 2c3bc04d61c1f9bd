//! Parameter metadata for zone detection
//!
//! This module describes the tunable detection parameters, enabling:
//! - Grid search over thresholds and base counts
//! - Parameter documentation
//! - Building configs from loosely typed key/value input (UI sliders, query strings)
//!
//! # Example
//!
//! ```rust
//! use sdzones::params::Parameterized;
//! use sdzones::prelude::*;
//!
//! for param in ZoneConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::analysis::ZoneConfig;
use crate::detectors::{Thresholds, DEFAULT_BODY_THRESHOLD, DEFAULT_WICK_THRESHOLD};
use crate::{MaxBases, Ratio, Result, ZoneError};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Count value (positive integer)
  Count,
}

/// Metadata for a single detection parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "body_threshold")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  /// Generate all values for grid search, `min + k * step` up to `max`
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 || max < min {
      return vec![min];
    }
    let steps = ((max - min) / step + 1e-9).floor() as usize;
    (0..=steps).map(|k| min + k as f64 * step).collect()
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    match self.param_type {
      ParamType::Ratio => {
        if value.is_nan() || value < min || value > max {
          return Err(ZoneError::InvalidThreshold { field: self.name, value, range: "grid range" });
        }
        Ok(())
      },
      ParamType::Count => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(ZoneError::InvalidValue("Count must be a positive integer"));
        }
        if value < min || value > max {
          return Err(ZoneError::InvalidConfig(format!(
            "{} = {} out of range [{}, {}]",
            self.name, value, min, max
          )));
        }
        Ok(())
      },
    }
  }
}

/// Tunable parameters of [`ZoneConfig`]
pub static ZONE_PARAMS: [ParamMeta; 3] = [
  ParamMeta::ratio(
    "body_threshold",
    DEFAULT_BODY_THRESHOLD,
    (0.5, 0.9, 0.05),
    "Minimum body share of the range for an impulse candle",
  ),
  ParamMeta::ratio(
    "wick_threshold",
    DEFAULT_WICK_THRESHOLD,
    (0.1, 0.5, 0.05),
    "Maximum wick share of the range for an impulse candle",
  ),
  ParamMeta::count(
    "max_bases",
    MaxBases::MAX as f64,
    (1.0, MaxBases::MAX as f64, 1.0),
    "Maximum number of base candles between the impulses",
  ),
];

// ============================================================
// PARAMETERIZED TRAIT
// ============================================================

/// Configs that can be rebuilt from key/value parameters
pub trait Parameterized: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Copy of `self` with the given parameters replaced.
  ///
  /// Missing keys keep their current values; unknown keys are an error.
  fn with_params(&self, params: &HashMap<&str, f64>) -> Result<Self>;

  /// Every combination of the parameter grids, applied to `self`
  fn grid(&self) -> Result<Vec<Self>> {
    let mut combos: Vec<HashMap<&str, f64>> = vec![HashMap::new()];
    for meta in Self::param_meta() {
      let values = meta.generate_grid();
      combos = combos
        .into_iter()
        .flat_map(|combo| {
          values.iter().map(move |&v| {
            let mut next = combo.clone();
            next.insert(meta.name, v);
            next
          })
        })
        .collect();
    }
    combos.iter().map(|p| self.with_params(p)).collect()
  }
}

impl Parameterized for ZoneConfig {
  fn param_meta() -> &'static [ParamMeta] {
    &ZONE_PARAMS
  }

  fn with_params(&self, params: &HashMap<&str, f64>) -> Result<Self> {
    if let Some(key) = params.keys().find(|k| !ZONE_PARAMS.iter().any(|m| m.name == **k)) {
      return Err(ZoneError::InvalidConfig(format!("unknown parameter '{key}'")));
    }

    let body = get_ratio(params, "body_threshold", self.thresholds.body_threshold())?;
    let wick = get_ratio(params, "wick_threshold", self.thresholds.wick_threshold())?;
    let max_bases = get_count(params, "max_bases", self.max_bases.get())?;

    let config = ZoneConfig {
      thresholds: Thresholds::new(body.get(), wick.get())?,
      max_bases: MaxBases::new(max_bases)?,
      ..*self
    };
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a positive integer from params with default fallback
pub fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<usize> {
  match params.get(key).copied() {
    None => Ok(default),
    Some(v) if v >= 0.0 && v.fract() == 0.0 && v.is_finite() => Ok(v as usize),
    Some(_) => Err(ZoneError::InvalidValue("Count must be a non-negative integer")),
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;
  use crate::PatternVariant;

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("test_ratio", 0.5, (0.3, 0.7, 0.1), "Test ratio parameter");

    assert_eq!(meta.name, "test_ratio");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, 0.5);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < 1e-12);
    assert!((grid[1] - 0.5).abs() < 1e-12);
    assert!((grid[2] - 0.7).abs() < 1e-12);
  }

  #[test]
  fn test_zone_param_grids() {
    assert_eq!(ZONE_PARAMS[0].generate_grid().len(), 9);
    assert_eq!(ZONE_PARAMS[1].generate_grid().len(), 9);
    assert_eq!(ZONE_PARAMS[2].generate_grid(), vec![1.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  fn test_validate() {
    assert!(ZONE_PARAMS[0].validate(0.65).is_ok());
    assert!(ZONE_PARAMS[0].validate(0.95).is_err());
    assert!(ZONE_PARAMS[2].validate(2.0).is_ok());
    assert!(ZONE_PARAMS[2].validate(2.5).is_err());
    assert!(ZONE_PARAMS[2].validate(5.0).is_err());
  }

  #[test]
  fn test_with_params_overrides_and_keeps() {
    let base = ZoneConfig { variant: PatternVariant::DropBaseRally, ..ZoneConfig::default() };
    let mut params = HashMap::new();
    params.insert("body_threshold", 0.7);
    params.insert("max_bases", 2.0);

    let cfg = base.with_params(&params).unwrap();
    assert_eq!(cfg.variant, PatternVariant::DropBaseRally);
    assert!((cfg.thresholds.body_threshold() - 0.7).abs() < 1e-12);
    assert!((cfg.thresholds.wick_threshold() - DEFAULT_WICK_THRESHOLD).abs() < 1e-12);
    assert_eq!(cfg.max_bases.get(), 2);
  }

  #[test]
  fn test_with_params_rejects_bad_input() {
    let base = ZoneConfig::default();

    let mut unknown = HashMap::new();
    unknown.insert("shadow_ratio", 0.5);
    assert!(base.with_params(&unknown).is_err());

    let mut bad_bases = HashMap::new();
    bad_bases.insert("max_bases", 0.0);
    assert!(base.with_params(&bad_bases).is_err());

    let mut bad_wick = HashMap::new();
    bad_wick.insert("wick_threshold", 1.0);
    assert!(base.with_params(&bad_wick).is_err());
  }

  #[test]
  fn test_full_grid() {
    let grid = ZoneConfig::default().grid().unwrap();
    assert_eq!(grid.len(), 9 * 9 * 4);
    assert!(grid.iter().all(|c| c.variant == PatternVariant::RallyBaseRally));
  }

  #[test]
  fn test_get_helpers() {
    let mut params = HashMap::new();
    params.insert("key1", 0.8);
    params.insert("n", 3.0);

    assert!((get_ratio(&params, "key1", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "key2", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    assert_eq!(get_count(&params, "n", 4).unwrap(), 3);
    assert_eq!(get_count(&params, "m", 4).unwrap(), 4);
  }
}
