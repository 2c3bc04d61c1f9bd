//! Impulse–base–impulse zone detector (RBR, DBD, RBD, DBR)
//!
//! One left-to-right sweep. At each index the candle is tested as the first
//! impulse, up to `max_bases` bases are collected greedily, and the candle right
//! after them is tested as the second impulse. A match emits a [`Zone`] and the
//! sweep resumes after the second impulse, so zones never share candles.

use tracing::trace;

use super::helpers::{count_bases, demand_bounds, is_impulse, supply_bounds, Thresholds};
use crate::{
    validate_candles, Direction, MaxBases, PatternVariant, Result, Zone, ZoneKind, OHLC,
};

/// Shortest slice that can hold impulse, base, impulse
pub const MIN_PATTERN_BARS: usize = 3;

// ============================================================
// DETECTOR
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneDetector {
    pub variant: PatternVariant,
    pub max_bases: MaxBases,
    pub thresholds: Thresholds,
}

impl ZoneDetector {
    pub fn new(variant: PatternVariant) -> Self {
        Self {
            variant,
            max_bases: MaxBases::default(),
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_max_bases(mut self, max_bases: MaxBases) -> Self {
        self.max_bases = max_bases;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Sweep the whole series and return zones in order of their first base.
    pub fn detect<T: OHLC>(&self, bars: &[T]) -> Vec<Zone> {
        let mut zones = Vec::new();
        let mut i = 0;

        while i + MIN_PATTERN_BARS <= bars.len() {
            match self.detect_at(bars, i) {
                Some(zone) => {
                    trace!(
                        variant = %self.variant,
                        base_start = zone.base_start_index,
                        continuation = zone.continuation_index,
                        zone_low = zone.zone_low,
                        zone_high = zone.zone_high,
                        "zone detected"
                    );
                    i = zone.continuation_index + 1;
                    zones.push(zone);
                }
                None => i += 1,
            }
        }

        zones
    }

    /// Try to build a zone whose first impulse is the candle at `index`.
    pub fn detect_at<T: OHLC>(&self, bars: &[T], index: usize) -> Option<Zone> {
        let t = &self.thresholds;
        let first = bars.get(index)?;
        if !is_impulse(first, self.variant.first_impulse(), t) {
            return None;
        }

        let base_start = index + 1;
        let base_count = count_bases(bars, base_start, self.max_bases.get(), t);
        if base_count == 0 {
            return None;
        }

        let continuation_index = base_start + base_count;
        let second = bars.get(continuation_index)?;
        if !is_impulse(second, self.variant.second_impulse(), t) {
            return None;
        }
        if !reversal_confirmed(self.variant, first, second) {
            return None;
        }

        let bases = &bars[base_start..continuation_index];
        let (zone_low, zone_high) = match self.variant.kind() {
            ZoneKind::Demand => demand_bounds(bases),
            ZoneKind::Supply => supply_bounds(bases),
        };

        Some(Zone {
            pattern_type: self.variant,
            anchor_date: bases[0].timestamp(),
            zone_low,
            zone_high,
            base_count,
            base_start_index: base_start,
            continuation_index,
        })
    }
}

/// Reversals must close beyond the first impulse: RBD below its low,
/// DBR above its high.
#[inline]
fn reversal_confirmed<T: OHLC>(variant: PatternVariant, first: &T, second: &T) -> bool {
    if !variant.is_reversal() {
        return true;
    }
    match variant.second_impulse() {
        Direction::Bearish => second.close() < first.low(),
        _ => second.close() > first.high(),
    }
}

/// Validate parameters and candles, then detect zones.
///
/// An empty series yields no zones.
pub fn detect_zones<T: OHLC>(
    bars: &[T],
    variant: PatternVariant,
    max_bases: usize,
    body_threshold: f64,
    wick_threshold: f64,
) -> Result<Vec<Zone>> {
    let detector = ZoneDetector::new(variant)
        .with_max_bases(MaxBases::new(max_bases)?)
        .with_thresholds(Thresholds::new(body_threshold, wick_threshold)?);
    validate_candles(bars)?;
    Ok(detector.detect(bars))
}
