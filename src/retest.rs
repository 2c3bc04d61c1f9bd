//! Retest scanning
//!
//! For each zone, the candles after the second impulse are walked in order.
//! Demand zones are probed with each candle's low, supply zones with its high.
//! The first probe inside the zone records the signal; a probe beyond the far
//! side of the zone invalidates it and ends the walk.

use rayon::prelude::*;
use tracing::trace;

use crate::{Result, SignalSide, Timestamp, Zone, ZoneError, ZoneKind, OHLC};

/// Suggested tolerance for feeds with rounding noise
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct RetestConfig {
    /// Widens both zone bounds for the touch and break comparisons
    pub tolerance: f64,
}

impl<'de> serde::Deserialize<'de> for RetestConfig {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            #[serde(default)]
            tolerance: f64,
        }

        let raw = Raw::deserialize(d)?;
        RetestConfig::with_tolerance(raw.tolerance).map_err(serde::de::Error::custom)
    }
}

impl RetestConfig {
    pub fn with_tolerance(tolerance: f64) -> Result<Self> {
        let config = Self { tolerance };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ZoneError::InvalidThreshold {
                field: "retest_tolerance",
                value: self.tolerance,
                range: "[0, inf)",
            });
        }
        Ok(())
    }
}

/// Where a zone stands after scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RetestStatus {
    /// Neither touched nor broken by the end of the series
    Pending,
    Signalled,
    Invalidated,
    SignalledThenInvalidated,
}

/// A zone with the outcome of its retest scan
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetestResult {
    #[serde(flatten)]
    pub zone: Zone,
    pub signal: bool,
    pub signal_price: Option<f64>,
    pub signal_date: Option<Timestamp>,
    pub invalidated: bool,
}

impl RetestResult {
    #[inline]
    pub fn side(&self) -> SignalSide {
        self.zone.kind().side()
    }

    pub fn status(&self) -> RetestStatus {
        match (self.signal, self.invalidated) {
            (false, false) => RetestStatus::Pending,
            (true, false) => RetestStatus::Signalled,
            (false, true) => RetestStatus::Invalidated,
            (true, true) => RetestStatus::SignalledThenInvalidated,
        }
    }
}

/// Scan the candles after `zone.continuation_index` for a touch or a break.
pub fn scan_zone<T: OHLC>(bars: &[T], zone: &Zone, config: &RetestConfig) -> RetestResult {
    let tol = config.tolerance;
    let kind = zone.kind();
    let mut signal: Option<(f64, Timestamp)> = None;
    let mut invalidated = false;

    for (index, bar) in bars.iter().enumerate().skip(zone.continuation_index + 1) {
        let probe = match kind {
            ZoneKind::Demand => bar.low(),
            ZoneKind::Supply => bar.high(),
        };

        if signal.is_none() && zone.contains(probe, tol) {
            trace!(index, price = probe, "zone touched");
            signal = Some((probe, bar.timestamp()));
        }

        let broken = match kind {
            ZoneKind::Demand => probe < zone.zone_low - tol,
            ZoneKind::Supply => probe > zone.zone_high + tol,
        };
        if broken {
            trace!(index, price = probe, "zone invalidated");
            invalidated = true;
            break;
        }
    }

    RetestResult {
        zone: *zone,
        signal: signal.is_some(),
        signal_price: signal.map(|(price, _)| price),
        signal_date: signal.map(|(_, date)| date),
        invalidated,
    }
}

/// Scan every zone with zero tolerance.
pub fn scan_retests<T: OHLC>(bars: &[T], zones: &[Zone]) -> Vec<RetestResult> {
    scan_retests_with(bars, zones, &RetestConfig::default())
}

pub fn scan_retests_with<T: OHLC>(
    bars: &[T],
    zones: &[Zone],
    config: &RetestConfig,
) -> Vec<RetestResult> {
    zones.iter().map(|z| scan_zone(bars, z, config)).collect()
}

/// Parallel variant of [`scan_retests_with`]. Output order matches `zones`.
pub fn scan_retests_par<T: OHLC + Sync>(
    bars: &[T],
    zones: &[Zone],
    config: &RetestConfig,
) -> Vec<RetestResult> {
    zones.par_iter().map(|z| scan_zone(bars, z, config)).collect()
}
