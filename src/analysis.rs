//! Analysis orchestration
//!
//! [`ZoneAnalyzer`] runs detection then retest scanning over one candle series.
//! Fetching is delegated to a [`CandleSource`]; credentials, symbol lookup and
//! transport live behind that trait.

use std::collections::HashMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::detectors::{Thresholds, ZoneDetector, DEFAULT_BODY_THRESHOLD, DEFAULT_WICK_THRESHOLD};
use crate::retest::{scan_retests_par, scan_retests_with, RetestConfig, RetestResult};
use crate::{validate_candles, Candle, MaxBases, PatternVariant, Result, Zone, ZoneError, OHLC};

// ============================================================
// CANDLE SOURCE
// ============================================================

/// Failure reported by a candle source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("Network error fetching {security_id}: {message}")]
    Network { security_id: String, message: String },

    #[error("API error {status} for {security_id}: {body}")]
    Api {
        security_id: String,
        status: u16,
        body: String,
    },
}

/// Provider of daily candles for a security.
///
/// Implementations return candles in chronological order and an empty vector
/// when the range has no data.
pub trait CandleSource: Send + Sync {
    fn fetch_candles(
        &self,
        security_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> std::result::Result<Vec<Candle>, SourceError>;
}

/// Candle source backed by preloaded series
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    series: HashMap<String, Vec<Candle>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, security_id: impl Into<String>, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        self.series.insert(security_id.into(), candles);
    }

    pub fn with_series(mut self, security_id: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.insert(security_id, candles);
        self
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl CandleSource for InMemorySource {
    /// Candles whose local date falls in `from..=to`; unknown ids have no data.
    fn fetch_candles(
        &self,
        security_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> std::result::Result<Vec<Candle>, SourceError> {
        let Some(candles) = self.series.get(security_id) else {
            return Ok(Vec::new());
        };
        Ok(candles
            .iter()
            .filter(|c| (from..=to).contains(&c.timestamp.date_naive()))
            .copied()
            .collect())
    }
}

// ============================================================
// CONFIG
// ============================================================

/// Full analysis configuration
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoneConfig {
    pub variant: PatternVariant,
    #[serde(default)]
    pub max_bases: MaxBases,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub retest: RetestConfig,
    /// Scan zones on the rayon pool instead of the calling thread
    #[serde(default)]
    pub parallel_retests: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            variant: PatternVariant::RallyBaseRally,
            max_bases: MaxBases::default(),
            thresholds: Thresholds::default(),
            retest: RetestConfig::default(),
            parallel_retests: false,
        }
    }
}

impl ZoneConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.retest.validate()
    }

    pub fn detector(&self) -> ZoneDetector {
        ZoneDetector::new(self.variant)
            .with_max_bases(self.max_bases)
            .with_thresholds(self.thresholds)
    }
}

// ============================================================
// ANALYZER
// ============================================================

/// One analyzed security: the series and its annotated zones
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Analysis {
    pub security_id: String,
    pub candles: Vec<Candle>,
    pub results: Vec<RetestResult>,
}

impl Analysis {
    pub fn into_parts(self) -> (Vec<Candle>, Vec<RetestResult>) {
        (self.candles, self.results)
    }
}

/// Validated detector + scanner pipeline
#[derive(Debug, Clone)]
pub struct ZoneAnalyzer {
    config: ZoneConfig,
    detector: ZoneDetector,
}

impl ZoneAnalyzer {
    pub fn new(config: ZoneConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector: config.detector(),
            config,
        })
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    /// Validate candles and detect zones.
    pub fn detect<T: OHLC>(&self, bars: &[T]) -> Result<Vec<Zone>> {
        validate_candles(bars)?;
        Ok(self.detector.detect(bars))
    }

    /// Retest-scan already detected zones.
    pub fn scan<T: OHLC + Sync>(&self, bars: &[T], zones: &[Zone]) -> Vec<RetestResult> {
        if self.config.parallel_retests {
            scan_retests_par(bars, zones, &self.config.retest)
        } else {
            scan_retests_with(bars, zones, &self.config.retest)
        }
    }

    /// Detect and scan one series. No candles or no zones give an empty result.
    pub fn run<T: OHLC + Sync>(&self, bars: &[T]) -> Result<Vec<RetestResult>> {
        if bars.is_empty() {
            return Ok(Vec::new());
        }

        let zones = self.detect(bars)?;
        if zones.is_empty() {
            debug!(variant = %self.config.variant, bars = bars.len(), "no zones detected");
            return Ok(Vec::new());
        }

        let results = self.scan(bars, &zones);
        debug!(
            variant = %self.config.variant,
            bars = bars.len(),
            zones = zones.len(),
            signals = results.iter().filter(|r| r.signal).count(),
            invalidated = results.iter().filter(|r| r.invalidated).count(),
            "analysis complete"
        );
        Ok(results)
    }

    /// Fetch one security from `source` and analyze it.
    pub fn analyze<S: CandleSource + ?Sized>(
        &self,
        source: &S,
        security_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Analysis> {
        let candles = source.fetch_candles(security_id, from, to)?;
        let results = self.run(&candles)?;
        Ok(Analysis {
            security_id: security_id.to_string(),
            candles,
            results,
        })
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`ZoneAnalyzer`]. Values are validated in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct AnalyzerBuilder {
    variant: PatternVariant,
    max_bases: usize,
    body_threshold: f64,
    wick_threshold: f64,
    tolerance: f64,
    parallel_retests: bool,
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self {
            variant: PatternVariant::RallyBaseRally,
            max_bases: MaxBases::MAX,
            body_threshold: DEFAULT_BODY_THRESHOLD,
            wick_threshold: DEFAULT_WICK_THRESHOLD,
            tolerance: 0.0,
            parallel_retests: false,
        }
    }

    pub fn variant(mut self, variant: PatternVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn max_bases(mut self, max_bases: usize) -> Self {
        self.max_bases = max_bases;
        self
    }

    pub fn body_threshold(mut self, ratio: f64) -> Self {
        self.body_threshold = ratio;
        self
    }

    pub fn wick_threshold(mut self, ratio: f64) -> Self {
        self.wick_threshold = ratio;
        self
    }

    /// "Min body %" / "max wick %" as 0..=100
    pub fn thresholds_percent(mut self, min_body_pct: f64, max_wick_pct: f64) -> Self {
        self.body_threshold = min_body_pct / 100.0;
        self.wick_threshold = max_wick_pct / 100.0;
        self
    }

    pub fn retest_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn parallel_retests(mut self, enable: bool) -> Self {
        self.parallel_retests = enable;
        self
    }

    pub fn build(self) -> Result<ZoneAnalyzer> {
        ZoneAnalyzer::new(ZoneConfig {
            variant: self.variant,
            max_bases: MaxBases::new(self.max_bases)?,
            thresholds: Thresholds::new(self.body_threshold, self.wick_threshold)?,
            retest: RetestConfig::with_tolerance(self.tolerance)?,
            parallel_retests: self.parallel_retests,
        })
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

/// Failure analyzing a single security
#[derive(Debug, Clone, thiserror::Error)]
#[error("{security_id}: {error}")]
pub struct AnalysisError {
    pub security_id: String,
    pub error: ZoneError,
}

/// Analyze many securities in parallel.
///
/// Securities whose source returns no candles are reported with
/// [`ZoneError::EmptyInput`]. Successes keep the order of `security_ids`.
pub fn analyze_parallel<S: CandleSource + ?Sized>(
    analyzer: &ZoneAnalyzer,
    source: &S,
    security_ids: &[&str],
    from: NaiveDate,
    to: NaiveDate,
) -> (Vec<Analysis>, Vec<AnalysisError>) {
    let outcomes: Vec<_> = security_ids
        .par_iter()
        .map(|&security_id| {
            analyzer
                .analyze(source, security_id, from, to)
                .and_then(|analysis| {
                    if analysis.candles.is_empty() {
                        Err(ZoneError::EmptyInput)
                    } else {
                        Ok(analysis)
                    }
                })
                .map_err(|error| AnalysisError {
                    security_id: security_id.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for outcome in outcomes {
        match outcome {
            Ok(a) => successes.push(a),
            Err(e) => {
                warn!(security_id = %e.security_id, error = %e.error, "security skipped");
                errors.push(e);
            }
        }
    }

    (successes, errors)
}
