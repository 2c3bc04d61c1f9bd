//! Candle classification and zone detection
//!
//! - **helpers**: impulse/base classification, thresholds, zone bound formulas
//! - **base_pattern**: the impulse–base(s)–impulse sweep for all four variants

pub mod helpers;

pub mod base_pattern;

// Re-export for convenience
pub use base_pattern::*;
pub use helpers::*;
