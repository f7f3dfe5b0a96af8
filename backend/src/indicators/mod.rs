// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free moving averages over an ordered price series.  Each
// column reports `None` wherever the indicator has not yet absorbed enough
// samples, so the chart never draws a half-formed average.

pub mod ema;
pub mod series;
pub mod sma;

pub use series::{compute_series, IndicatorPeriods, IndicatorPoint};
