// =============================================================================
// Indicator Series — price history merged with its moving averages
// =============================================================================
//
// The detail chart plots price, SMA and EMA on the same x-axis, so the output
// is one row per input PricePoint.  Everything is recomputed from scratch on
// every call; nothing is cached between requests.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators::ema::ema_column;
use crate::indicators::sma::sma_column;
use crate::types::PricePoint;

/// Look-back periods for the two overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPeriods {
    pub sma: usize,
    pub ema: usize,
}

/// One chart row: the original sample plus whichever averages are defined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub sma: Option<f64>,
    pub ema: Option<f64>,
}

/// Build the indicator series for `points`, which must already be sorted by
/// ascending timestamp.
pub fn compute_series(points: &[PricePoint], periods: IndicatorPeriods) -> Vec<IndicatorPoint> {
    let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
    let sma = sma_column(&prices, periods.sma);
    let ema = ema_column(&prices, periods.ema);

    points
        .iter()
        .zip(sma)
        .zip(ema)
        .map(|((point, sma), ema)| IndicatorPoint {
            timestamp: point.timestamp,
            price: point.price,
            sma,
            ema,
        })
        .collect()
}
