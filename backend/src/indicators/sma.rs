// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Unweighted mean of the trailing `period` prices:
//   SMA_i = (p_{i-period+1} + ... + p_i) / period
//
// Defined only once a full window is available (i >= period - 1).
// =============================================================================

/// Compute the SMA column for `prices`, one entry per input price.
///
/// Uses a rolling sum; every defined value equals the mean of its exact
/// trailing window.
///
/// # Edge cases
/// - `period == 0` => every entry is `None`
/// - `prices.len() < period` => every entry is `None`
pub fn sma_column(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    out[period - 1] = Some(window_sum / period as f64);

    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        out[i] = Some(window_sum / period as f64);
    }

    out
}
