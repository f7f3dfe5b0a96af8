// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   k     = 2 / (period + 1)
//   EMA_0 = price_0
//   EMA_i = price_i * k + EMA_{i-1} * (1 - k)
//
// The recurrence runs from the first sample, but values are only reported
// from index `period` onward: before that the average has not absorbed
// `period` samples and is hidden from the chart.
// =============================================================================

/// Compute the EMA column for `prices`, one entry per input price.
///
/// # Edge cases
/// - `period == 0` => every entry is `None`
/// - `prices.len() <= period` => every entry is `None`
pub fn ema_column(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.is_empty() {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);

    let mut prev = prices[0];
    for (i, &price) in prices.iter().enumerate().skip(1) {
        prev = price * k + prev * (1.0 - k);
        if i >= period {
            out[i] = Some(prev);
        }
    }

    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(ema_column(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(ema_column(&[1.0, 2.0, 3.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn ema_length_equal_to_period_is_all_absent() {
        let col = ema_column(&[1.0, 2.0, 3.0], 3);
        assert_eq!(col.len(), 3);
        assert!(col.iter().all(Option::is_none));
    }

    #[test]
    fn ema_known_values() {
        // period 3 => k = 0.5, seeded with the first price.
        let prices = [2.0, 4.0, 6.0, 8.0, 10.0];
        let col = ema_column(&prices, 3);

        let k = 0.5;
        let mut expected = prices[0];
        let mut expected_col = vec![None];
        for (i, &p) in prices.iter().enumerate().skip(1) {
            expected = p * k + expected * (1.0 - k);
            expected_col.push(if i >= 3 { Some(expected) } else { None });
        }

        assert_eq!(col.len(), expected_col.len());
        for (a, b) in col.iter().zip(expected_col.iter()) {
            match (a, b) {
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-10, "got {a}, expected {b}"),
                (None, None) => {}
                other => panic!("definedness mismatch: {other:?}"),
            }
        }
        // 2 -> 3 -> 4.5 -> 6.25 ; index 3 = 6.25, index 4 = 8.125
        assert!((col[3].unwrap() - 6.25).abs() < 1e-10);
        assert!((col[4].unwrap() - 8.125).abs() < 1e-10);
    }

    #[test]
    fn ema_constant_series_is_constant() {
        let prices = vec![42.0; 30];
        let col = ema_column(&prices, 12);
        for v in col.iter().flatten() {
            assert!((v - 42.0).abs() < 1e-9);
        }
        assert!(col[12].is_some());
        assert!(col[11].is_none());
    }

    #[test]
    fn ema_tracks_rising_series_from_below() {
        let prices: Vec<f64> = (1..=50).map(|x| x as f64).collect();
        let col = ema_column(&prices, 10);
        let last = col.last().copied().flatten().unwrap();
        assert!(last < 50.0);
        assert!(last > 40.0);
    }
}
