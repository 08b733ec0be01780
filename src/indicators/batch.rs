//! Whole-series moving averages
//!
//! Recomputes from scratch over a slice of closes. Used offline and to check the
//! incremental indicators against.

/// Simple moving average of the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Exponential moving average over the whole slice, seeded with the first `period` prices
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = calculate_sma(&prices[..period], period)?;

    Some(
        prices[period..]
            .iter()
            .fold(seed, |ema, price| price * multiplier + ema * (1.0 - multiplier)),
    )
}

/// MACD line, signal and histogram at the end of the slice
pub fn calculate_macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64, f64)> {
    let lines: Vec<f64> = (1..=prices.len())
        .filter_map(|end| {
            let window = &prices[..end];
            Some(calculate_ema(window, fast)? - calculate_ema(window, slow)?)
        })
        .collect();

    let line = *lines.last()?;
    let signal_value = calculate_ema(&lines, signal)?;
    Some((line, signal_value, line - signal_value))
}
