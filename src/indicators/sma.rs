use std::collections::VecDeque;

use super::{Indicator, IndicatorValue};

/// Updates between exact recomputations of the running sum
const RESUM_EVERY: u32 = 1024;

/// Simple moving average over a fixed window
///
/// Keeps a running sum so each update is O(1) regardless of period. The sum is
/// rebuilt from the window every [`RESUM_EVERY`] updates so rounding error from
/// adding and subtracting cannot accumulate over a long stream.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
    since_resum: u32,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
            since_resum: 0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Push a close and return the average once the window is full
    pub fn next(&mut self, close: f64) -> Option<f64> {
        self.window.push_back(close);
        self.sum += close;

        if self.window.len() > self.period {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }

        self.since_resum += 1;
        if self.since_resum >= RESUM_EVERY {
            self.sum = self.window.iter().sum();
            self.since_resum = 0;
        }

        self.current()
    }

    pub fn current(&self) -> Option<f64> {
        if self.window.len() == self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> String {
        format!("SMA({})", self.period)
    }

    fn update(&mut self, close: f64) -> Option<IndicatorValue> {
        self.next(close).map(IndicatorValue::Scalar)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.current().map(IndicatorValue::Scalar)
    }

    fn warmup(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_window() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.next(1.0), None);
        assert_eq!(sma.next(2.0), None);
        assert_eq!(sma.next(3.0), Some(2.0));
        assert_eq!(sma.next(4.0), Some(3.0));
        assert_eq!(sma.next(8.0), Some(5.0));
    }

    #[test]
    fn test_running_sum_recovers_from_rounding() {
        let mut sma = Sma::new(2);
        // 1e17 + 1.0 loses the 1.0; subtracting 1e17 later leaves the sum short
        sma.next(1e17);
        for _ in 0..4 {
            sma.next(1.0);
        }
        assert_ne!(sma.current(), Some(1.0));

        for _ in 0..RESUM_EVERY {
            sma.next(1.0);
        }
        assert_eq!(sma.current(), Some(1.0));
    }

    #[test]
    fn test_period_one_tracks_close() {
        let mut sma = Sma::new(1);
        assert_eq!(sma.next(42.0), Some(42.0));
        assert_eq!(sma.next(7.0), Some(7.0));
    }

    #[test]
    fn test_indicator_value() {
        let mut sma = Sma::new(2);
        assert!(sma.value().is_none());
        sma.update(10.0);
        sma.update(20.0);
        assert_eq!(sma.value(), Some(IndicatorValue::Scalar(15.0)));
        assert_eq!(sma.name(), "SMA(2)");
    }
}
