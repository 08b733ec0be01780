use serde::{Deserialize, Serialize};

use super::{Ema, Indicator, IndicatorValue};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD: fast EMA minus slow EMA, with an EMA signal line over the difference
///
/// Yields nothing until the signal line itself is seeded.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    value: Option<MacdValue>,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            value: None,
        }
    }

    pub fn next(&mut self, close: f64) -> Option<MacdValue> {
        let fast = self.fast.next(close);
        let slow = self.slow.next(close);

        let (Some(fast), Some(slow)) = (fast, slow) else {
            return None;
        };

        let line = fast - slow;
        self.value = self.signal.next(line).map(|signal| MacdValue {
            line,
            signal,
            histogram: line - signal,
        });
        self.value
    }
}

impl Indicator for Macd {
    fn name(&self) -> String {
        format!(
            "MACD({},{},{})",
            self.fast.period(),
            self.slow.period(),
            self.signal.period()
        )
    }

    fn update(&mut self, close: f64) -> Option<IndicatorValue> {
        self.next(close).map(IndicatorValue::Macd)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.value.map(IndicatorValue::Macd)
    }

    fn warmup(&self) -> usize {
        self.fast.period().max(self.slow.period()) + self.signal.period() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_length() {
        let mut macd = Macd::new(2, 3, 2);
        assert_eq!(macd.warmup(), 4);

        let closes = [1.0, 2.0, 3.0, 4.0];
        let values: Vec<_> = closes.iter().map(|c| macd.next(*c)).collect();
        assert!(values[..3].iter().all(Option::is_none));
        assert!(values[3].is_some());
    }

    #[test]
    fn test_flat_prices_give_zero_macd() {
        let mut macd = Macd::new(12, 26, 9);
        let mut last = None;
        for _ in 0..60 {
            last = macd.next(250.0);
        }
        let value = last.unwrap();
        assert!(value.line.abs() < 1e-9);
        assert!(value.signal.abs() < 1e-9);
        assert!(value.histogram.abs() < 1e-9);
    }

    #[test]
    fn test_rising_prices_give_positive_line() {
        let mut macd = Macd::new(3, 6, 3);
        let mut last = None;
        for i in 0..30 {
            last = macd.next(100.0 + i as f64);
        }
        let value = last.unwrap();
        assert!(value.line > 0.0);
        assert!((value.histogram - (value.line - value.signal)).abs() < 1e-12);
    }
}
