use super::{Indicator, IndicatorValue, Sma};

/// Exponential moving average, seeded with the SMA of the first `period` closes
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    k: f64,
    seed: Sma,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seed: Sma::new(period),
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn next(&mut self, close: f64) -> Option<f64> {
        self.value = match self.value {
            Some(prev) => Some(close * self.k + prev * (1.0 - self.k)),
            None => self.seed.next(close),
        };
        self.value
    }

    pub fn current(&self) -> Option<f64> {
        self.value
    }
}

impl Indicator for Ema {
    fn name(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn update(&mut self, close: f64) -> Option<IndicatorValue> {
        self.next(close).map(IndicatorValue::Scalar)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.value.map(IndicatorValue::Scalar)
    }

    fn warmup(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_by_sma() {
        let mut ema = Ema::new(3);
        assert_eq!(ema.next(2.0), None);
        assert_eq!(ema.next(4.0), None);
        assert_eq!(ema.next(6.0), Some(4.0));

        // k = 0.5
        assert_eq!(ema.next(10.0), Some(7.0));
        assert_eq!(ema.next(1.0), Some(4.0));
    }

    #[test]
    fn test_ema_reacts_faster_than_sma() {
        let mut ema = Ema::new(5);
        let mut sma = Sma::new(5);
        for close in [100.0, 100.0, 100.0, 100.0, 100.0, 110.0] {
            ema.next(close);
            sma.next(close);
        }
        assert!(ema.current().unwrap() > sma.current().unwrap());
    }
}
