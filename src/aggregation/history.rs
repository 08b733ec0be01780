use std::collections::VecDeque;

use crate::models::Candle;

/// Rolling window of the most recent closed candles
///
/// Read by observers and by the backtest runner; the indicator engine keeps its
/// own accumulators and never replays this.
#[derive(Debug, Clone)]
pub struct CandleHistory {
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleHistory {
    /// Create a new history
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(max_candles: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(max_candles.min(4096)),
            max_candles: max_candles.max(1),
        }
    }

    /// Append a closed candle, dropping the oldest once full
    pub fn push(&mut self, candle: Candle) {
        self.candles.push_back(candle);

        while self.candles.len() > self.max_candles {
            self.candles.pop_front();
        }
    }

    /// The N most recent candles, oldest first
    pub fn recent(&self, n: usize) -> Vec<Candle> {
        let skip = self.candles.len().saturating_sub(n);
        self.candles.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn create_test_candle(price: i64) -> Candle {
        Candle::flat(Utc::now(), Duration::minutes(1), Decimal::new(price, 0))
    }

    #[test]
    fn test_new_history() {
        let history = CandleHistory::new(100);
        assert!(history.is_empty());
        assert!(history.last().is_none());
    }

    #[test]
    fn test_max_candles_limit() {
        let mut history = CandleHistory::new(5);

        for i in 0..10 {
            history.push(create_test_candle(100 + i));
        }

        assert_eq!(history.len(), 5);
        let candles = history.recent(5);
        assert_eq!(candles[0].close, Decimal::new(105, 0));
        assert_eq!(candles[4].close, Decimal::new(109, 0));
    }

    #[test]
    fn test_recent() {
        let mut history = CandleHistory::new(100);

        for i in 0..10 {
            history.push(create_test_candle(100 + i));
        }

        let recent = history.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].close, Decimal::new(107, 0));
        assert_eq!(recent[2].close, Decimal::new(109, 0));

        // asking for more than we have returns everything
        assert_eq!(history.recent(50).len(), 10);
    }

    #[test]
    fn test_clear() {
        let mut history = CandleHistory::new(10);
        history.push(create_test_candle(100));
        history.clear();
        assert!(history.is_empty());
    }
}
