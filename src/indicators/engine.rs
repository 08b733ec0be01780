use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Ema, Indicator, IndicatorValue, Macd, Sma};
use crate::config::AverageKind;
use crate::error::IntegrityError;
use crate::models::Candle;

pub const FAST: &str = "fast";
pub const SLOW: &str = "slow";
pub const MACD: &str = "macd";

/// Indicator values after one candle close
///
/// Indicators still warming up are absent from `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub close: Decimal,
    pub values: BTreeMap<String, IndicatorValue>,
}

impl IndicatorSnapshot {
    pub fn get(&self, key: &str) -> Option<&IndicatorValue> {
        self.values.get(key)
    }

    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(IndicatorValue::as_scalar)
    }
}

struct Registered {
    key: String,
    indicator: Box<dyn Indicator>,
}

/// Feeds closed candles to every registered indicator, in order
pub struct IndicatorEngine {
    indicators: Vec<Registered>,
    last_close_time: Option<DateTime<Utc>>,
    candles_seen: u64,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self {
            indicators: Vec::new(),
            last_close_time: None,
            candles_seen: 0,
        }
    }

    /// Engine with the fast/slow averages and MACD the crossover strategy reads
    pub fn for_crossover(kind: AverageKind, fast: usize, slow: usize, signal: usize) -> Self {
        let average = |period: usize| -> Box<dyn Indicator> {
            match kind {
                AverageKind::Sma => Box::new(Sma::new(period)),
                AverageKind::Ema => Box::new(Ema::new(period)),
            }
        };

        let mut engine = Self::new();
        engine.register(FAST, average(fast));
        engine.register(SLOW, average(slow));
        engine.register(MACD, Box::new(Macd::new(fast, slow, signal)));
        engine
    }

    /// Add an indicator; it starts cold even if candles have already been seen
    ///
    /// Registering under an existing key replaces that indicator.
    pub fn register(&mut self, key: impl Into<String>, indicator: Box<dyn Indicator>) {
        let key = key.into();
        tracing::debug!(key = %key, indicator = %indicator.name(), "Registering indicator");

        match self.indicators.iter_mut().find(|r| r.key == key) {
            Some(existing) => existing.indicator = indicator,
            None => self.indicators.push(Registered { key, indicator }),
        }
    }

    /// Update every indicator with a closed candle
    ///
    /// Candles must arrive contiguous and in order; anything else means upstream
    /// state is corrupt.
    pub fn on_candle_close(&mut self, candle: &Candle) -> Result<IndicatorSnapshot, IntegrityError> {
        if let Some(last_close) = self.last_close_time {
            if candle.open_time != last_close {
                return Err(IntegrityError::OutOfOrder {
                    last_close,
                    got: candle.open_time,
                });
            }
        }

        let close = candle
            .close
            .to_f64()
            .ok_or(IntegrityError::Unrepresentable(candle.close))?;

        let mut values = BTreeMap::new();
        for registered in &mut self.indicators {
            if let Some(value) = registered.indicator.update(close) {
                values.insert(registered.key.clone(), value);
            }
        }

        self.last_close_time = Some(candle.close_time);
        self.candles_seen += 1;

        tracing::debug!(close_time = %candle.close_time, ?values, "Indicators updated");

        Ok(IndicatorSnapshot {
            open_time: candle.open_time,
            close_time: candle.close_time,
            close: candle.close,
            values,
        })
    }

    /// Candles needed before every registered indicator has a value
    pub fn warmup(&self) -> usize {
        self.indicators
            .iter()
            .map(|r| r.indicator.warmup())
            .max()
            .unwrap_or(0)
    }

    pub fn is_warm(&self) -> bool {
        self.indicators.iter().all(|r| r.indicator.value().is_some())
    }

    pub fn candles_seen(&self) -> u64 {
        self.candles_seen
    }

    pub fn last_close_time(&self) -> Option<DateTime<Utc>> {
        self.last_close_time
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IndicatorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .indicators
            .iter()
            .map(|r| format!("{}={}", r.key, r.indicator.name()))
            .collect();
        f.debug_struct("IndicatorEngine")
            .field("indicators", &names)
            .field("last_close_time", &self.last_close_time)
            .field("candles_seen", &self.candles_seen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn candle(index: i64, close: Decimal) -> Candle {
        let open_time = Utc.timestamp_opt(index * 60, 0).unwrap();
        Candle::flat(open_time, Duration::minutes(1), close)
    }

    #[test]
    fn test_cold_start_is_not_available() {
        let mut engine = IndicatorEngine::for_crossover(AverageKind::Sma, 2, 3, 2);

        let first = engine.on_candle_close(&candle(0, dec!(10))).unwrap();
        assert!(first.values.is_empty());

        let second = engine.on_candle_close(&candle(1, dec!(20))).unwrap();
        assert_eq!(second.scalar(FAST), Some(15.0));
        assert_eq!(second.scalar(SLOW), None);

        let third = engine.on_candle_close(&candle(2, dec!(30))).unwrap();
        assert_eq!(third.scalar(FAST), Some(25.0));
        assert_eq!(third.scalar(SLOW), Some(20.0));
        assert!(third.get(MACD).is_none());
        assert!(!engine.is_warm());

        engine.on_candle_close(&candle(3, dec!(40))).unwrap();
        assert!(engine.is_warm());
        assert_eq!(engine.warmup(), 4);
        assert_eq!(engine.candles_seen(), 4);
    }

    #[test]
    fn test_out_of_order_candle_is_integrity_error() {
        let mut engine = IndicatorEngine::for_crossover(AverageKind::Ema, 2, 3, 2);
        engine.on_candle_close(&candle(0, dec!(10))).unwrap();

        let skipped = engine.on_candle_close(&candle(2, dec!(10)));
        assert!(matches!(skipped, Err(IntegrityError::OutOfOrder { .. })));

        let replayed = engine.on_candle_close(&candle(0, dec!(10)));
        assert!(matches!(replayed, Err(IntegrityError::OutOfOrder { .. })));
    }

    #[test]
    fn test_register_mid_stream_starts_cold() {
        let mut engine = IndicatorEngine::new();
        engine.register("sma2", Box::new(Sma::new(2)));

        engine.on_candle_close(&candle(0, dec!(10))).unwrap();
        engine.on_candle_close(&candle(1, dec!(20))).unwrap();

        engine.register("sma3", Box::new(Sma::new(3)));
        let snapshot = engine.on_candle_close(&candle(2, dec!(30))).unwrap();

        assert_eq!(snapshot.scalar("sma2"), Some(25.0));
        assert_eq!(snapshot.scalar("sma3"), None);
    }

    #[test]
    fn test_scalar_on_macd_is_none() {
        let mut engine = IndicatorEngine::new();
        engine.register(MACD, Box::new(Macd::new(1, 2, 1)));
        engine.on_candle_close(&candle(0, dec!(10))).unwrap();
        let snapshot = engine.on_candle_close(&candle(1, dec!(12))).unwrap();

        assert!(snapshot.get(MACD).is_some());
        assert!(snapshot.scalar(MACD).is_none());
    }
}
