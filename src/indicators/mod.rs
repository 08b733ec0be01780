// Incremental technical indicators, updated once per closed candle

pub mod batch;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod sma;

use serde::{Deserialize, Serialize};

pub use batch::{calculate_ema, calculate_macd, calculate_sma};
pub use ema::Ema;
pub use engine::{IndicatorEngine, IndicatorSnapshot};
pub use macd::{Macd, MacdValue};
pub use sma::Sma;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Scalar(f64),
    Macd(MacdValue),
}

impl IndicatorValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            IndicatorValue::Scalar(v) => Some(*v),
            IndicatorValue::Macd(_) => None,
        }
    }

    pub fn as_macd(&self) -> Option<&MacdValue> {
        match self {
            IndicatorValue::Macd(v) => Some(v),
            IndicatorValue::Scalar(_) => None,
        }
    }
}

/// A recursive accumulator fed one close at a time
///
/// The value after close N depends only on the state after close N-1 and close N.
pub trait Indicator: Send {
    fn name(&self) -> String;

    /// Feed a close; `None` while still warming up
    fn update(&mut self, close: f64) -> Option<IndicatorValue>;

    fn value(&self) -> Option<IndicatorValue>;

    /// Closes needed before the first value
    fn warmup(&self) -> usize;
}
