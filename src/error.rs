use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level error for the trading pipeline
///
/// Only [`Error::Integrity`] halts a running pipeline. Everything else is either
/// fatal at startup (configuration) or logged and recovered from locally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data integrity violation: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("trade feed error: {0}")]
    Feed(String),

    #[error("order gateway error: {0}")]
    Gateway(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl Error {
    /// Whether this error must stop trading for the instrument
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Integrity(_) | Error::Config(_))
    }
}

/// Invalid settings, detected before any live state is created
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid candle interval '{0}': expected '<value> <unit>', e.g. '15m' or '1 hour'")]
    InvalidInterval(String),

    #[error("invalid market '{0}': expected 'exchange_BASE_QUOTE', e.g. 'bitfinex_BTC_USD'")]
    InvalidMarket(String),

    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: String },

    #[error("{field} must be within {range} (got {value})")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: String,
    },

    #[error("fast_period ({fast}) must be less than slow_period ({slow})")]
    PeriodOrder { fast: usize, slow: usize },

    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Load(e.to_string())
    }
}

/// Broken candle or indicator invariants
///
/// A corrupted candle sequence could drive a real-money trade, so these are never
/// papered over.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrityError {
    #[error(
        "candle at {open_time} violates low <= open,close <= high \
         (o={open} h={high} l={low} c={close})"
    )]
    OhlcBounds {
        open_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    },

    #[error("candle at {open_time} has non-positive price {price}")]
    NonPositivePrice {
        open_time: DateTime<Utc>,
        price: Decimal,
    },

    #[error("candle at {open_time} has negative volume {volume}")]
    NegativeVolume {
        open_time: DateTime<Utc>,
        volume: Decimal,
    },

    #[error("candle at {open_time} spans {actual_secs}s, expected {expected_secs}s")]
    WrongSpan {
        open_time: DateTime<Utc>,
        actual_secs: i64,
        expected_secs: i64,
    },

    #[error("candle opening at {got} does not follow previous candle closing at {expected}")]
    NotContiguous {
        expected: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("indicators fed candle opening at {got} after candle closing at {last_close}")]
    OutOfOrder {
        last_close: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("close price {0} cannot be represented as f64")]
    Unrepresentable(Decimal),
}

pub type Result<T> = std::result::Result<T, Error>;
