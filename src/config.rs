use chrono::Duration;
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::Market;
use crate::risk::RiskConfig;

const ENV_PREFIX: &str = "CANDLEBOT";

/// Which moving average feeds the crossover
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AverageKind {
    Sma,
    Ema,
}

/// Session settings
///
/// Loaded once at startup from defaults, an optional TOML file and
/// `CANDLEBOT__*` environment variables, in that order of precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub market: String,
    pub candle_interval: String,
    pub ma_type: AverageKind,
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub stoploss_pct: Decimal,
    pub risk_per_trade_pct: Decimal,
    pub max_position_size: Decimal, // quote currency
    pub min_order_size: Decimal,    // base currency
    pub size_increment: Decimal,    // base currency lot step
    pub record_data: bool,
    pub data_dir: PathBuf,
    pub redis_url: Option<String>,
    /// Hours of recorded data to keep; 0 keeps everything
    pub retention_hours: u64,
    pub dedup_capacity: usize,
    pub observer_queue: usize,
    pub history_len: usize,
    pub fill_timeout_secs: u64,
    pub close_grace_secs: u64,
    pub poll_interval_secs: u64,
    // Paper trading
    pub initial_quote_balance: Decimal,
    pub initial_base_balance: Decimal,
    pub commission_pct: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            market: "bitfinex_BTC_USD".to_string(),
            candle_interval: "15m".to_string(),
            ma_type: AverageKind::Ema,
            fast_period: 10,
            slow_period: 21,
            signal_period: 9,
            stoploss_pct: Decimal::new(5, 2),       // 5%
            risk_per_trade_pct: Decimal::new(1, 2), // 1% of equity
            max_position_size: Decimal::new(5000, 0),
            min_order_size: Decimal::new(1, 4),
            size_increment: Decimal::new(1, 8),
            record_data: true,
            data_dir: PathBuf::from("data"),
            redis_url: None,
            retention_hours: 24 * 14,
            dedup_capacity: 10_000,
            observer_queue: 1024,
            history_len: 500,
            fill_timeout_secs: 30,
            close_grace_secs: 5,
            poll_interval_secs: 5,
            initial_quote_balance: Decimal::new(10_000, 0),
            initial_base_balance: Decimal::ZERO,
            commission_pct: Decimal::new(12, 4), // 0.12%
        }
    }
}

impl Settings {
    /// Load and validate settings
    ///
    /// Any error here is fatal: nothing live has been created yet.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            tracing::info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every field a pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.market()?;
        self.interval()?;

        for (field, value) in [
            ("fast_period", self.fast_period),
            ("slow_period", self.slow_period),
            ("signal_period", self.signal_period),
            ("dedup_capacity", self.dedup_capacity),
            ("observer_queue", self.observer_queue),
            ("history_len", self.history_len),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive {
                    field,
                    value: value.to_string(),
                });
            }
        }

        if self.fast_period >= self.slow_period {
            return Err(ConfigError::PeriodOrder {
                fast: self.fast_period,
                slow: self.slow_period,
            });
        }

        if self.stoploss_pct <= Decimal::ZERO || self.stoploss_pct >= Decimal::ONE {
            return Err(ConfigError::OutOfRange {
                field: "stoploss_pct",
                range: "(0, 1)",
                value: self.stoploss_pct.to_string(),
            });
        }

        if self.risk_per_trade_pct <= Decimal::ZERO || self.risk_per_trade_pct > Decimal::ONE {
            return Err(ConfigError::OutOfRange {
                field: "risk_per_trade_pct",
                range: "(0, 1]",
                value: self.risk_per_trade_pct.to_string(),
            });
        }

        for (field, value) in [
            ("max_position_size", self.max_position_size),
            ("size_increment", self.size_increment),
        ] {
            if value <= Decimal::ZERO {
                return Err(ConfigError::NotPositive {
                    field,
                    value: value.to_string(),
                });
            }
        }

        if self.min_order_size < Decimal::ZERO {
            return Err(ConfigError::OutOfRange {
                field: "min_order_size",
                range: "[0, inf)",
                value: self.min_order_size.to_string(),
            });
        }

        if self.commission_pct < Decimal::ZERO || self.commission_pct >= Decimal::ONE {
            return Err(ConfigError::OutOfRange {
                field: "commission_pct",
                range: "[0, 1)",
                value: self.commission_pct.to_string(),
            });
        }

        if let Some(retention) = self.retention() {
            let history_len = i64::try_from(self.history_len).unwrap_or(i64::MAX);
            let needed_secs = self.interval()?.num_seconds().saturating_mul(history_len);
            if retention.num_seconds() < needed_secs {
                return Err(ConfigError::OutOfRange {
                    field: "retention_hours",
                    range: "0 or at least history_len candles",
                    value: self.retention_hours.to_string(),
                });
            }
        }

        if self.fill_timeout_secs == 0 {
            return Err(ConfigError::NotPositive {
                field: "fill_timeout_secs",
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    pub fn market(&self) -> Result<Market, ConfigError> {
        self.market.parse()
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.candle_interval)
    }

    /// How far back recorded data is kept, if pruning is on
    pub fn retention(&self) -> Option<Duration> {
        let hours = i64::try_from(self.retention_hours).ok()?;
        (hours > 0).then(|| Duration::hours(hours.min(24 * 365 * 100)))
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_position_size: self.max_position_size,
            stoploss_pct: self.stoploss_pct,
            risk_per_trade_pct: self.risk_per_trade_pct,
            min_order_size: self.min_order_size,
            size_increment: self.size_increment,
        }
    }

    /// Closed candles needed before the slowest indicator produces a value
    ///
    /// The MACD signal line is last: `max(fast, slow) + signal - 1` closes.
    pub fn warmup_candles(&self) -> usize {
        (self.fast_period.max(self.slow_period) + self.signal_period).saturating_sub(1)
    }
}

/// Parse a human candle interval such as `"15m"`, `"15 min"`, `"1h"` or `"30 seconds"`
///
/// A bare number is read as hours.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval(input.to_string());

    let trimmed = input.trim();
    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (value, unit) = trimmed.split_at(split_at);

    let value: i64 = value.parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }

    let duration = match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::seconds(value),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::minutes(value),
        "" | "h" | "hr" | "hrs" | "hour" | "hours" => Duration::hours(value),
        "d" | "day" | "days" => Duration::days(value),
        _ => return Err(invalid()),
    };

    Ok(duration)
}

/// Compact label for file and key names, e.g. `15m`
pub fn interval_label(interval: Duration) -> String {
    let secs = interval.num_seconds();
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
