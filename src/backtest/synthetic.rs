use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::models::Trade;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings in both directions
    Volatile,
    /// Sideways, with quiet stretches long enough to skip whole candles
    WithGaps,
    /// Rally followed by a sharp drop, for stoploss exits
    Crash,
}

impl std::str::FromStr for MarketScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uptrend" => Ok(Self::Uptrend),
            "downtrend" => Ok(Self::Downtrend),
            "sideways" => Ok(Self::Sideways),
            "volatile" => Ok(Self::Volatile),
            "gaps" | "with_gaps" => Ok(Self::WithGaps),
            "crash" => Ok(Self::Crash),
            other => Err(format!("unknown scenario '{}'", other)),
        }
    }
}

/// Generates reproducible synthetic trade streams for backtests and tests
pub struct SyntheticTradeGenerator {
    rng: StdRng,
    base_price: f64,
    start: DateTime<Utc>,
    first_id: u64,
}

impl SyntheticTradeGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 30_000.0,
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            first_id: 1_000_000,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Generate trades for a scenario
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_trades` - Number of trades to generate
    /// * `mean_spacing` - Average time between consecutive trades
    pub fn generate(&mut self, scenario: MarketScenario, num_trades: usize, mean_spacing: Duration) -> Vec<Trade> {
        let spacing_ms = mean_spacing.num_milliseconds().max(2);
        let floor = self.base_price * 0.1;

        let mut trades = Vec::with_capacity(num_trades);
        let mut price = self.base_price;
        let mut timestamp = self.start;

        for i in 0..num_trades {
            price = self.step(scenario, price, i, num_trades).max(floor);

            let mut gap_ms = self.rng.gen_range(1..=2 * spacing_ms);
            if scenario == MarketScenario::WithGaps && i > 0 && i % 50 == 0 {
                gap_ms += spacing_ms * self.rng.gen_range(20..60);
            }
            timestamp += Duration::milliseconds(gap_ms);

            let amount = self.rng.gen_range(0.001..2.0) * if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            trades.push(Trade::from_signed(
                self.first_id + i as u64,
                timestamp,
                to_decimal(price, 2),
                to_decimal(amount, 6),
            ));
        }

        trades
    }

    fn step(&mut self, scenario: MarketScenario, price: f64, i: usize, total: usize) -> f64 {
        match scenario {
            MarketScenario::Uptrend => price * (1.0 + 0.0005 + self.rng.gen_range(-0.002..0.002)),
            MarketScenario::Downtrend => price * (1.0 - 0.0005 + self.rng.gen_range(-0.002..0.002)),
            MarketScenario::Sideways | MarketScenario::WithGaps => {
                let reversion = (self.base_price - price) * 0.05;
                price + reversion + price * self.rng.gen_range(-0.003..0.003)
            }
            MarketScenario::Volatile => price * (1.0 + self.rng.gen_range(-0.01..0.01)),
            MarketScenario::Crash => {
                let crash_start = total / 2;
                if i < crash_start {
                    price * (1.0 + 0.001 + self.rng.gen_range(-0.001..0.001))
                } else if i < crash_start + 20 {
                    price * 0.97
                } else {
                    price * (1.0 + self.rng.gen_range(-0.002..0.002))
                }
            }
        }
    }
}

fn to_decimal(value: f64, dp: u32) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(dp)
}
