use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ConfigError;

/// A single instrument on a single exchange, written `exchange_BASE_QUOTE`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    pub exchange: String,
    pub base: String,
    pub quote: String,
}

impl Market {
    /// Exchange-style pair symbol, e.g. `BTCUSD`
    pub fn pair(&self) -> String {
        format!("{}{}", self.base.to_uppercase(), self.quote.to_uppercase())
    }
}

impl FromStr for Market {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        match parts.as_slice() {
            [exchange, base, quote]
                if !exchange.is_empty() && !base.is_empty() && !quote.is_empty() =>
            {
                Ok(Self {
                    exchange: exchange.to_lowercase(),
                    base: base.to_uppercase(),
                    quote: quote.to_uppercase(),
                })
            }
            _ => Err(ConfigError::InvalidMarket(s.to_string())),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.exchange, self.base, self.quote)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// An executed trade as reported by the exchange
///
/// `amount` is always non-negative; the aggressor direction lives in `side`.
/// Two trades with the same `id` are the same event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub amount: Decimal,
    pub side: TradeSide,
}

impl Trade {
    /// Build a trade from an exchange amount whose sign encodes the side
    pub fn from_signed(id: u64, timestamp: DateTime<Utc>, price: Decimal, amount: Decimal) -> Self {
        let side = if amount.is_sign_negative() {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        };

        Self {
            id,
            timestamp,
            price,
            amount: amount.abs(),
            side,
        }
    }

    /// Amount signed by side (sells negative)
    pub fn signed_amount(&self) -> Decimal {
        match self.side {
            TradeSide::Buy => self.amount,
            TradeSide::Sell => -self.amount,
        }
    }
}

/// OHLCV candle covering `[open_time, close_time)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Open a candle from its first trade
    pub fn open_with(open_time: DateTime<Utc>, interval: Duration, trade: &Trade) -> Self {
        Self {
            open_time,
            close_time: open_time + interval,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.amount,
        }
    }

    /// Synthetic candle for an interval without trades
    pub fn flat(open_time: DateTime<Utc>, interval: Duration, price: Decimal) -> Self {
        Self {
            open_time,
            close_time: open_time + interval,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
        }
    }

    /// Fold a trade that falls inside this candle
    pub fn absorb(&mut self, trade: &Trade) {
        self.close = trade.price;
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.volume += trade.amount;
    }

    pub fn interval(&self) -> Duration {
        self.close_time - self.open_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

/// Current exposure on the instrument
///
/// Only changed by confirmed fills.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub state: PositionState,
    pub entry_price: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    pub size: Decimal,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            state: PositionState::Flat,
            entry_price: None,
            entry_time: None,
            size: Decimal::ZERO,
        }
    }

    pub fn long(entry_price: Decimal, entry_time: DateTime<Utc>, size: Decimal) -> Self {
        Self {
            state: PositionState::Long,
            entry_price: Some(entry_price),
            entry_time: Some(entry_time),
            size,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    /// Price at or below which a long position must be stopped out
    pub fn stoploss_price(&self, stoploss_pct: Decimal) -> Option<Decimal> {
        match self.state {
            PositionState::Long => self
                .entry_price
                .map(|entry| entry * (Decimal::ONE - stoploss_pct)),
            PositionState::Flat => None,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderKind {
    Enter,
    Exit,
    StoplossExit,
}

impl OrderKind {
    pub fn side(&self) -> TradeSide {
        match self {
            OrderKind::Enter => TradeSide::Buy,
            OrderKind::Exit | OrderKind::StoplossExit => TradeSide::Sell,
        }
    }

    pub fn is_exit(&self) -> bool {
        !matches!(self, OrderKind::Enter)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderKind::Enter => "ENTER",
            OrderKind::Exit => "EXIT",
            OrderKind::StoplossExit => "STOPLOSS_EXIT",
        };
        f.write_str(s)
    }
}

/// A not-yet-submitted request to change the position
///
/// `size` is in base units. The strategy leaves it at zero for entries; the risk
/// manager fills it in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderIntent {
    pub id: Uuid,
    pub kind: OrderKind,
    pub price_hint: Decimal,
    pub size: Decimal,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    pub fn new(
        kind: OrderKind,
        price_hint: Decimal,
        size: Decimal,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            price_hint,
            size,
            reason: reason.into(),
            created_at,
        }
    }
}

/// Confirmed execution reported by the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub order_id: Uuid,
    pub kind: OrderKind,
    pub price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OrderOutcome {
    Filled(Fill),
    Rejected { reason: String },
}
