// Recorded market data: trades and closed candles per market
pub mod file;
pub mod recorder;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Candle, Trade};
use crate::Result;

pub use self::file::FileStore;
pub use self::recorder::{run_recorder, RecorderStats};
pub use self::redis_store::RedisStore;

/// Durable store for one market's trades and one interval's candles
///
/// Appends come from the recorder observer; loads from backfill.
#[async_trait]
pub trait MarketDataStore: Send {
    async fn append_trades(&mut self, trades: &[Trade]) -> Result<()>;

    async fn append_candles(&mut self, candles: &[Candle]) -> Result<()>;

    /// Most recent `limit` candles, oldest first
    async fn load_candles(&mut self, limit: usize) -> Result<Vec<Candle>>;

    /// Trades at or after `since`, oldest first
    async fn load_trades_since(&mut self, since: DateTime<Utc>) -> Result<Vec<Trade>>;

    /// Overwrite the candle history, e.g. after a rebuild from trades
    async fn replace_candles(&mut self, candles: &[Candle]) -> Result<()>;

    /// Drop trades and candles older than `cutoff`, returning how many went
    ///
    /// Append-only stores keep everything.
    async fn prune_before(&mut self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }

    fn describe(&self) -> String;
}
