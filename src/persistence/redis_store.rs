use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use super::MarketDataStore;
use crate::config::interval_label;
use crate::models::{Candle, Market, Trade};
use crate::{Error, Result};

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Redis-backed store
///
/// Uses sorted sets scored by timestamp (milliseconds) for time-range queries:
/// `trades:{market}` and `candles:{market}:{interval}`.
pub struct RedisStore {
    conn: ConnectionManager,
    trades_key: String,
    candles_key: String,
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn connect(redis_url: &str, market: &Market, interval: Duration) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| Error::Storage("Redis connection timeout after 5 seconds".to_string()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            trades_key: format!("trades:{}", market),
            candles_key: format!("candles:{}:{}", market, interval_label(interval)),
        })
    }

    pub async fn count_candles(&mut self) -> Result<usize> {
        let count: usize = self.conn.zcard(&self.candles_key).await?;
        Ok(count)
    }

    fn decode<T: DeserializeOwned>(members: Vec<String>) -> Result<Vec<T>> {
        members
            .iter()
            .map(|json| serde_json::from_str(json).map_err(Error::from))
            .collect()
    }
}

#[async_trait]
impl MarketDataStore for RedisStore {
    async fn append_trades(&mut self, trades: &[Trade]) -> Result<()> {
        if trades.is_empty() {
            return Ok(());
        }
        let mut members = Vec::with_capacity(trades.len());
        for trade in trades {
            members.push((trade.timestamp.timestamp_millis(), serde_json::to_string(trade)?));
        }
        self.conn
            .zadd_multiple::<_, _, _, ()>(&self.trades_key, &members)
            .await?;
        Ok(())
    }

    async fn append_candles(&mut self, candles: &[Candle]) -> Result<()> {
        if candles.is_empty() {
            return Ok(());
        }
        let mut members = Vec::with_capacity(candles.len());
        for candle in candles {
            members.push((candle.open_time.timestamp_millis(), serde_json::to_string(candle)?));
        }
        self.conn
            .zadd_multiple::<_, _, _, ()>(&self.candles_key, &members)
            .await?;

        tracing::debug!("Saved {} candles to Redis", candles.len());
        Ok(())
    }

    async fn load_candles(&mut self, limit: usize) -> Result<Vec<Candle>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = -(limit.min(isize::MAX as usize) as isize);
        let members: Vec<String> = self.conn.zrange(&self.candles_key, start, -1).await?;
        Self::decode(members)
    }

    async fn load_trades_since(&mut self, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        let members: Vec<String> = self
            .conn
            .zrangebyscore(&self.trades_key, since.timestamp_millis(), "+inf")
            .await?;
        Self::decode(members)
    }

    async fn replace_candles(&mut self, candles: &[Candle]) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic().del(&self.candles_key).ignore();

        if !candles.is_empty() {
            let mut members = Vec::with_capacity(candles.len());
            for candle in candles {
                members.push((candle.open_time.timestamp_millis(), serde_json::to_string(candle)?));
            }
            pipe.zadd_multiple(&self.candles_key, &members).ignore();
        }

        let () = pipe.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let max_score = format!("({}", cutoff.timestamp_millis());
        let mut removed = 0;
        for key in [&self.trades_key, &self.candles_key] {
            let n: usize = self.conn.zrembyscore(key, "-inf", &max_score).await?;
            removed += n;
        }

        if removed > 0 {
            tracing::debug!("Pruned {} old entries from Redis", removed);
        }
        Ok(removed)
    }

    fn describe(&self) -> String {
        format!("redis ({})", self.candles_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    fn market() -> Market {
        "test_BTC_USD".parse().unwrap()
    }

    #[tokio::test]
    #[ignore] // Needs a reachable address that drops packets
    async fn test_connection_timeout() {
        let result = RedisStore::connect("redis://192.0.2.1:6379", &market(), Duration::minutes(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_candles_round_trip() {
        let mut store = RedisStore::connect(REDIS_URL, &market(), Duration::minutes(1))
            .await
            .expect("Failed to connect to Redis");
        store.replace_candles(&[]).await.unwrap();

        let candles: Vec<Candle> = (0..3)
            .map(|i| Candle::flat(Utc.timestamp_opt(i * 60, 0).unwrap(), Duration::minutes(1), dec!(100)))
            .collect();
        store.append_candles(&candles).await.unwrap();

        let loaded = store.load_candles(2).await.unwrap();
        assert_eq!(loaded, candles[1..].to_vec());
        assert_eq!(store.count_candles().await.unwrap(), 3);

        store.replace_candles(&[]).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_trades_since() {
        let mut store = RedisStore::connect(REDIS_URL, &market(), Duration::minutes(1))
            .await
            .expect("Failed to connect to Redis");
        let _ = store.prune_before(Utc::now()).await;

        let trades: Vec<Trade> = (0..4)
            .map(|i| Trade::from_signed(i, Utc.timestamp_opt(i as i64 * 10, 0).unwrap(), dec!(100), dec!(1)))
            .collect();
        store.append_trades(&trades).await.unwrap();

        let recent = store.load_trades_since(Utc.timestamp_opt(20, 0).unwrap()).await.unwrap();
        assert_eq!(recent.len(), 2);

        let _ = store.prune_before(Utc::now()).await;
    }
}
