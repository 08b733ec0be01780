//! Startup backfill: rebuild recent closed candles before live ingestion

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::aggregation::{CandleAggregator, CandleValidator};
use crate::models::{Candle, Trade};
use crate::persistence::MarketDataStore;
use crate::Result;

/// Statistics from a backfill operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillStats {
    pub recorded_candles: usize,
    pub discarded_candles: usize,
    pub trades_replayed: usize,
    pub rebuilt_candles: usize,
    pub pending_trades: usize,
}

/// What the pipeline starts from
#[derive(Debug, Clone, Default)]
pub struct BackfillSeed {
    /// Closed, contiguous candles, oldest first
    pub candles: Vec<Candle>,
    /// Recorded trades inside the candle still in progress at `now`
    pub pending_trades: Vec<Trade>,
    pub stats: BackfillStats,
}

/// Reconstruct the most recent `limit` closed candles
///
/// Starts from recorded candles (the longest valid, contiguous run ending at the
/// newest one), then replays recorded trades after it to cover downtime. With no
/// recorded candles, rebuilds from trades of the last `limit + 1` intervals.
/// Rebuilt candles are written back to the store when `persist` is set.
pub async fn load_seed(
    store: &mut dyn MarketDataStore,
    interval: Duration,
    limit: usize,
    now: DateTime<Utc>,
    persist: bool,
) -> Result<BackfillSeed> {
    let mut stats = BackfillStats::default();
    let validator = CandleValidator::new(interval);

    let loaded = store.load_candles(limit).await?;
    let loaded_count = loaded.len();
    let recorded = valid_suffix(loaded, &validator, now);
    stats.recorded_candles = recorded.len();
    stats.discarded_candles = loaded_count - recorded.len();

    if stats.discarded_candles > 0 {
        tracing::warn!(
            discarded = stats.discarded_candles,
            "Ignoring recorded candles that are invalid, in progress or not contiguous"
        );
    }

    let since = match recorded.last() {
        Some(last) => last.close_time,
        None => {
            let lookback = i32::try_from(limit + 1).unwrap_or(i32::MAX);
            now - interval.checked_mul(lookback).unwrap_or(interval)
        }
    };

    let trades = prepare_trades(store.load_trades_since(since).await?, now);
    stats.trades_replayed = trades.len();

    let mut aggregator = CandleAggregator::new(interval);
    if let Some(last) = recorded.last() {
        aggregator.resume_after(last.clone())?;
    }

    let mut rebuilt = Vec::new();
    for trade in &trades {
        rebuilt.extend(aggregator.ingest(trade)?);
    }
    rebuilt.extend(aggregator.close_until(now)?);
    stats.rebuilt_candles = rebuilt.len();

    let pending_trades: Vec<Trade> = match aggregator.current() {
        Some(current) => trades
            .into_iter()
            .filter(|t| t.timestamp >= current.open_time && t.timestamp < current.close_time)
            .collect(),
        None => Vec::new(),
    };
    stats.pending_trades = pending_trades.len();

    if persist && !rebuilt.is_empty() {
        store.append_candles(&rebuilt).await?;
    }

    let mut candles = recorded;
    candles.extend(rebuilt);
    let excess = candles.len().saturating_sub(limit);
    candles.drain(..excess);

    validator.validate_sequence(&candles)?;

    tracing::info!(
        candles = candles.len(),
        recorded = stats.recorded_candles,
        rebuilt = stats.rebuilt_candles,
        pending = stats.pending_trades,
        "Backfill complete"
    );

    Ok(BackfillSeed {
        candles,
        pending_trades,
        stats,
    })
}

/// Longest run at the end of `candles` that is valid, closed by `now` and contiguous
///
/// Repeated records of the same candle are collapsed.
fn valid_suffix(candles: Vec<Candle>, validator: &CandleValidator, now: DateTime<Utc>) -> Vec<Candle> {
    let mut suffix: Vec<Candle> = Vec::new();

    for candle in candles.into_iter().rev() {
        if candle.close_time > now {
            if suffix.is_empty() {
                continue;
            }
            break;
        }

        match suffix.last() {
            Some(newer) if newer.open_time == candle.open_time => continue,
            Some(newer) if candle.close_time != newer.open_time => break,
            _ => {}
        }

        if validator.validate(&candle, None).is_err() {
            break;
        }
        suffix.push(candle);
    }

    suffix.reverse();
    suffix
}

/// Order by time and drop repeated ids and future trades
fn prepare_trades(mut trades: Vec<Trade>, now: DateTime<Utc>) -> Vec<Trade> {
    trades.sort_by_key(|t| (t.timestamp, t.id));
    let mut seen = HashSet::with_capacity(trades.len());
    trades.retain(|t| t.timestamp <= now && seen.insert(t.id));
    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::FileStore;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn minute() -> Duration {
        Duration::minutes(1)
    }

    fn candle(index: i64, close: Decimal) -> Candle {
        Candle::flat(at(index * 60), minute(), close)
    }

    fn store(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path(), &"bitfinex_BTC_USD".parse().unwrap(), minute())
    }

    #[tokio::test]
    async fn test_empty_store_gives_empty_seed() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let seed = load_seed(&mut store, minute(), 10, at(600), false).await.unwrap();
        assert!(seed.candles.is_empty());
        assert!(seed.pending_trades.is_empty());
    }

    #[tokio::test]
    async fn test_uses_recorded_candles() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let recorded: Vec<Candle> = (0..5).map(|i| candle(i, dec!(100))).collect();
        store.append_candles(&recorded).await.unwrap();

        let seed = load_seed(&mut store, minute(), 3, at(300), false).await.unwrap();
        assert_eq!(seed.candles, recorded[2..].to_vec());
        assert_eq!(seed.stats.recorded_candles, 3);
    }

    #[tokio::test]
    async fn test_keeps_only_contiguous_suffix() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        // gap between 1 and 3, duplicate record of 4
        let recorded = vec![
            candle(0, dec!(100)),
            candle(1, dec!(100)),
            candle(3, dec!(100)),
            candle(4, dec!(100)),
            candle(4, dec!(100)),
        ];
        store.append_candles(&recorded).await.unwrap();

        let seed = load_seed(&mut store, minute(), 10, at(300), false).await.unwrap();
        assert_eq!(seed.candles, vec![candle(3, dec!(100)), candle(4, dec!(100))]);
        assert_eq!(seed.stats.discarded_candles, 3);
    }

    #[tokio::test]
    async fn test_rebuilds_from_trades_without_candles() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let trades = vec![
            Trade::from_signed(1, at(5), dec!(10), dec!(1)),
            Trade::from_signed(2, at(30), dec!(12), dec!(1)),
            Trade::from_signed(2, at(30), dec!(12), dec!(1)),
            Trade::from_signed(3, at(130), dec!(11), dec!(1)),
            Trade::from_signed(4, at(190), dec!(13), dec!(1)),
        ];
        store.append_trades(&trades).await.unwrap();

        let seed = load_seed(&mut store, minute(), 10, at(200), true).await.unwrap();

        // 0 (real), 60 (flat), 120 (real); 180 is still open
        assert_eq!(seed.candles.len(), 3);
        assert_eq!(seed.candles[0].close, dec!(12));
        assert_eq!(seed.candles[0].volume, dec!(2));
        assert_eq!(seed.candles[1].volume, Decimal::ZERO);
        assert_eq!(seed.candles[2].close, dec!(11));
        assert_eq!(seed.pending_trades.len(), 1);
        assert_eq!(seed.pending_trades[0].id, 4);

        // written back for next time
        assert_eq!(store.load_candles(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_covers_downtime_after_recorded_candles() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.append_candles(&[candle(0, dec!(100))]).await.unwrap();
        store
            .append_trades(&[Trade::from_signed(9, at(150), dec!(105), dec!(1))])
            .await
            .unwrap();

        let seed = load_seed(&mut store, minute(), 10, at(245), false).await.unwrap();

        let opens: Vec<_> = seed.candles.iter().map(|c| c.open_time).collect();
        assert_eq!(opens, vec![at(0), at(60), at(120), at(180)]);
        assert_eq!(seed.candles[2].close, dec!(105));
        assert_eq!(seed.candles[3].close, dec!(105));
        assert!(seed.pending_trades.is_empty());
    }
}
