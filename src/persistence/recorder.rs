use chrono::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

use super::MarketDataStore;
use crate::models::Trade;
use crate::pipeline::PipelineEvent;

const TRADE_BATCH: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub trades: u64,
    pub candles: u64,
    pub lagged: u64,
    pub pruned: u64,
    pub write_errors: u64,
}

/// Observer that persists novel trades and closed candles
///
/// Runs until the bus closes. Storage failures are logged and skipped; they
/// never reach the pipeline. With `retention` set, data older than that before
/// each closed candle's close time is pruned from the store.
pub async fn run_recorder(
    mut events: broadcast::Receiver<PipelineEvent>,
    mut store: Box<dyn MarketDataStore>,
    retention: Option<Duration>,
) -> RecorderStats {
    let mut stats = RecorderStats::default();
    let mut pending: Vec<Trade> = Vec::with_capacity(TRADE_BATCH);

    tracing::info!("💾 Recording market data to {}", store.describe());

    loop {
        match events.recv().await {
            Ok(PipelineEvent::Trade(trade)) => {
                pending.push(trade);
                if pending.len() >= TRADE_BATCH {
                    flush_trades(store.as_mut(), &mut pending, &mut stats).await;
                }
            }
            Ok(PipelineEvent::CandleClosed(candle)) => {
                flush_trades(store.as_mut(), &mut pending, &mut stats).await;
                match store.append_candles(std::slice::from_ref(&candle)).await {
                    Ok(()) => stats.candles += 1,
                    Err(e) => {
                        stats.write_errors += 1;
                        tracing::warn!(open_time = %candle.open_time, error = %e, "Failed to record candle");
                    }
                }
                if let Some(keep) = retention {
                    match store.prune_before(candle.close_time - keep).await {
                        Ok(removed) => stats.pruned += removed as u64,
                        Err(e) => {
                            stats.write_errors += 1;
                            tracing::warn!(error = %e, "Failed to prune old market data");
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                stats.lagged += skipped;
                tracing::warn!(skipped, "Recorder fell behind; oldest events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    flush_trades(store.as_mut(), &mut pending, &mut stats).await;
    tracing::info!(
        trades = stats.trades,
        candles = stats.candles,
        "Recorder stopped"
    );
    stats
}

async fn flush_trades(store: &mut dyn MarketDataStore, pending: &mut Vec<Trade>, stats: &mut RecorderStats) {
    if pending.is_empty() {
        return;
    }
    match store.append_trades(pending).await {
        Ok(()) => stats.trades += pending.len() as u64,
        Err(e) => {
            stats.write_errors += 1;
            tracing::warn!(count = pending.len(), error = %e, "Failed to record trades");
        }
    }
    pending.clear();
}
