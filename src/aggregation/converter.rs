use chrono::Duration;

use super::CandleAggregator;
use crate::error::IntegrityError;
use crate::models::{Candle, Trade};

/// Rebuild candles from recorded trades
///
/// Runs the same aggregation as the live pipeline, so gaps become flat candles.
/// Duplicate ids should be removed beforehand. The last candle is included even
/// though, live, it would still be in progress; callers that need only closed
/// candles should drop it.
pub fn trades_to_candles(trades: &[Trade], interval: Duration) -> Result<Vec<Candle>, IntegrityError> {
    let mut aggregator = CandleAggregator::new(interval);
    let mut candles = Vec::new();

    for trade in trades {
        candles.extend(aggregator.ingest(trade)?);
    }
    if let Some(last) = aggregator.flush()? {
        candles.push(last);
    }

    if aggregator.late_trades() > 0 {
        tracing::warn!(
            dropped = aggregator.late_trades(),
            "Recorded trades were out of order; some were dropped"
        );
    }

    Ok(candles)
}
