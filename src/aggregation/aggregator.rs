use chrono::{DateTime, Duration, Utc};

use super::CandleValidator;
use crate::error::IntegrityError;
use crate::models::{Candle, Trade};

/// Turns a trade stream into contiguous fixed-interval candles
///
/// Holds at most one in-progress candle. Closed candles are validated before they
/// leave, and are never touched again.
///
/// After a clock close there is no in-progress candle until the next trade. The
/// bucket after the last closed candle is still the open one: the next trade opens
/// it at its own price, or it is closed flat at the previous close if it ends
/// first. Candles built live are therefore identical to candles rebuilt from the
/// same trades offline.
#[derive(Debug)]
pub struct CandleAggregator {
    interval: Duration,
    current: Option<Candle>,
    last_closed: Option<Candle>,
    validator: CandleValidator,
    late_trades: u64,
    synthetic_candles: u64,
}

impl CandleAggregator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            current: None,
            last_closed: None,
            validator: CandleValidator::new(interval),
            late_trades: 0,
            synthetic_candles: 0,
        }
    }

    /// Resume after the given closed candle (from backfill)
    ///
    /// The next trade continues the sequence, with gap candles in between if needed.
    pub fn resume_after(&mut self, candle: Candle) -> Result<(), IntegrityError> {
        self.validator.validate(&candle, None)?;
        self.current = None;
        self.last_closed = Some(candle);
        Ok(())
    }

    /// Start of the interval bucket containing `ts`
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.interval.num_milliseconds();
        let offset = ts.timestamp_millis().rem_euclid(step);
        ts - Duration::milliseconds(offset)
    }

    /// Fold a trade into the candle stream
    ///
    /// Returns the candles closed by this trade, oldest first: the previous
    /// in-progress candle plus one flat candle per skipped interval. Trades that
    /// belong to an already closed candle are dropped.
    pub fn ingest(&mut self, trade: &Trade) -> Result<Vec<Candle>, IntegrityError> {
        let bucket = self.bucket_start(trade.timestamp);

        if self.is_late(bucket) {
            self.late_trades += 1;
            tracing::warn!(
                trade_id = trade.id,
                timestamp = %trade.timestamp,
                "Dropping trade for an already closed candle"
            );
            return Ok(Vec::new());
        }

        if let Some(current) = self.current.as_mut() {
            if current.open_time == bucket {
                current.absorb(trade);
                return Ok(Vec::new());
            }
        }

        let closed = self.close_before(bucket)?;
        self.current = Some(Candle::open_with(bucket, self.interval, trade));
        Ok(closed)
    }

    /// Close everything that ends at or before `now` without waiting for a trade
    ///
    /// Used on a clock tick so quiet markets still produce candles. The next
    /// trade opens a fresh candle.
    pub fn close_until(&mut self, now: DateTime<Utc>) -> Result<Vec<Candle>, IntegrityError> {
        let bucket = self.bucket_start(now);

        let due = match (&self.current, &self.last_closed) {
            (Some(current), _) => current.close_time <= bucket,
            (None, Some(last)) => last.close_time < bucket,
            (None, None) => false,
        };

        if !due {
            return Ok(Vec::new());
        }
        self.close_before(bucket)
    }

    /// Close the in-progress candle regardless of time (end of a batch)
    pub fn flush(&mut self) -> Result<Option<Candle>, IntegrityError> {
        match self.current.take() {
            Some(candle) => {
                let mut closed = Vec::with_capacity(1);
                self.seal(candle, &mut closed)?;
                Ok(closed.pop())
            }
            None => Ok(None),
        }
    }

    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    pub fn last_closed(&self) -> Option<&Candle> {
        self.last_closed.as_ref()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn late_trades(&self) -> u64 {
        self.late_trades
    }

    pub fn synthetic_candles(&self) -> u64 {
        self.synthetic_candles
    }

    fn is_late(&self, bucket: DateTime<Utc>) -> bool {
        match (&self.current, &self.last_closed) {
            (Some(current), _) => bucket < current.open_time,
            (None, Some(last)) => bucket < last.close_time,
            (None, None) => false,
        }
    }

    /// Close the in-progress candle and fill flat candles up to `bucket`
    fn close_before(&mut self, bucket: DateTime<Utc>) -> Result<Vec<Candle>, IntegrityError> {
        let mut closed = Vec::new();

        if let Some(current) = self.current.take() {
            self.seal(current, &mut closed)?;
        }

        let Some((mut next, price)) = self
            .last_closed
            .as_ref()
            .map(|last| (last.close_time, last.close))
        else {
            return Ok(closed);
        };

        while next < bucket {
            let synthetic = Candle::flat(next, self.interval, price);
            self.synthetic_candles += 1;
            self.seal(synthetic, &mut closed)?;
            next += self.interval;
        }

        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "Closed candles");
        }
        Ok(closed)
    }

    fn seal(&mut self, candle: Candle, closed: &mut Vec<Candle>) -> Result<(), IntegrityError> {
        self.validator.validate(&candle, self.last_closed.as_ref())?;
        self.last_closed = Some(candle.clone());
        closed.push(candle);
        Ok(())
    }
}
