use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use super::TradeFeed;
use crate::models::{Market, Trade};

const BITFINEX_API_BASE: &str = "https://api-pub.bitfinex.com";
const RATE_LIMIT_RPM: u32 = 30;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const PAGE_LIMIT: usize = 120;

type FeedRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Raw v2 trade row: `[ID, MTS, AMOUNT, PRICE]`, AMOUNT negative for sells
type RawTrade = (u64, i64, Decimal, Decimal);

/// Polls Bitfinex's public trade history for one market
///
/// Pages forward in time from a cursor: oldest first, and a full page is followed
/// immediately by the next one, so a burst between polls is never skipped. Pages
/// start at the cursor's millisecond inclusive; trades at or before the last one
/// delivered are filtered here.
pub struct BitfinexTradeFeed {
    client: Client,
    base_url: String,
    symbol: String,
    poll_interval: Duration,
    rate_limiter: Arc<FeedRateLimiter>,
    cursor_ms: Option<i64>,
    last_delivered: Option<(i64, u64)>,
}

impl BitfinexTradeFeed {
    pub fn new(market: &Market, poll_interval: Duration) -> Result<Self> {
        Self::with_base_url(market, poll_interval, BITFINEX_API_BASE)
    }

    /// Point the feed at another host (used by tests)
    pub fn with_base_url(
        market: &Market,
        poll_interval: Duration,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into(),
            symbol: format!("t{}", market.pair()),
            poll_interval,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            cursor_ms: None,
            last_delivered: None,
        })
    }

    /// Skip history before `since` on the first poll (trades already backfilled)
    pub fn resume_from(mut self, since: chrono::DateTime<Utc>) -> Self {
        self.cursor_ms = Some(since.timestamp_millis());
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Fetch one page of trades at or after `start_ms`, oldest first
    ///
    /// Without a start, Bitfinex returns the oldest trades it has, so the first poll
    /// of a fresh session asks for the newest page instead.
    pub async fn fetch_since(&self, start_ms: Option<i64>) -> Result<Vec<Trade>> {
        let sort = if start_ms.is_some() { 1 } else { -1 };
        let mut url = format!(
            "{}/v2/trades/{}/hist?limit={}&sort={}",
            self.base_url, self.symbol, PAGE_LIMIT, sort
        );
        if let Some(start) = start_ms {
            url.push_str(&format!("&start={}", start));
        }

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .context("Bitfinex returned an error status")?;

        let rows: Vec<RawTrade> = response
            .json()
            .await
            .context("Failed to decode Bitfinex trades")?;

        Ok(parse_rows(rows))
    }

    /// Fetch with exponential backoff on transient failures
    async fn fetch_with_retry(&self) -> Result<Vec<Trade>> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_since(self.cursor_ms).await {
                Ok(trades) => return Ok(trades),
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {:#}. Retrying in {}ms...",
                            attempt,
                            MAX_RETRIES,
                            self.symbol,
                            e,
                            backoff_ms
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }

    /// Keep trades newer than the last delivered one and move the cursor past them
    ///
    /// Returns the fresh trades and whether another page should be fetched right away.
    fn advance(&mut self, page: Vec<Trade>) -> (Vec<Trade>, bool) {
        let full = page.len() >= PAGE_LIMIT;
        let last_delivered = self.last_delivered;

        let fresh: Vec<Trade> = page
            .into_iter()
            .filter(|t| {
                last_delivered.map_or(true, |seen| (t.timestamp.timestamp_millis(), t.id) > seen)
            })
            .collect();

        if let Some(newest) = fresh.last() {
            let ms = newest.timestamp.timestamp_millis();
            self.last_delivered = Some((ms, newest.id));
            self.cursor_ms = Some(ms);
            return (fresh, full);
        }

        if full {
            // a whole page inside one millisecond: step over it rather than spin
            if let Some(cursor) = self.cursor_ms.as_mut() {
                *cursor += 1;
                tracing::warn!(
                    symbol = %self.symbol,
                    cursor = *cursor,
                    "Page held no new trades; skipping ahead one millisecond"
                );
            }
        }
        (fresh, full)
    }
}

/// Convert raw rows to trades sorted by (timestamp, id)
fn parse_rows(rows: Vec<RawTrade>) -> Vec<Trade> {
    let mut trades: Vec<Trade> = rows
        .into_iter()
        .filter_map(|(id, mts, amount, price)| {
            let timestamp = Utc.timestamp_millis_opt(mts).single()?;
            if price <= Decimal::ZERO {
                tracing::warn!(id, %price, "Skipping malformed trade");
                return None;
            }
            Some(Trade::from_signed(id, timestamp, price, amount))
        })
        .collect();

    trades.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    trades
}

#[async_trait]
impl TradeFeed for BitfinexTradeFeed {
    async fn run(&mut self, sink: mpsc::Sender<Trade>) -> crate::Result<()> {
        tracing::info!(symbol = %self.symbol, "Starting Bitfinex trade poller");

        loop {
            match self.fetch_with_retry().await {
                Ok(page) => {
                    let (trades, more) = self.advance(page);
                    for trade in trades {
                        if sink.send(trade).await.is_err() {
                            tracing::info!("Trade receiver closed, stopping poller");
                            return Ok(());
                        }
                    }
                    if more {
                        tracing::debug!(symbol = %self.symbol, "Full page, fetching the next one");
                        continue;
                    }
                }
                Err(e) => {
                    // transient: the next poll resumes from the same cursor
                    tracing::warn!(symbol = %self.symbol, "Trade poll failed: {:#}", e);
                }
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = sink.closed() => {
                    tracing::info!("Trade receiver closed, stopping poller");
                    return Ok(());
                }
            }
        }
    }

    fn name(&self) -> &str {
        "bitfinex"
    }
}
