// Trade ingestion: feed adapters and replay filtering
pub mod bitfinex;
pub mod dedup;
pub mod replay;

pub use bitfinex::BitfinexTradeFeed;
pub use dedup::Deduplicator;
pub use replay::ReplayFeed;

use crate::models::Trade;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Source of normalized trades for one market
///
/// Implementations own reconnection. After a reconnect they may resend a bounded
/// window of recent trades; the pipeline filters those out.
#[async_trait]
pub trait TradeFeed: Send {
    /// Push trades into `sink` until the feed ends or the receiver is dropped
    async fn run(&mut self, sink: mpsc::Sender<Trade>) -> Result<()>;

    fn name(&self) -> &str;
}
