use async_trait::async_trait;
use tokio::sync::mpsc;

use super::TradeFeed;
use crate::models::Trade;
use crate::Result;

/// Feeds a fixed list of trades, e.g. recorded history or a synthetic scenario
pub struct ReplayFeed {
    trades: Vec<Trade>,
}

impl ReplayFeed {
    pub fn new(trades: Vec<Trade>) -> Self {
        Self { trades }
    }
}

#[async_trait]
impl TradeFeed for ReplayFeed {
    async fn run(&mut self, sink: mpsc::Sender<Trade>) -> Result<()> {
        let trades = std::mem::take(&mut self.trades);
        let total = trades.len();

        for trade in trades {
            if sink.send(trade).await.is_err() {
                tracing::debug!("Replay receiver dropped, stopping early");
                return Ok(());
            }
        }

        tracing::info!(trades = total, "Replay feed exhausted");
        Ok(())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
