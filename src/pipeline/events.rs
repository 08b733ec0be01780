use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSnapshot;
use crate::models::{Candle, Fill, OrderIntent, Trade};

/// Everything observers can see, in pipeline order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A novel trade, after deduplication
    Trade(Trade),
    /// The in-progress candle after absorbing a trade
    CandleUpdated(Candle),
    CandleClosed(Candle),
    Indicators(IndicatorSnapshot),
    OrderFilled(Fill),
    OrderRejected { intent: OrderIntent, reason: String },
    Halted { reason: String },
}
