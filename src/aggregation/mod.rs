// Candle aggregation: trades in, contiguous validated candles out
pub mod aggregator;
pub mod converter;
pub mod history;
pub mod validator;

pub use aggregator::CandleAggregator;
pub use converter::trades_to_candles;
pub use history::CandleHistory;
pub use validator::CandleValidator;
