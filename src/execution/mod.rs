// Order execution: gateway seam and the paper-trading venue
pub mod gateway;
pub mod paper;

pub use gateway::OrderGateway;
pub use paper::{Balances, PaperGateway};
