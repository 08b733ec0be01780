// Risk management: sizes entries, vets exits
pub mod manager;

pub use manager::{RejectReason, RiskConfig, RiskDecision, RiskManager};
