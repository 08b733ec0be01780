// Trading strategy module
pub mod crossover;
pub mod transition;

pub use crossover::CrossoverStrategy;
pub use transition::{detect_crossover, transition, Crossover, Decision, MaPair};

use crate::indicators::IndicatorSnapshot;
use crate::models::{Fill, OrderIntent, Position};

/// Turns indicator snapshots into order intents and tracks the resulting position
pub trait Strategy: Send {
    /// React to a closed candle's indicators
    fn on_snapshot(&mut self, snapshot: &IndicatorSnapshot) -> Option<OrderIntent>;

    /// Absorb a snapshot without trading (warm-up from history)
    fn observe(&mut self, snapshot: &IndicatorSnapshot);

    /// Update the position from a confirmed fill
    fn apply_fill(&mut self, fill: &Fill);

    fn position(&self) -> &Position;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required before the strategy can act
    fn min_candles_required(&self) -> usize;
}
