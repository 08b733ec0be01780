use rust_decimal::Decimal;

use super::transition::{transition, MaPair};
use super::Strategy;
use crate::indicators::engine::{FAST, SLOW};
use crate::indicators::IndicatorSnapshot;
use crate::models::{Fill, OrderKind, OrderIntent, Position};

/// Moving average crossover with a fixed-percentage stoploss
///
/// Owns the position. The position only changes through [`Strategy::apply_fill`].
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    stoploss_pct: Decimal,
    min_candles: usize,
    position: Position,
    previous: Option<MaPair>,
}

impl CrossoverStrategy {
    pub fn new(stoploss_pct: Decimal, min_candles: usize) -> Self {
        Self {
            stoploss_pct,
            min_candles,
            position: Position::flat(),
            previous: None,
        }
    }

    /// Start from a known position, e.g. restored after a restart
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    fn read_pair(snapshot: &IndicatorSnapshot) -> Option<MaPair> {
        Some(MaPair {
            fast: snapshot.scalar(FAST)?,
            slow: snapshot.scalar(SLOW)?,
        })
    }
}

impl Strategy for CrossoverStrategy {
    fn on_snapshot(&mut self, snapshot: &IndicatorSnapshot) -> Option<OrderIntent> {
        let current = Self::read_pair(snapshot);
        let decision = transition(
            &self.position,
            self.previous,
            current,
            snapshot.close,
            self.stoploss_pct,
        );
        self.previous = current;

        let decision = decision?;
        let size = match decision.kind {
            OrderKind::Enter => Decimal::ZERO,
            OrderKind::Exit | OrderKind::StoplossExit => self.position.size,
        };

        Some(OrderIntent::new(
            decision.kind,
            snapshot.close,
            size,
            decision.reason,
            snapshot.close_time,
        ))
    }

    fn observe(&mut self, snapshot: &IndicatorSnapshot) {
        self.previous = Self::read_pair(snapshot);
    }

    fn apply_fill(&mut self, fill: &Fill) {
        match fill.kind {
            OrderKind::Enter if self.position.is_flat() => {
                self.position = Position::long(fill.price, fill.timestamp, fill.size);
            }
            OrderKind::Exit | OrderKind::StoplossExit if !self.position.is_flat() => {
                self.position = Position::flat();
            }
            _ => {
                tracing::warn!(
                    kind = %fill.kind,
                    state = ?self.position.state,
                    "Ignoring fill that does not match the position"
                );
            }
        }
    }

    fn position(&self) -> &Position {
        &self.position
    }

    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn min_candles_required(&self) -> usize {
        self.min_candles
    }
}
