use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{OrderIntent, OrderKind, Position};

/// Per-session risk limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Cap on a single entry, in quote currency
    pub max_position_size: Decimal,
    pub stoploss_pct: Decimal,
    pub risk_per_trade_pct: Decimal,
    /// Exchange minimum order, in base currency
    pub min_order_size: Decimal,
    /// Exchange lot step, in base currency
    pub size_increment: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    AlreadyPositioned,
    NoOpenPosition,
    InvalidPrice(Decimal),
    InsufficientEquity(Decimal),
    BelowMinimum { size: Decimal, minimum: Decimal },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::AlreadyPositioned => write!(f, "position is not flat"),
            RejectReason::NoOpenPosition => write!(f, "no open position to exit"),
            RejectReason::InvalidPrice(p) => write!(f, "invalid price hint {}", p),
            RejectReason::InsufficientEquity(e) => write!(f, "insufficient equity {}", e),
            RejectReason::BelowMinimum { size, minimum } => {
                write!(f, "size {} below exchange minimum {}", size, minimum)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved(OrderIntent),
    Rejected {
        intent: OrderIntent,
        reason: RejectReason,
    },
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved(_))
    }
}

/// Final gate between the strategy and the gateway
///
/// Rejections are terminal. Nothing is retried or queued.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Quote amount to commit on entry: `min(max_position_size, equity * risk / stoploss)`
    pub fn entry_notional(&self, equity: Decimal) -> Decimal {
        let at_risk = equity * self.config.risk_per_trade_pct;
        let sized = at_risk
            .checked_div(self.config.stoploss_pct)
            .unwrap_or(self.config.max_position_size);
        sized.min(self.config.max_position_size)
    }

    /// Size or reject an intent against the current position and equity
    pub fn evaluate(&self, intent: OrderIntent, position: &Position, equity: Decimal) -> RiskDecision {
        let result = match intent.kind {
            OrderKind::Enter => self.size_entry(&intent, position, equity),
            OrderKind::Exit | OrderKind::StoplossExit => self.size_exit(&intent, position),
        };

        match result {
            Ok(size) => RiskDecision::Approved(OrderIntent { size, ..intent }),
            Err(reason) => {
                tracing::warn!(kind = %intent.kind, %reason, "Order rejected by risk manager");
                RiskDecision::Rejected { intent, reason }
            }
        }
    }

    fn size_entry(&self, intent: &OrderIntent, position: &Position, equity: Decimal) -> Result<Decimal, RejectReason> {
        if !position.is_flat() {
            return Err(RejectReason::AlreadyPositioned);
        }
        if intent.price_hint <= Decimal::ZERO {
            return Err(RejectReason::InvalidPrice(intent.price_hint));
        }
        if equity <= Decimal::ZERO {
            return Err(RejectReason::InsufficientEquity(equity));
        }

        let notional = self.entry_notional(equity);
        let quantity = notional
            .checked_div(intent.price_hint)
            .map(|q| self.round_down(q))
            .unwrap_or(Decimal::ZERO);

        if quantity <= Decimal::ZERO || quantity < self.config.min_order_size {
            return Err(RejectReason::BelowMinimum {
                size: quantity,
                minimum: self.config.min_order_size,
            });
        }
        Ok(quantity)
    }

    fn size_exit(&self, intent: &OrderIntent, position: &Position) -> Result<Decimal, RejectReason> {
        if position.is_flat() || position.size <= Decimal::ZERO {
            return Err(RejectReason::NoOpenPosition);
        }
        if intent.price_hint <= Decimal::ZERO {
            return Err(RejectReason::InvalidPrice(intent.price_hint));
        }
        Ok(position.size)
    }

    fn round_down(&self, quantity: Decimal) -> Decimal {
        match quantity.checked_div(self.config.size_increment) {
            Some(steps) => (steps.floor() * self.config.size_increment).normalize(),
            None => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn config() -> RiskConfig {
        RiskConfig {
            max_position_size: dec!(5000),
            stoploss_pct: dec!(0.05),
            risk_per_trade_pct: dec!(0.01),
            min_order_size: dec!(0.001),
            size_increment: dec!(0.001),
        }
    }

    fn intent(kind: OrderKind, price: Decimal) -> OrderIntent {
        OrderIntent::new(kind, price, Decimal::ZERO, "test", Utc::now())
    }

    #[test]
    fn test_entry_notional_uses_risk_formula() {
        let risk = RiskManager::new(config());
        // 10000 * 0.01 / 0.05
        assert_eq!(risk.entry_notional(dec!(10000)), dec!(2000));
    }

    #[test]
    fn test_entry_notional_capped_by_max_position() {
        let risk = RiskManager::new(config());
        assert_eq!(risk.entry_notional(dec!(1000000)), dec!(5000));
    }

    #[test]
    fn test_entry_sized_in_base_units() {
        let risk = RiskManager::new(config());
        let decision = risk.evaluate(intent(OrderKind::Enter, dec!(400)), &Position::flat(), dec!(10000));

        match decision {
            RiskDecision::Approved(sized) => assert_eq!(sized.size, dec!(5)),
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_rounds_down_to_increment() {
        let risk = RiskManager::new(config());
        let decision = risk.evaluate(intent(OrderKind::Enter, dec!(3000)), &Position::flat(), dec!(10000));

        // 2000 / 3000 = 0.6666.. -> 0.666
        match decision {
            RiskDecision::Approved(sized) => assert_eq!(sized.size, dec!(0.666)),
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_rejected_when_long() {
        let risk = RiskManager::new(config());
        let position = Position::long(dec!(100), Utc::now(), dec!(1));
        let decision = risk.evaluate(intent(OrderKind::Enter, dec!(100)), &position, dec!(10000));

        assert!(matches!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::AlreadyPositioned,
                ..
            }
        ));
    }

    #[test]
    fn test_entry_rejected_below_minimum() {
        let risk = RiskManager::new(config());
        // notional 2 at price 100000 -> 0.00002 rounds to zero
        let decision = risk.evaluate(intent(OrderKind::Enter, dec!(100000)), &Position::flat(), dec!(10));

        assert!(matches!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::BelowMinimum { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_entry_rejected_without_equity() {
        let risk = RiskManager::new(config());
        let decision = risk.evaluate(intent(OrderKind::Enter, dec!(100)), &Position::flat(), Decimal::ZERO);
        assert!(!decision.is_approved());
    }

    #[test]
    fn test_exit_uses_full_position() {
        let risk = RiskManager::new(config());
        let position = Position::long(dec!(100), Utc::now(), dec!(1.234));

        for kind in [OrderKind::Exit, OrderKind::StoplossExit] {
            match risk.evaluate(intent(kind, dec!(94)), &position, dec!(10000)) {
                RiskDecision::Approved(sized) => assert_eq!(sized.size, dec!(1.234)),
                other => panic!("expected approval, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_exit_rejected_when_flat() {
        let risk = RiskManager::new(config());
        let decision = risk.evaluate(intent(OrderKind::Exit, dec!(100)), &Position::flat(), dec!(10000));

        assert!(matches!(
            decision,
            RiskDecision::Rejected {
                reason: RejectReason::NoOpenPosition,
                ..
            }
        ));
    }
}
