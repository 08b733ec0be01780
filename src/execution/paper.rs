use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderGateway;
use crate::models::{Fill, OrderIntent, OrderOutcome, TradeSide};
use crate::Result;

/// Simulated balances after each fill
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    pub base: Decimal,
    pub quote: Decimal,
}

/// Fills every affordable order immediately at its price hint, charging commission
///
/// Fees are paid in quote currency on both sides.
#[derive(Debug, Clone)]
pub struct PaperGateway {
    balances: Balances,
    commission_pct: Decimal,
    fills: Vec<Fill>,
    rejections: u64,
}

impl PaperGateway {
    pub fn new(quote_balance: Decimal, base_balance: Decimal, commission_pct: Decimal) -> Self {
        Self {
            balances: Balances {
                base: base_balance,
                quote: quote_balance,
            },
            commission_pct,
            fills: Vec::new(),
            rejections: 0,
        }
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn rejections(&self) -> u64 {
        self.rejections
    }

    pub fn mark_to_market(&self, mark_price: Decimal) -> Decimal {
        self.balances.quote + self.balances.base * mark_price
    }

    fn execute(&mut self, intent: &OrderIntent) -> std::result::Result<Fill, String> {
        if intent.size <= Decimal::ZERO {
            return Err(format!("non-positive size {}", intent.size));
        }
        if intent.price_hint <= Decimal::ZERO {
            return Err(format!("non-positive price {}", intent.price_hint));
        }

        let notional = intent.size * intent.price_hint;
        let fee = notional * self.commission_pct;

        match intent.kind.side() {
            TradeSide::Buy => {
                let cost = notional + fee;
                if cost > self.balances.quote {
                    return Err(format!(
                        "insufficient quote balance: need {}, have {}",
                        cost.round_dp(8),
                        self.balances.quote.round_dp(8)
                    ));
                }
                self.balances.quote -= cost;
                self.balances.base += intent.size;
            }
            TradeSide::Sell => {
                if intent.size > self.balances.base {
                    return Err(format!(
                        "insufficient base balance: need {}, have {}",
                        intent.size, self.balances.base
                    ));
                }
                self.balances.base -= intent.size;
                self.balances.quote += notional - fee;
            }
        }

        Ok(Fill {
            order_id: intent.id,
            kind: intent.kind,
            price: intent.price_hint,
            size: intent.size,
            fee,
            timestamp: intent.created_at,
        })
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(&mut self, intent: &OrderIntent) -> Result<OrderOutcome> {
        match self.execute(intent) {
            Ok(fill) => {
                self.fills.push(fill.clone());
                Ok(OrderOutcome::Filled(fill))
            }
            Err(reason) => {
                self.rejections += 1;
                Ok(OrderOutcome::Rejected { reason })
            }
        }
    }

    async fn equity(&mut self, mark_price: Decimal) -> Result<Decimal> {
        Ok(self.mark_to_market(mark_price))
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(kind: OrderKind, price: Decimal, size: Decimal) -> OrderIntent {
        OrderIntent::new(kind, price, size, "test", Utc::now())
    }

    #[tokio::test]
    async fn test_buy_then_sell_with_commission() {
        let mut gateway = PaperGateway::new(dec!(10000), Decimal::ZERO, dec!(0.001));

        let outcome = gateway.submit(&order(OrderKind::Enter, dec!(100), dec!(10))).await.unwrap();
        let OrderOutcome::Filled(fill) = outcome else {
            panic!("expected fill");
        };
        assert_eq!(fill.fee, dec!(1));
        assert_eq!(gateway.balances().quote, dec!(8999));
        assert_eq!(gateway.balances().base, dec!(10));

        gateway.submit(&order(OrderKind::Exit, dec!(110), dec!(10))).await.unwrap();
        // 1100 proceeds - 1.1 fee
        assert_eq!(gateway.balances().quote, dec!(10097.9));
        assert_eq!(gateway.balances().base, Decimal::ZERO);
        assert_eq!(gateway.fills().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_unaffordable_buy() {
        let mut gateway = PaperGateway::new(dec!(100), Decimal::ZERO, dec!(0.0012));
        let outcome = gateway.submit(&order(OrderKind::Enter, dec!(100), dec!(1))).await.unwrap();

        assert!(matches!(outcome, OrderOutcome::Rejected { .. }));
        assert_eq!(gateway.balances().quote, dec!(100));
        assert_eq!(gateway.rejections(), 1);
        assert!(gateway.fills().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_oversized_sell() {
        let mut gateway = PaperGateway::new(Decimal::ZERO, dec!(0.5), dec!(0.0012));
        let outcome = gateway.submit(&order(OrderKind::StoplossExit, dec!(100), dec!(1))).await.unwrap();
        assert!(matches!(outcome, OrderOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_equity_marks_base_holdings() {
        let mut gateway = PaperGateway::new(dec!(1000), dec!(2), dec!(0.0012));
        assert_eq!(gateway.equity(dec!(50)).await.unwrap(), dec!(1100));
    }
}
