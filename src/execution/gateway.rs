use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{OrderIntent, OrderOutcome};
use crate::Result;

/// Where approved orders go
///
/// `submit` resolves once the venue has either filled or rejected the order. The
/// pipeline bounds it with a timeout; the gateway itself need not.
#[async_trait]
pub trait OrderGateway: Send {
    async fn submit(&mut self, intent: &OrderIntent) -> Result<OrderOutcome>;

    /// Account value in quote currency, marking base holdings at `mark_price`
    async fn equity(&mut self, mark_price: Decimal) -> Result<Decimal>;

    fn name(&self) -> &str;
}
