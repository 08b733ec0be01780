//! The FLAT/LONG state machine as a pure function

use rust_decimal::Decimal;

use crate::models::{OrderKind, Position, PositionState};

/// Fast and slow moving average at one candle close
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaPair {
    pub fast: f64,
    pub slow: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    Above,
    Below,
}

/// What the state machine wants done, before sizing
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub kind: OrderKind,
    pub reason: String,
}

/// Strict crossover between two consecutive readings
///
/// Touching (fast == slow) is not a cross; the cross happens when fast moves
/// strictly past slow.
pub fn detect_crossover(prev: MaPair, curr: MaPair) -> Option<Crossover> {
    if prev.fast <= prev.slow && curr.fast > curr.slow {
        Some(Crossover::Above)
    } else if prev.fast >= prev.slow && curr.fast < curr.slow {
        Some(Crossover::Below)
    } else {
        None
    }
}

/// Next action given the position, the last two MA readings and the close
///
/// Stoploss is checked first and wins over a simultaneous downward cross.
pub fn transition(
    position: &Position,
    prev: Option<MaPair>,
    curr: Option<MaPair>,
    price: Decimal,
    stoploss_pct: Decimal,
) -> Option<Decision> {
    if let Some(stop) = position.stoploss_price(stoploss_pct) {
        if price <= stop {
            return Some(Decision {
                kind: OrderKind::StoplossExit,
                reason: format!("stoploss: close {} <= stop {}", price, stop.normalize()),
            });
        }
    }

    let (prev, curr) = (prev?, curr?);
    let crossover = detect_crossover(prev, curr)?;

    match (position.state, crossover) {
        (PositionState::Flat, Crossover::Above) => Some(Decision {
            kind: OrderKind::Enter,
            reason: format!("fast {:.4} crossed above slow {:.4}", curr.fast, curr.slow),
        }),
        (PositionState::Long, Crossover::Below) => Some(Decision {
            kind: OrderKind::Exit,
            reason: format!("fast {:.4} crossed below slow {:.4}", curr.fast, curr.slow),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn pair(fast: f64, slow: f64) -> Option<MaPair> {
        Some(MaPair { fast, slow })
    }

    fn long_at(entry: Decimal) -> Position {
        Position::long(entry, Utc::now(), dec!(1))
    }

    #[test]
    fn test_strict_crossover() {
        let below = MaPair { fast: 9.0, slow: 10.0 };
        let equal = MaPair { fast: 10.0, slow: 10.0 };
        let above = MaPair { fast: 11.0, slow: 10.0 };

        assert_eq!(detect_crossover(below, above), Some(Crossover::Above));
        assert_eq!(detect_crossover(equal, above), Some(Crossover::Above));
        assert_eq!(detect_crossover(below, equal), None);
        assert_eq!(detect_crossover(above, above), None);
        assert_eq!(detect_crossover(above, below), Some(Crossover::Below));
        assert_eq!(detect_crossover(equal, below), Some(Crossover::Below));
    }

    #[test]
    fn test_flat_enters_on_upward_cross() {
        let decision = transition(&Position::flat(), pair(9.0, 10.0), pair(11.0, 10.0), dec!(100), dec!(0.05));
        assert_eq!(decision.unwrap().kind, OrderKind::Enter);
    }

    #[test]
    fn test_flat_ignores_downward_cross() {
        let decision = transition(&Position::flat(), pair(11.0, 10.0), pair(9.0, 10.0), dec!(100), dec!(0.05));
        assert!(decision.is_none());
    }

    #[test]
    fn test_long_ignores_upward_cross() {
        let decision = transition(&long_at(dec!(100)), pair(9.0, 10.0), pair(11.0, 10.0), dec!(101), dec!(0.05));
        assert!(decision.is_none());
    }

    #[test]
    fn test_long_exits_on_downward_cross() {
        let decision = transition(&long_at(dec!(100)), pair(11.0, 10.0), pair(9.0, 10.0), dec!(99), dec!(0.05));
        assert_eq!(decision.unwrap().kind, OrderKind::Exit);
    }

    #[test]
    fn test_needs_two_readings() {
        assert!(transition(&Position::flat(), None, pair(11.0, 10.0), dec!(100), dec!(0.05)).is_none());
    }

    #[test]
    fn test_stoploss_triggers_without_crossover() {
        // entry 100, stop 5%: close 94 must exit
        let decision = transition(&long_at(dec!(100)), None, None, dec!(94), dec!(0.05)).unwrap();
        assert_eq!(decision.kind, OrderKind::StoplossExit);
        assert!(decision.reason.starts_with("stoploss"));
    }

    #[test]
    fn test_stoploss_boundary_is_inclusive() {
        let decision = transition(&long_at(dec!(100)), None, None, dec!(95), dec!(0.05));
        assert_eq!(decision.unwrap().kind, OrderKind::StoplossExit);

        assert!(transition(&long_at(dec!(100)), None, None, dec!(95.01), dec!(0.05)).is_none());
    }

    #[test]
    fn test_stoploss_wins_over_crossover_exit() {
        let decision = transition(&long_at(dec!(100)), pair(11.0, 10.0), pair(9.0, 10.0), dec!(90), dec!(0.05));
        assert_eq!(decision.unwrap().kind, OrderKind::StoplossExit);
    }
}
