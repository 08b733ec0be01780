use chrono::Duration;
use rust_decimal::Decimal;

use crate::error::IntegrityError;
use crate::models::Candle;

/// Checks the invariants every closed candle must satisfy
#[derive(Debug, Clone)]
pub struct CandleValidator {
    interval: Duration,
}

impl CandleValidator {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Validate a candle, and its contiguity with the previous one when given
    pub fn validate(&self, candle: &Candle, previous: Option<&Candle>) -> Result<(), IntegrityError> {
        self.validate_prices(candle)?;
        self.validate_ohlc_relationship(candle)?;
        self.validate_span(candle)?;
        if let Some(previous) = previous {
            self.validate_contiguity(previous, candle)?;
        }
        Ok(())
    }

    /// Validate that a run of candles is internally consistent and gap-free
    pub fn validate_sequence(&self, candles: &[Candle]) -> Result<(), IntegrityError> {
        let mut previous: Option<&Candle> = None;
        for candle in candles {
            self.validate(candle, previous)?;
            previous = Some(candle);
        }
        Ok(())
    }

    fn validate_prices(&self, candle: &Candle) -> Result<(), IntegrityError> {
        for price in [candle.open, candle.high, candle.low, candle.close] {
            if price <= Decimal::ZERO {
                return Err(IntegrityError::NonPositivePrice {
                    open_time: candle.open_time,
                    price,
                });
            }
        }
        // Volume can be zero (synthetic gap candles)
        if candle.volume < Decimal::ZERO {
            return Err(IntegrityError::NegativeVolume {
                open_time: candle.open_time,
                volume: candle.volume,
            });
        }
        Ok(())
    }

    fn validate_ohlc_relationship(&self, candle: &Candle) -> Result<(), IntegrityError> {
        let within = |p: Decimal| candle.low <= p && p <= candle.high;

        if !within(candle.open) || !within(candle.close) {
            return Err(IntegrityError::OhlcBounds {
                open_time: candle.open_time,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
            });
        }
        Ok(())
    }

    fn validate_span(&self, candle: &Candle) -> Result<(), IntegrityError> {
        let span = candle.close_time - candle.open_time;
        if span != self.interval {
            return Err(IntegrityError::WrongSpan {
                open_time: candle.open_time,
                actual_secs: span.num_seconds(),
                expected_secs: self.interval.num_seconds(),
            });
        }
        Ok(())
    }

    fn validate_contiguity(&self, previous: &Candle, candle: &Candle) -> Result<(), IntegrityError> {
        if candle.open_time != previous.close_time {
            return Err(IntegrityError::NotContiguous {
                expected: previous.close_time,
                got: candle.open_time,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn make_valid_candle(minute: i64) -> Candle {
        let open_time = Utc.timestamp_opt(1_700_000_000 - 1_700_000_000 % 60, 0).unwrap()
            + Duration::minutes(minute);
        Candle {
            open_time,
            close_time: open_time + Duration::minutes(1),
            open: dec!(100),
            high: dec!(102),
            low: dec!(99),
            close: dec!(101),
            volume: dec!(12.5),
        }
    }

    fn validator() -> CandleValidator {
        CandleValidator::new(Duration::minutes(1))
    }

    #[test]
    fn test_validate_valid_candle() {
        assert!(validator().validate(&make_valid_candle(0), None).is_ok());
    }

    #[test]
    fn test_validate_negative_open() {
        let mut candle = make_valid_candle(0);
        candle.open = dec!(-100);

        let result = validator().validate(&candle, None);
        assert!(matches!(result, Err(IntegrityError::NonPositivePrice { .. })));
    }

    #[test]
    fn test_validate_close_above_high() {
        let mut candle = make_valid_candle(0);
        candle.close = dec!(103);

        let result = validator().validate(&candle, None);
        assert!(matches!(result, Err(IntegrityError::OhlcBounds { .. })));
    }

    #[test]
    fn test_validate_open_below_low() {
        let mut candle = make_valid_candle(0);
        candle.open = dec!(98);

        let result = validator().validate(&candle, None);
        assert!(matches!(result, Err(IntegrityError::OhlcBounds { .. })));
    }

    #[test]
    fn test_zero_volume_is_allowed() {
        let mut candle = make_valid_candle(0);
        candle.volume = Decimal::ZERO;
        assert!(validator().validate(&candle, None).is_ok());
    }

    #[test]
    fn test_negative_volume_is_rejected() {
        let mut candle = make_valid_candle(0);
        candle.volume = dec!(-1);
        assert!(matches!(
            validator().validate(&candle, None),
            Err(IntegrityError::NegativeVolume { .. })
        ));
    }

    #[test]
    fn test_wrong_span() {
        let mut candle = make_valid_candle(0);
        candle.close_time = candle.open_time + Duration::minutes(5);

        let result = validator().validate(&candle, None);
        assert!(matches!(
            result,
            Err(IntegrityError::WrongSpan {
                actual_secs: 300,
                expected_secs: 60,
                ..
            })
        ));
    }

    #[test]
    fn test_contiguity() {
        let first = make_valid_candle(0);
        let second = make_valid_candle(1);
        let third = make_valid_candle(3);

        assert!(validator().validate(&second, Some(&first)).is_ok());
        assert!(matches!(
            validator().validate(&third, Some(&second)),
            Err(IntegrityError::NotContiguous { .. })
        ));
    }

    #[test]
    fn test_validate_sequence() {
        let candles: Vec<Candle> = (0..5).map(make_valid_candle).collect();
        assert!(validator().validate_sequence(&candles).is_ok());

        let gapped = vec![make_valid_candle(0), make_valid_candle(2)];
        assert!(validator().validate_sequence(&gapped).is_err());
    }
}
