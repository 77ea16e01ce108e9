//! Currency amounts. Everything is `Decimal` with two places; floats never
//! touch a stored value.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Scale used for every stored amount.
pub const AMOUNT_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(12,2)` column holds.
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, AMOUNT_SCALE)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("{0} must be at most {1}")]
    TooLarge(&'static str, Decimal),
    #[error("sum of amounts overflows")]
    Overflow,
}

/// Validates a user-supplied amount and rounds it to cents.
pub fn checked_amount(field: &'static str, amount: Decimal) -> Result<Decimal, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(field));
    }
    let max = max_amount();
    let rounded = to_cents(amount);
    if amount > max || rounded > max {
        return Err(AmountError::TooLarge(field, max));
    }
    Ok(rounded)
}

pub fn total<I: IntoIterator<Item = Decimal>>(amounts: I) -> Result<Decimal, AmountError> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, a| acc.checked_add(a))
        .map(to_cents)
        .ok_or(AmountError::Overflow)
}

/// Rounds half away from zero to two places and pins the scale, so
/// `200` renders as `200.00`.
pub fn to_cents(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(AMOUNT_SCALE);
    rounded
}

pub fn net(credit: Decimal, debit: Decimal) -> Decimal {
    to_cents(credit - debit)
}

pub fn format_amount(amount: Decimal) -> String {
    to_cents(amount).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_net_value_is_exact() {
        assert_eq!(net(dec!(200.00), dec!(50.00)), dec!(150.00));
        assert_eq!(format_amount(net(dec!(200.00), dec!(50.00))), "150.00");
    }

    #[test]
    fn test_no_drift_after_repeated_cycles() {
        let mut balance = dec!(0.00);
        for _ in 0..10_000 {
            balance += dec!(200.00);
            balance -= dec!(50.00);
            balance += dec!(0.10);
            balance -= dec!(0.10);
        }
        assert_eq!(balance, dec!(1500000.00));

        for _ in 0..10_000 {
            balance -= dec!(150.00);
        }
        assert_eq!(format_amount(balance), "0.00");
    }

    #[test]
    fn test_checked_amount_bounds() {
        assert_eq!(checked_amount("credit", dec!(9999999999.99)).unwrap().to_string(), "9999999999.99");
        assert_eq!(checked_amount("debit", dec!(-0.01)), Err(AmountError::Negative("debit")));
        assert!(matches!(checked_amount("credit", dec!(10000000000)), Err(AmountError::TooLarge("credit", _))));
        assert!(matches!(
            checked_amount("credit", dec!(40000000000000000000000000000)),
            Err(AmountError::TooLarge(..))
        ));
        assert_eq!(
            checked_amount("credit", dec!(-5)).unwrap_err().to_string(),
            "credit must not be negative"
        );
    }

    #[test]
    fn test_total_reports_overflow() {
        assert_eq!(total(vec![dec!(0.10), dec!(0.20)]).unwrap().to_string(), "0.30");
        assert_eq!(total(Vec::new()).unwrap().to_string(), "0.00");
        assert_eq!(total(vec![Decimal::MAX, Decimal::MAX]), Err(AmountError::Overflow));
    }

    #[test]
    fn test_to_cents_rounds_half_away_from_zero() {
        assert_eq!(to_cents(dec!(1.005)).to_string(), "1.01");
        assert_eq!(to_cents(dec!(1.004)).to_string(), "1.00");
        assert_eq!(to_cents(dec!(200)).to_string(), "200.00");
        assert_eq!(to_cents(dec!(-2.345)).to_string(), "-2.35");
    }
}
