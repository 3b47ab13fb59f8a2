use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A signed amount in the transaction's currency, rounded to cents.
/// Negative values are outflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_outflow(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Absolute distance between two amounts.
    pub fn delta(self, other: Money) -> Money {
        (self - other).abs()
    }

    /// `self / other`, or `None` when `other` is zero.
    pub fn ratio_of(self, other: Money) -> Option<Decimal> {
        if other.is_zero() {
            None
        } else {
            self.0.checked_div(other.0)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::str::FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s.trim()).map(Money::from_decimal)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::dec;

    #[test]
    fn from_cents_keeps_two_places() {
        assert_eq!(Money::from_cents(11900).as_decimal(), dec!(119.00));
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
    }

    #[test]
    fn from_decimal_rounds_to_cents() {
        assert_eq!(Money::from_decimal(dec!(10.005)).as_decimal(), dec!(10.00));
        assert_eq!(Money::from_decimal(dec!(10.015)).as_decimal(), dec!(10.02));
    }

    #[test]
    fn delta_is_symmetric() {
        let a = Money::from_cents(10000);
        let b = Money::from_cents(9950);
        assert_eq!(a.delta(b), b.delta(a));
        assert_eq!(a.delta(b), Money::from_cents(50));
    }

    #[test]
    fn ratio_of_zero_is_none() {
        assert_eq!(Money::from_cents(100).ratio_of(Money::zero()), None);
        assert_eq!(
            Money::from_cents(5000).ratio_of(Money::from_cents(10000)),
            Some(dec!(0.5))
        );
    }

    #[test]
    fn outflow_sign() {
        assert!(Money::from_cents(-100).is_outflow());
        assert!(!Money::from_cents(100).is_outflow());
        assert!(!Money::zero().is_outflow());
    }

    #[test]
    fn parses_plain_decimal() {
        assert_eq!("119.00".parse::<Money>().unwrap(), Money::from_cents(11900));
        assert!("abc".parse::<Money>().is_err());
    }
}
