use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// Signed monetary amount, fixed to two decimal places.
///
/// The engine is single-currency; the configured default currency only
/// matters at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Money::from_decimal)
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn from_decimal_rounds_to_cents() {
        let m = Money::from_decimal(Decimal::from_str("1.005").unwrap());
        assert_eq!(m.to_string(), "1.00"); // banker's rounding
    }

    #[test]
    fn display_keeps_sign_and_two_places() {
        assert_eq!(money("-1500").to_string(), "-1500.00");
        assert_eq!(money("42.5").to_string(), "42.50");
    }

    #[test]
    fn arithmetic() {
        assert_eq!(money("10.00") + money("2.50"), money("12.50"));
        assert_eq!(money("10.00") - money("2.50"), money("7.50"));
        assert_eq!(-money("3.00"), money("-3.00"));
        assert_eq!(money("-3.00").abs(), money("3.00"));
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [money("1500.00"), money("-1500.00")].into_iter().sum();
        assert!(total.is_zero());
    }

    #[test]
    fn ordering() {
        assert!(money("-1500.00") < money("0.00"));
        assert!(money("10.01") > money("10.00"));
    }
}
