use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "EGP";

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money, in minor units (piastres, cents).
///
/// All settlement arithmetic happens on whole minor units. Percentages are applied with [`Money::percent`], which
/// rounds half away from zero to the nearest minor unit.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an amount of money: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MoneyConversionError(format!("{value} is too large to convert to Money")))
    }
}

impl TryFrom<&str> for Money {
    type Error = MoneyConversionError;

    /// Parses a minor-unit integer string, as sent by the gateway in `amount_cents` fields.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value
            .trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| MoneyConversionError(format!("'{value}' is not a whole number of minor units. {e}")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns `pct` percent of this amount, rounded to the nearest minor unit. `pct` is clamped to `[0, 100]`.
    pub fn percent(&self, pct: f64) -> Self {
        let pct = if pct.is_nan() { 0.0 } else { pct.clamp(0.0, 100.0) };
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let amount = (self.0 as f64 * pct / 100.0).round() as i64;
        Self(amount)
    }

    /// Clamps negative amounts to zero.
    pub fn non_negative(self) -> Self {
        Self(self.0.max(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Money::from(50_000).to_string(), "500.00");
        assert_eq!(Money::from(5).to_string(), "0.05");
        assert_eq!(Money::from(-1_234).to_string(), "-12.34");
    }

    #[test]
    fn percentages_round_to_nearest_minor_unit() {
        let price = Money::from(999);
        assert_eq!(price.percent(10.0), Money::from(100));
        assert_eq!(price.percent(0.0), Money::zero());
        assert_eq!(price.percent(100.0), price);
        assert_eq!(price.percent(250.0), price);
        assert_eq!(price.percent(-5.0), Money::zero());
    }

    #[test]
    fn parse_minor_units() {
        assert_eq!(Money::try_from("50000").unwrap(), Money::from(50_000));
        assert!(Money::try_from("500.00").is_err());
        assert_eq!(Money::try_from(12u64).unwrap(), Money::from(12));
    }

    #[test]
    fn sums_and_serialization() {
        let total: Money = [100, 200, 300].into_iter().map(Money::from).sum();
        assert_eq!(total, Money::from_major(6));
        assert_eq!(serde_json::to_string(&total).unwrap(), "600");
        assert_eq!((Money::from(100) - Money::from(300)).non_negative(), Money::zero());
    }
}
