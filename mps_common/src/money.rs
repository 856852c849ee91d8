use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY: &str = "usd";
/// Number of minor units (cents) in one major unit of the default currency.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------      Money       -------------------------------------------------------------
/// A monetary amount in the currency's smallest unit (e.g. cents).
///
/// All monetary arithmetic in the system is integer arithmetic on this type.
/// Conversion to and from decimal representations happens only at the
/// presentation boundary ([`Display`] and [`FromStr`]).
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
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
#[error("Value cannot be represented in minor units: {0}")]
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
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses a decimal amount ("12.34", "-0.05", "100") into minor units.
    /// At most two fractional digits are accepted; anything finer does not
    /// fit integer minor units and is rejected rather than rounded silently.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };
        if major.is_empty() && minor.is_empty() {
            return Err(MoneyConversionError(s.to_string()));
        }
        if minor.len() > 2 || !major.chars().all(|c| c.is_ascii_digit()) || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(s.to_string()));
        }
        let major = if major.is_empty() { 0 } else { major.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))? };
        let cents = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))? * 10,
            _ => minor.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))?,
        };
        major
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .and_then(|v| v.checked_add(cents))
            .and_then(|v| v.checked_mul(sign))
            .map(Self)
            .ok_or_else(|| MoneyConversionError(s.to_string()))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / MINOR_UNITS_PER_MAJOR as u64, abs % MINOR_UNITS_PER_MAJOR as u64)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major_units(major: i64) -> Self {
        Self(major * MINOR_UNITS_PER_MAJOR)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimal_round_trip() {
        for s in ["0.00", "0.05", "12.34", "100.00", "-0.05", "-12.34"] {
            let m = s.parse::<Money>().unwrap();
            assert_eq!(m.to_string(), s, "round trip failed for {s}");
        }
    }

    #[test]
    fn parse_shorthand_forms() {
        assert_eq!("100".parse::<Money>().unwrap(), Money::from(10_000));
        assert_eq!("1.5".parse::<Money>().unwrap(), Money::from(150));
        assert_eq!(".50".parse::<Money>().unwrap(), Money::from(50));
    }

    #[test]
    fn reject_sub_cent_precision() {
        assert!("1.005".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn arithmetic() {
        let a = Money::from(1500) * 2 + Money::from(400);
        assert_eq!(a, Money::from(3400));
        assert_eq!([Money::from(1), Money::from(2)].into_iter().sum::<Money>(), Money::from(3));
    }
}
