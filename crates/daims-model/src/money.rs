//! Fixed-point monetary values.
//!
//! Every monetary column in Files A/B/C and FABS is dollars-and-cents with
//! two fractional digits. Arithmetic runs in `rust_decimal` at full
//! precision; results are rounded to two places *after* aggregation and
//! compared exactly. Floats never enter the picture, so a reported total can
//! never miss a computed sum by a representation artifact.
//!
//! A blank cell and a zero cell are different things: "gross outlay was
//! zero" terminates a balance, "gross outlay was not reported" does not.
//! [`MoneyCell`] keeps that distinction (and keeps unparseable text around
//! for the per-row failure path instead of panicking mid-rule).

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A two-decimal fixed-point dollar amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Builds a value from a whole-dollar integer (test and fixture helper).
    pub fn from_dollars(dollars: i64) -> Self {
        Self(Decimal::from(dollars))
    }

    /// Rounds to two fractional digits, half away from zero.
    ///
    /// Applied once, after aggregation; addends are summed at full precision.
    pub fn round2(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Exact equality on the two-decimal rounding of both sides.
    pub fn eq_rounded(self, other: Money) -> bool {
        self.round2().0 == other.round2().0
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.round2().0;
        write!(f, "{rounded:.2}")
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

/// One monetary cell as submitted: blank, a parsed value, or text that did
/// not parse as a number (preserved verbatim for the synthetic format error).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum MoneyCell {
    #[default]
    Blank,
    Value(Money),
    Invalid(String),
}

impl MoneyCell {
    /// Parses submitted text. Whitespace-only input is blank, not invalid.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return MoneyCell::Blank;
        }
        match Money::from_str(trimmed) {
            Ok(value) => MoneyCell::Value(value),
            Err(_) => MoneyCell::Invalid(trimmed.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, MoneyCell::Blank)
    }

    pub fn value(&self) -> Option<Money> {
        match self {
            MoneyCell::Value(v) => Some(*v),
            MoneyCell::Blank | MoneyCell::Invalid(_) => None,
        }
    }

    /// Aggregate view: blank counts as zero, invalid text is an evaluation
    /// error (the caller reports a synthetic format error for the row).
    pub fn for_sum(&self) -> Result<Money, MoneyCellError> {
        match self {
            MoneyCell::Blank => Ok(Money::ZERO),
            MoneyCell::Value(v) => Ok(*v),
            MoneyCell::Invalid(raw) => Err(MoneyCellError::NotNumeric(raw.clone())),
        }
    }

    /// Renders the cell for error messages: blank cells display as empty.
    pub fn display_value(&self) -> String {
        match self {
            MoneyCell::Blank => String::new(),
            MoneyCell::Value(v) => v.to_string(),
            MoneyCell::Invalid(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyCellError {
    #[error("value is not numeric: {0:?}")]
    NotNumeric(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().expect("money literal")
    }

    #[test]
    fn sums_round_after_aggregation() {
        let addends = [money("0.005"), money("0.005"), money("0.01")];
        let total: Money = addends.into_iter().sum();
        assert_eq!(total.round2(), money("0.02"));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(money("2.345").round2(), money("2.35"));
        assert_eq!(money("-2.345").round2(), money("-2.35"));
        assert_eq!(money("2.344").round2(), money("2.34"));
    }

    #[test]
    fn eq_rounded_ignores_sub_cent_noise() {
        assert!(money("600.000").eq_rounded(money("600")));
        assert!(!money("600.01").eq_rounded(money("600")));
    }

    #[test]
    fn cell_distinguishes_blank_zero_and_garbage() {
        assert_eq!(MoneyCell::parse("  "), MoneyCell::Blank);
        assert_eq!(MoneyCell::parse("0"), MoneyCell::Value(Money::ZERO));
        assert_eq!(
            MoneyCell::parse("12,5"),
            MoneyCell::Invalid("12,5".to_string())
        );

        assert_eq!(MoneyCell::Blank.for_sum().unwrap(), Money::ZERO);
        assert!(MoneyCell::parse("abc").for_sum().is_err());
    }

    #[test]
    fn display_keeps_two_places() {
        assert_eq!(money("5").to_string(), "5.00");
        assert_eq!(money("-0.1").to_string(), "-0.10");
    }
}
