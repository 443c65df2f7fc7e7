//! Federal fiscal calendar.
//!
//! Fiscal year `Y` runs October 1 of calendar year `Y-1` through September
//! 30 of `Y`. Reporting periods 2..=12 map onto calendar months: period `p`
//! starts on the first day of month `((p + 8) mod 12) + 1` (period 2 =
//! November, period 12 = September; period 1 does not exist because October
//! reports combine into period 2). Quarterly submitters report periods 3, 6,
//! 9, 12.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FiscalYear(pub u16);

impl FiscalYear {
    /// October 1 of the prior calendar year.
    pub fn start(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(i32::from(self.0) - 1, 10, 1).expect("valid fiscal year start")
    }

    /// September 30 of the named calendar year.
    pub fn end(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(i32::from(self.0), 9, 30).expect("valid fiscal year end")
    }

    /// Inclusive on both ends.
    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    /// The fiscal year a calendar date falls in.
    pub fn of(date: NaiveDate) -> FiscalYear {
        if date.month() >= 10 {
            FiscalYear(u16::try_from(date.year() + 1).unwrap_or(0))
        } else {
            FiscalYear(u16::try_from(date.year()).unwrap_or(0))
        }
    }
}

impl std::fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FY{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FiscalPeriod(u8);

impl FiscalPeriod {
    pub fn new(period: u8) -> Result<Self, ModelError> {
        if (2..=12).contains(&period) {
            Ok(Self(period))
        } else {
            Err(ModelError::InvalidPeriod(period))
        }
    }

    /// Final period of a fiscal quarter (quarter 1 → period 3, … quarter 4
    /// → period 12), the period under which quarterly submitters file.
    pub fn from_quarter(quarter: u8) -> Result<Self, ModelError> {
        match quarter {
            1..=4 => Ok(Self(quarter * 3)),
            other => Err(ModelError::InvalidQuarter(other)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Calendar month this period covers: `((p + 8) mod 12) + 1`.
    pub fn calendar_month(self) -> u32 {
        u32::from((self.0 + 8) % 12) + 1
    }

    /// First day of the period within the given fiscal year.
    pub fn start(self, fiscal_year: FiscalYear) -> NaiveDate {
        let month = self.calendar_month();
        let year = if month >= 10 {
            i32::from(fiscal_year.0) - 1
        } else {
            i32::from(fiscal_year.0)
        };
        NaiveDate::from_ymd_opt(year, month, 1).expect("valid period start")
    }

    pub fn is_quarter_end(self) -> bool {
        self.0 % 3 == 0
    }
}

impl std::fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{:02}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fiscal_year_window_is_inclusive() {
        let fy = FiscalYear(2016);
        assert_eq!(fy.start(), date(2015, 10, 1));
        assert_eq!(fy.end(), date(2016, 9, 30));
        assert!(fy.contains(date(2015, 10, 1)));
        assert!(fy.contains(date(2016, 9, 30)));
        assert!(!fy.contains(date(2016, 10, 1)));
    }

    #[test]
    fn fiscal_year_of_rolls_in_october() {
        assert_eq!(FiscalYear::of(date(2015, 9, 30)), FiscalYear(2015));
        assert_eq!(FiscalYear::of(date(2015, 10, 1)), FiscalYear(2016));
    }

    #[test]
    fn period_months_follow_the_offset_formula() {
        assert_eq!(FiscalPeriod::new(2).unwrap().calendar_month(), 11);
        assert_eq!(FiscalPeriod::new(4).unwrap().calendar_month(), 1);
        assert_eq!(FiscalPeriod::new(12).unwrap().calendar_month(), 9);
    }

    #[test]
    fn period_start_crosses_the_calendar_year() {
        let fy = FiscalYear(2020);
        assert_eq!(
            FiscalPeriod::new(2).unwrap().start(fy),
            date(2019, 11, 1)
        );
        assert_eq!(FiscalPeriod::new(4).unwrap().start(fy), date(2020, 1, 1));
    }

    #[test]
    fn quarters_map_to_final_periods() {
        assert_eq!(FiscalPeriod::from_quarter(1).unwrap().get(), 3);
        assert_eq!(FiscalPeriod::from_quarter(4).unwrap().get(), 12);
        assert!(FiscalPeriod::from_quarter(5).is_err());
        assert!(FiscalPeriod::new(1).is_err());
        assert!(FiscalPeriod::new(13).is_err());
    }
}
