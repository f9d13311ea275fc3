use crate::error::{CashflowError, Result};
use chrono::{Datelike, Days, NaiveDate};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month in `YYYY-MM` form. Used by monthly records, bank
/// balances, budgets and month statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

/// A billing period in the six-digit `YYYYMM` form used by billing rows.
///
/// Deliberately a separate type from [`YearMonth`]: converting between the
/// two goes through [`YearMonth::to_billing_month`] and
/// [`BillingMonth::to_year_month`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingMonth(YearMonth);

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(CashflowError::InvalidYearMonth(format!(
                "{:04}-{:02}",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        last_day_of_month(self.year, self.month)
    }

    /// The date in this month falling on `day`, clamped to the last day of
    /// the month (a due day of 31 lands on Feb 28/29).
    pub fn day_clamped(&self, day: u32) -> NaiveDate {
        let last = self.last_day();
        let day = day.clamp(1, last.day());
        NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap_or(last)
    }

    /// Moves by `delta` months (negative moves backwards), or `None` when the
    /// result leaves years 1..=9999.
    pub fn checked_shift(&self, delta: i32) -> Option<Self> {
        let index = (self.year * 12 + (self.month as i32 - 1)).checked_add(delta)?;
        let year = index.div_euclid(12);
        if !(1..=9999).contains(&year) {
            return None;
        }
        Some(Self {
            year,
            month: index.rem_euclid(12) as u32 + 1,
        })
    }

    /// Like [`checked_shift`](Self::checked_shift), saturating at 0001-01 and
    /// 9999-12.
    pub fn shift(&self, delta: i32) -> Self {
        self.checked_shift(delta).unwrap_or(if delta < 0 {
            Self { year: 1, month: 1 }
        } else {
            Self {
                year: 9999,
                month: 12,
            }
        })
    }

    pub fn previous(&self, n: u32) -> Self {
        self.shift(-(n as i32))
    }

    pub fn next(&self, n: u32) -> Self {
        self.shift(n as i32)
    }

    /// The `count` months immediately preceding this one, nearest first.
    pub fn preceding(&self, count: u32) -> Vec<YearMonth> {
        (1..=count).map(|i| self.previous(i)).collect()
    }

    /// `count` months ending at (and including) this one, oldest first.
    pub fn window_ending_here(&self, count: u32) -> Vec<YearMonth> {
        (0..count).rev().map(|i| self.previous(i)).collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn to_billing_month(&self) -> BillingMonth {
        BillingMonth(*self)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = CashflowError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CashflowError::InvalidYearMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for YearMonth {
    type Error = CashflowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl JsonSchema for YearMonth {
    fn schema_name() -> String {
        "YearMonth".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

impl BillingMonth {
    pub fn to_year_month(&self) -> YearMonth {
        self.0
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.0.year, self.0.month)
    }
}

impl FromStr for BillingMonth {
    type Err = CashflowError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || CashflowError::InvalidBillingMonth(s.to_string());
        if s.len() != 6 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = s[..4].parse().map_err(|_| invalid())?;
        let month: u32 = s[4..].parse().map_err(|_| invalid())?;
        YearMonth::new(year, month)
            .map(BillingMonth)
            .map_err(|_| invalid())
    }
}

impl TryFrom<String> for BillingMonth {
    type Error = CashflowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BillingMonth> for String {
    fn from(value: BillingMonth) -> Self {
        value.to_string()
    }
}

impl From<YearMonth> for BillingMonth {
    fn from(value: YearMonth) -> Self {
        value.to_billing_month()
    }
}

impl JsonSchema for BillingMonth {
    fn schema_name() -> String {
        "BillingMonth".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .unwrap_or(NaiveDate::MAX)
}

pub fn months_between(start: YearMonth, end: YearMonth) -> i32 {
    let year_diff = end.year - start.year;
    let month_diff = end.month as i32 - start.month as i32;
    year_diff * 12 + month_diff
}

/// Rounds half-way cases towards positive infinity, so `2.5 -> 3` and
/// `-2.5 -> -2`. All yen amounts in the crate are rounded this way.
pub fn round_half_up(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    (value + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let month = ym("2024-03");
        assert_eq!(month.year(), 2024);
        assert_eq!(month.month(), 3);
        assert_eq!(month.to_string(), "2024-03");

        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("202403".parse::<YearMonth>().is_err());
        assert!("2024-3".parse::<YearMonth>().is_err());
        assert!("__RATIO__".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_billing_month_conversion() {
        let billing: BillingMonth = "202401".parse().unwrap();
        assert_eq!(billing.to_year_month(), ym("2024-01"));
        assert_eq!(ym("2023-11").to_billing_month().to_string(), "202311");

        assert!("2024-01".parse::<BillingMonth>().is_err());
        assert!("20241".parse::<BillingMonth>().is_err());
    }

    #[test]
    fn test_shift_across_year_boundary() {
        assert_eq!(ym("2024-01").previous(1), ym("2023-12"));
        assert_eq!(ym("2024-02").previous(3), ym("2023-11"));
        assert_eq!(ym("2023-12").next(1), ym("2024-01"));
        assert_eq!(ym("2024-05").shift(-17), ym("2022-12"));
        assert_eq!(
            ym("2024-02").preceding(3),
            vec![ym("2024-01"), ym("2023-12"), ym("2023-11")]
        );
        assert_eq!(
            ym("2024-02").window_ending_here(3),
            vec![ym("2023-12"), ym("2024-01"), ym("2024-02")]
        );
    }

    #[test]
    fn test_shift_stays_within_four_digit_years() {
        assert_eq!(ym("9999-12").checked_shift(1), None);
        assert_eq!(ym("0001-01").checked_shift(-1), None);
        assert_eq!(ym("9999-11").checked_shift(1), Some(ym("9999-12")));

        let last = ym("9999-12").next(1);
        assert_eq!(last, ym("9999-12"));
        assert_eq!(last.to_string().parse::<YearMonth>().unwrap(), last);
        assert_eq!(ym("0001-03").previous(5), ym("0001-01"));
    }

    #[test]
    fn test_day_clamped() {
        assert_eq!(
            ym("2023-02").day_clamped(31),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            ym("2024-02").day_clamped(30),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            ym("2024-04").day_clamped(10),
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()
        );
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2023, 12),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between(ym("2023-11"), ym("2024-02")), 3);
        assert_eq!(months_between(ym("2024-02"), ym("2024-02")), 0);
        assert_eq!(months_between(ym("2024-02"), ym("2023-02")), -12);
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.4999), 2);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(-2.6), -3);
        assert_eq!(round_half_up(f64::NAN), 0);
    }

    #[test]
    fn test_serde_as_strings() {
        let json = serde_json::to_string(&ym("2024-07")).unwrap();
        assert_eq!(json, "\"2024-07\"");
        let billing: BillingMonth = serde_json::from_str("\"202407\"").unwrap();
        assert_eq!(billing.to_year_month(), ym("2024-07"));
        assert!(serde_json::from_str::<YearMonth>("\"202407\"").is_err());
    }
}
