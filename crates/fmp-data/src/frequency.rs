//! Reporting periods, price frequencies and quarter arithmetic.

use crate::error::{DataError, Result};
use chrono::{Datelike, NaiveDate};
use fmp_engine::EngineError;
use std::fmt;
use std::str::FromStr;

/// Reporting period of fundamentals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Period {
    /// Fiscal-year figures
    #[default]
    Annual,
    /// Quarterly figures
    Quarter,
}

impl Period {
    /// Value of the `period` query parameter; annual is the provider default.
    pub const fn query_value(&self) -> Option<&'static str> {
        match self {
            Self::Annual => None,
            Self::Quarter => Some("quarter"),
        }
    }

    /// Short code, `A` or `Q`.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Annual => "A",
            Self::Quarter => "Q",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Period {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, EngineError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "annual" | "fy" | "year" => Ok(Self::Annual),
            "q" | "quarter" | "quarterly" => Ok(Self::Quarter),
            other => Err(EngineError::UnsupportedFrequency(other.to_string())),
        }
    }
}

/// Intraday chart interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    /// 1 minute bars
    OneMinute,
    /// 5 minute bars
    FiveMinutes,
    /// 15 minute bars
    FifteenMinutes,
    /// 30 minute bars
    ThirtyMinutes,
    /// 1 hour bars
    OneHour,
    /// 4 hour bars
    FourHours,
}

impl Interval {
    /// All supported intervals.
    pub const ALL: [Self; 6] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::FourHours,
    ];

    /// Path segment used by `historical-chart/{interval}/`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinutes => "5min",
            Self::FifteenMinutes => "15min",
            Self::ThirtyMinutes => "30min",
            Self::OneHour => "1hour",
            Self::FourHours => "4hour",
        }
    }
}

/// Sampling frequency of historical prices and rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Frequency {
    /// End-of-day series
    #[default]
    Daily,
    /// Intraday bars
    Intraday(Interval),
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("d"),
            Self::Intraday(interval) => f.write_str(interval.as_str()),
        }
    }
}

impl FromStr for Frequency {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, EngineError> {
        let s = s.trim().to_ascii_lowercase();
        if matches!(s.as_str(), "d" | "day" | "daily" | "1d") {
            return Ok(Self::Daily);
        }
        Interval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .map(Self::Intraday)
            .ok_or(EngineError::UnsupportedFrequency(s))
    }
}

/// Calendar quarter-end date.
///
/// # Errors
/// Returns [`DataError::InvalidQuarter`] unless `quarter` is 1-4.
pub fn quarter_end(year: i32, quarter: u8) -> Result<NaiveDate> {
    let (month, day) = match quarter {
        1 => (3, 31),
        2 => (6, 30),
        3 => (9, 30),
        4 => (12, 31),
        other => return Err(DataError::InvalidQuarter(other)),
    };
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DataError::Parse(format!("year {year} out of range")))
}

/// The most recent quarter that has fully ended on `today`.
pub fn last_completed_quarter(today: NaiveDate) -> (i32, u8) {
    let current = (today.month0() / 3 + 1) as u8;
    if current == 1 {
        (today.year() - 1, 4)
    } else {
        (today.year(), current - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case("A", Period::Annual)]
    #[case("annual", Period::Annual)]
    #[case("Q", Period::Quarter)]
    #[case("quarterly", Period::Quarter)]
    fn test_period_parsing(#[case] input: &str, #[case] expected: Period) {
        assert_eq!(input.parse::<Period>().unwrap(), expected);
    }

    #[test]
    fn test_period_rejects_unknown() {
        assert!(matches!(
            "M".parse::<Period>(),
            Err(EngineError::UnsupportedFrequency(f)) if f == "m"
        ));
    }

    #[rstest]
    #[case("d", Frequency::Daily)]
    #[case("daily", Frequency::Daily)]
    #[case("1min", Frequency::Intraday(Interval::OneMinute))]
    #[case("15MIN", Frequency::Intraday(Interval::FifteenMinutes))]
    #[case("4hour", Frequency::Intraday(Interval::FourHours))]
    fn test_frequency_parsing(#[case] input: &str, #[case] expected: Frequency) {
        assert_eq!(input.parse::<Frequency>().unwrap(), expected);
    }

    #[rstest]
    #[case("2min")]
    #[case("weekly")]
    #[case("2hour")]
    fn test_unsupported_frequency(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Frequency>(),
            Err(EngineError::UnsupportedFrequency(_))
        ));
    }

    #[rstest]
    #[case(1, date(2024, 3, 31))]
    #[case(2, date(2024, 6, 30))]
    #[case(3, date(2024, 9, 30))]
    #[case(4, date(2024, 12, 31))]
    fn test_quarter_end(#[case] quarter: u8, #[case] expected: NaiveDate) {
        assert_eq!(quarter_end(2024, quarter).unwrap(), expected);
    }

    #[test]
    fn test_invalid_quarter() {
        assert!(matches!(quarter_end(2024, 5), Err(DataError::InvalidQuarter(5))));
        assert!(matches!(quarter_end(2024, 0), Err(DataError::InvalidQuarter(0))));
    }

    #[rstest]
    #[case(date(2024, 2, 10), (2023, 4))]
    #[case(date(2024, 4, 1), (2024, 1))]
    #[case(date(2024, 9, 30), (2024, 2))]
    #[case(date(2024, 12, 31), (2024, 3))]
    fn test_last_completed_quarter(#[case] today: NaiveDate, #[case] expected: (i32, u8)) {
        assert_eq!(last_completed_quarter(today), expected);
    }
}
