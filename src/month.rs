// src/month.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A calendar month, stored as `"YYYY-MM"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self, Error> {
        if !(1..=12).contains(&month) {
            return Err(Error::invalid(format!("month out of range: {}", month)));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self::from_date(at.date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::from_date(date) == *self
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // month is validated on construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::invalid(format!("expected YYYY-MM, got '{}'", s));

        let (year, month) = s.trim().split_once('-').ok_or_else(bad)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(bad());
        }
        let year = year.parse::<i32>().map_err(|_| bad())?;
        let month = month.parse::<u32>().map_err(|_| bad())?;

        Month::new(year, month)
    }
}

impl TryFrom<String> for Month {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let m: Month = "2026-03".parse().unwrap();
        assert_eq!(m.year(), 2026);
        assert_eq!(m.month(), 3);
        assert_eq!(m.to_string(), "2026-03");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("2026-13".parse::<Month>().is_err());
        assert!("2026-00".parse::<Month>().is_err());
        assert!("abc".parse::<Month>().is_err());
        assert!("2026-3".parse::<Month>().is_err());
    }

    #[test]
    fn test_year_rollover() {
        let dec: Month = "2025-12".parse().unwrap();
        assert_eq!(dec.next().to_string(), "2026-01");
        assert_eq!(dec.next().prev(), dec);
    }

    #[test]
    fn test_contains_and_order() {
        let m: Month = "2026-02".parse().unwrap();
        assert!(m.contains(NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()));
        assert!(!m.contains(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()));
        assert!(m < m.next());
        assert_eq!(m.first_day(), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    }

    #[test]
    fn test_serde_as_string() {
        let m: Month = "2026-07".parse().unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"2026-07\"");
        let back: Month = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert!(serde_json::from_str::<Month>("\"2026-7x\"").is_err());
    }
}
