//! Tin dates: ages, averages and lenient parsing

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Calendar-aware age of a tin, e.g. 2 years, 3 months, 4 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TinAge {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl TinAge {
    /// Age from `start_ms` to `end_ms`; `None` when the end precedes the start.
    #[must_use]
    pub fn between(start_ms: i64, end_ms: i64) -> Option<Self> {
        let start = date_from_millis(start_ms)?;
        let end = date_from_millis(end_ms)?;
        if end < start {
            return None;
        }

        let mut months = u32::try_from(
            (end.year() - start.year()) * 12 + end.month0() as i32 - start.month0() as i32,
        )
        .ok()?;
        let mut anchor = start.checked_add_months(Months::new(months))?;
        if anchor > end {
            months = months.checked_sub(1)?;
            anchor = start.checked_add_months(Months::new(months))?;
        }
        let days = u32::try_from((end - anchor).num_days()).ok()?;

        Some(Self {
            years: months / 12,
            months: months % 12,
            days,
        })
    }

    /// Whole months, ignoring leftover days
    #[must_use]
    pub const fn total_months(&self) -> u32 {
        self.years * 12 + self.months
    }
}

impl fmt::Display for TinAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (value, unit) in [
            (self.years, "year"),
            (self.months, "month"),
            (self.days, "day"),
        ] {
            if value > 0 {
                let suffix = if value == 1 { "" } else { "s" };
                parts.push(format!("{value} {unit}{suffix}"));
            }
        }
        if parts.is_empty() {
            f.write_str("less than a day")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Average age of tins started at `starts`, measured at `now_ms`.
///
/// Starts in the future are ignored. The result is the age of the mean
/// start date, which keeps month lengths calendar-correct.
#[must_use]
pub fn average_age(starts: &[i64], now_ms: i64) -> Option<TinAge> {
    let past: Vec<i128> = starts
        .iter()
        .filter(|start| **start <= now_ms)
        .map(|start| i128::from(*start))
        .collect();
    if past.is_empty() {
        return None;
    }
    let count = i128::try_from(past.len()).ok()?;
    let mean = i64::try_from(past.iter().sum::<i128>() / count).ok()?;
    TinAge::between(mean, now_ms)
}

/// Convert epoch milliseconds into a UTC calendar date
#[must_use]
pub fn date_from_millis(ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

/// UTC midnight of `date` in epoch milliseconds
#[must_use]
pub fn millis_from_date(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp_millis())
}

/// Format epoch milliseconds as `YYYY-MM-DD`
#[must_use]
pub fn format_date(ms: i64) -> String {
    date_from_millis(ms).map_or_else(String::new, |date| date.format("%Y-%m-%d").to_string())
}

fn iso_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("Invalid regex"))
}

fn us_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("Invalid regex"))
}

fn month_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{4})$").expect("Invalid regex"))
}

fn year_only() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})$").expect("Invalid regex"))
}

/// Parse a user-entered date into epoch milliseconds.
///
/// Accepts `YYYY-MM-DD`, `MM/DD/YYYY`, `MM/YYYY` (first of the month) and
/// `YYYY` (January 1st). Returns `None` for blank or unrecognized input.
#[must_use]
pub fn parse_date(input: &str) -> Option<i64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let number = |caps: &regex::Captures<'_>, index: usize| -> Option<u32> {
        caps.get(index)?.as_str().parse().ok()
    };
    let year = |caps: &regex::Captures<'_>, index: usize| -> Option<i32> {
        caps.get(index)?.as_str().parse().ok()
    };

    let date = if let Some(caps) = iso_date().captures(input) {
        NaiveDate::from_ymd_opt(year(&caps, 1)?, number(&caps, 2)?, number(&caps, 3)?)
    } else if let Some(caps) = us_date().captures(input) {
        NaiveDate::from_ymd_opt(year(&caps, 3)?, number(&caps, 1)?, number(&caps, 2)?)
    } else if let Some(caps) = month_year().captures(input) {
        NaiveDate::from_ymd_opt(year(&caps, 2)?, number(&caps, 1)?, 1)
    } else if let Some(caps) = year_only().captures(input) {
        NaiveDate::from_ymd_opt(year(&caps, 1)?, 1, 1)
    } else {
        None
    }?;

    Some(millis_from_date(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ms(y: i32, m: u32, d: u32) -> i64 {
        millis_from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn age_is_calendar_aware() {
        let age = TinAge::between(ms(2020, 1, 31), ms(2020, 3, 1)).unwrap();
        assert_eq!(
            age,
            TinAge {
                years: 0,
                months: 1,
                days: 1
            }
        );

        let age = TinAge::between(ms(2018, 6, 15), ms(2021, 8, 20)).unwrap();
        assert_eq!(
            age,
            TinAge {
                years: 3,
                months: 2,
                days: 5
            }
        );
        assert_eq!(age.total_months(), 38);
    }

    #[test]
    fn age_before_start_is_none() {
        assert!(TinAge::between(ms(2021, 1, 1), ms(2020, 1, 1)).is_none());
    }

    #[test]
    fn test_display() {
        let age = TinAge {
            years: 1,
            months: 0,
            days: 2,
        };
        assert_eq!(age.to_string(), "1 year, 2 days");
        assert_eq!(TinAge::default().to_string(), "less than a day");
    }

    #[test]
    fn average_ignores_future_dates() {
        let now = ms(2022, 1, 1);
        let starts = [ms(2020, 1, 1), ms(2021, 1, 1), ms(2030, 1, 1)];
        let age = average_age(&starts, now).unwrap();
        assert_eq!(age.years, 1);
        assert!(average_age(&[], now).is_none());
        assert!(average_age(&[ms(2030, 1, 1)], now).is_none());
    }

    #[test]
    fn parse_accepts_common_formats() {
        assert_eq!(parse_date("2019-04-01"), Some(ms(2019, 4, 1)));
        assert_eq!(parse_date("04/15/2019"), Some(ms(2019, 4, 15)));
        assert_eq!(parse_date(" 4/2019 "), Some(ms(2019, 4, 1)));
        assert_eq!(parse_date("2019"), Some(ms(2019, 1, 1)));
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("13/2019"), None);
        assert_eq!(parse_date("spring 2019"), None);
    }

    #[test]
    fn format_matches_iso_parse() {
        let value = ms(2001, 12, 9);
        assert_eq!(format_date(value), "2001-12-09");
        assert_eq!(parse_date(&format_date(value)), Some(value));
    }
}
