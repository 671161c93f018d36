//! Named-period to date-range resolution.
//!
//! Every upstream client consumes the same inclusive range from here, in the
//! configured business timezone. Resolution is a pure function of
//! (period, reference instant, timezone) so the three integrations can never
//! drift apart on what "yesterday" means.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Number of days covered, counting both endpoints.
    pub fn day_count(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// True when `date` falls inside the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// A named reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Yesterday,
    Last7Days,
    Last30Days,
    CurrentMonth,
    /// A calendar month of the reference year, 1-based.
    Month(u32),
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown period token: {0}")]
pub struct PeriodParseError(pub String);

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

impl Period {
    /// Parse a period token case-insensitively.
    ///
    /// Unknown tokens are an error here; the HTTP layer decides whether to
    /// fall back to `CurrentMonth`.
    pub fn parse(token: &str) -> Result<Self, PeriodParseError> {
        let lowered = token.trim().to_lowercase();
        match lowered.as_str() {
            "yesterday" => return Ok(Period::Yesterday),
            "last_7_days" => return Ok(Period::Last7Days),
            "last_30_days" => return Ok(Period::Last30Days),
            "current_month" => return Ok(Period::CurrentMonth),
            _ => {}
        }
        if let Some(idx) = MONTH_NAMES.iter().position(|m| *m == lowered) {
            return Ok(Period::Month(idx as u32 + 1));
        }
        Err(PeriodParseError(token.to_string()))
    }

    /// Parse a token, falling back to `CurrentMonth` on anything unknown.
    /// Matches the behavior callers of the HTTP API have always relied on.
    pub fn parse_or_current_month(token: &str) -> Self {
        Self::parse(token).unwrap_or(Period::CurrentMonth)
    }

    /// The canonical token for this period, for echoing back in responses.
    pub fn token(&self) -> &'static str {
        match self {
            Period::Yesterday => "yesterday",
            Period::Last7Days => "last_7_days",
            Period::Last30Days => "last_30_days",
            Period::CurrentMonth => "current_month",
            Period::Month(m) => MONTH_NAMES[(*m as usize - 1).min(11)],
        }
    }
}

/// Resolve a period to an inclusive date range.
///
/// "Today" is the civil date of `reference` in `tz`, so a request at 11pm
/// in the business timezone never bleeds into the next UTC day.
pub fn resolve(period: Period, reference: DateTime<Utc>, tz: Tz) -> DateRange {
    let today = reference.with_timezone(&tz).date_naive();
    match period {
        Period::Yesterday => {
            let day = today - Duration::days(1);
            DateRange { start: day, end: day }
        }
        Period::Last7Days => DateRange {
            start: today - Duration::days(7),
            end: today,
        },
        Period::Last30Days => DateRange {
            start: today - Duration::days(30),
            end: today,
        },
        Period::CurrentMonth => DateRange {
            start: today.with_day(1).unwrap_or(today),
            end: today,
        },
        Period::Month(month) => {
            let month = month.clamp(1, 12);
            let year = today.year();
            let start = NaiveDate::from_ymd_opt(year, month, 1)
                .unwrap_or_else(|| today.with_day(1).unwrap_or(today));
            let first_of_next = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)
            };
            let end = first_of_next
                .map(|d| d - Duration::days(1))
                .unwrap_or(start);
            DateRange { start, end }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(Period::parse("yesterday").unwrap(), Period::Yesterday);
        assert_eq!(Period::parse("LAST_7_DAYS").unwrap(), Period::Last7Days);
        assert_eq!(Period::parse("January").unwrap(), Period::Month(1));
        assert_eq!(Period::parse("december").unwrap(), Period::Month(12));
        assert!(Period::parse("fortnight").is_err());
        assert_eq!(
            Period::parse_or_current_month("fortnight"),
            Period::CurrentMonth
        );
    }

    #[test]
    fn test_yesterday_single_day() {
        let range = resolve(Period::Yesterday, at(2026, 8, 15, 12), New_York);
        assert_eq!(range.start, range.end);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 8, 14).unwrap());
        assert_eq!(range.day_count(), 1);
    }

    #[test]
    fn test_timezone_shifts_civil_date() {
        // 2026-08-15 03:00 UTC is still 2026-08-14 in New York (UTC-4 in DST)
        let range = resolve(Period::Yesterday, at(2026, 8, 15, 3), New_York);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 8, 13).unwrap());

        let utc_range = resolve(Period::Yesterday, at(2026, 8, 15, 3), chrono_tz::UTC);
        assert_eq!(
            utc_range.start,
            NaiveDate::from_ymd_opt(2026, 8, 14).unwrap()
        );
    }

    #[test]
    fn test_rolling_windows() {
        let reference = at(2026, 8, 15, 12);
        let week = resolve(Period::Last7Days, reference, New_York);
        assert_eq!(week.start, NaiveDate::from_ymd_opt(2026, 8, 8).unwrap());
        assert_eq!(week.end, NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());

        let month = resolve(Period::Last30Days, reference, New_York);
        assert_eq!(month.start, NaiveDate::from_ymd_opt(2026, 7, 16).unwrap());
        assert_eq!(month.day_count(), 31);
    }

    #[test]
    fn test_current_month() {
        let range = resolve(Period::CurrentMonth, at(2026, 8, 15, 12), New_York);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
    }

    #[test]
    fn test_named_month_full_span() {
        let reference = at(2026, 8, 15, 12);
        let feb = resolve(Period::Month(2), reference, New_York);
        assert_eq!(feb.start, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(feb.end, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());

        let dec = resolve(Period::Month(12), reference, New_York);
        assert_eq!(dec.end, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
    }

    #[test]
    fn test_start_never_after_end() {
        let reference = at(2026, 1, 1, 0);
        let periods = [
            Period::Yesterday,
            Period::Last7Days,
            Period::Last30Days,
            Period::CurrentMonth,
            Period::Month(1),
            Period::Month(6),
            Period::Month(12),
        ];
        for period in periods {
            let range = resolve(period, reference, New_York);
            assert!(range.start <= range.end, "{:?} produced {:?}", period, range);
        }
    }

    #[test]
    fn test_deterministic() {
        let reference = at(2026, 8, 15, 12);
        let a = resolve(Period::Last7Days, reference, New_York);
        let b = resolve(Period::Last7Days, reference, New_York);
        assert_eq!(a, b);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let range = resolve(Period::Last7Days, at(2026, 8, 15, 12), New_York);
        assert!(range.contains(range.start));
        assert!(range.contains(range.end));
        assert!(!range.contains(range.start - Duration::days(1)));
    }
}
