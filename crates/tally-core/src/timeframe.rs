//! # Timeframe Resolver
//!
//! Turns a set of optional range hints into a concrete date interval.
//! Every ledger query is windowed through this resolver; the timeframe is
//! the pagination mechanism.
//!
//! ## Priority (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  1. Custom range   from and/or to                                   │
//! │       absent from = epoch start, absent to = now                    │
//! │       both present and from > to → ValidationError                  │
//! │  2. Single day     date                                             │
//! │  3. Month          year + month (1-12)                              │
//! │  4. Year           year alone (2000-2100)                           │
//! │  5. Default        today                                            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Day boundaries are 00:00:00.000 through 23:59:59.999 UTC. Parse and
//! range failures surface as `ValidationError`, never silent coercion.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ValidationError};
use crate::{MAX_QUERY_YEAR, MIN_QUERY_YEAR};

// =============================================================================
// Query & Resolved Timeframe
// =============================================================================

/// Optional range hints as supplied by the caller. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeframeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// A concrete interval plus a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

// =============================================================================
// Resolution
// =============================================================================

impl TimeframeQuery {
    /// Convenience constructor for a custom range.
    pub fn range(from: impl Into<String>, to: impl Into<String>) -> Self {
        TimeframeQuery {
            from: Some(from.into()),
            to: Some(to.into()),
            ..Default::default()
        }
    }

    /// Resolves the hints into a concrete timeframe.
    pub fn resolve(&self) -> CoreResult<Timeframe> {
        // A month hint is range-checked whenever supplied, even when it does
        // not decide the resolution (e.g. month without year).
        if let Some(month) = self.month {
            check_month(month)?;
        }

        // 1. Custom range
        if self.from.is_some() || self.to.is_some() {
            return self.resolve_custom_range();
        }

        // 2. Single day
        if let Some(date) = &self.date {
            let day = parse_date("date", date)?;
            let (start, end) = day_bounds(day);
            return Ok(Timeframe {
                start,
                end,
                label: day.format("%Y-%m-%d").to_string(),
            });
        }

        // 3. Month / 4. Year
        if let Some(year) = self.year {
            check_year(year)?;
            if let Some(month) = self.month {
                return resolve_month(year, month);
            }
            return resolve_year(year);
        }

        // 5. Default: today
        let today = Utc::now().date_naive();
        let (start, end) = day_bounds(today);
        Ok(Timeframe {
            start,
            end,
            label: "today".to_string(),
        })
    }

    fn resolve_custom_range(&self) -> CoreResult<Timeframe> {
        let from_day = self.from.as_deref().map(|s| parse_date("from", s)).transpose()?;
        let to_day = self.to.as_deref().map(|s| parse_date("to", s)).transpose()?;

        if let (Some(f), Some(t)) = (from_day, to_day) {
            if f > t {
                return Err(ValidationError::InvertedRange {
                    from: f.format("%Y-%m-%d").to_string(),
                    to: t.format("%Y-%m-%d").to_string(),
                }
                .into());
            }
        }

        let start = match from_day {
            Some(day) => start_of_day(day),
            None => DateTime::UNIX_EPOCH,
        };
        let end = match to_day {
            Some(day) => end_of_day(day),
            None => Utc::now(),
        };

        let label = format!(
            "{} to {}",
            from_day
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "beginning".to_string()),
            to_day
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "now".to_string()),
        );

        Ok(Timeframe { start, end, label })
    }
}

fn resolve_month(year: i32, month: u32) -> CoreResult<Timeframe> {
    check_month(month)?;

    let first = first_of_month(year, month)?;
    let next_first = if month == 12 {
        first_of_month(year + 1, 1)?
    } else {
        first_of_month(year, month + 1)?
    };

    Ok(Timeframe {
        start: start_of_day(first),
        end: start_of_day(next_first) - Duration::milliseconds(1),
        label: first.format("%B %Y").to_string(),
    })
}

fn resolve_year(year: i32) -> CoreResult<Timeframe> {
    let jan1 = first_of_month(year, 1)?;
    let next_jan1 = first_of_month(year + 1, 1)?;

    Ok(Timeframe {
        start: start_of_day(jan1),
        end: start_of_day(next_jan1) - Duration::milliseconds(1),
        label: year.to_string(),
    })
}

// =============================================================================
// Date Helpers
// =============================================================================

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("'{value}' is not a YYYY-MM-DD date"),
        }
    })
}

fn check_month(month: u32) -> Result<(), ValidationError> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: "month".to_string(),
            min: 1,
            max: 12,
        })
    }
}

fn check_year(year: i32) -> Result<(), ValidationError> {
    if (MIN_QUERY_YEAR..=MAX_QUERY_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: "year".to_string(),
            min: MIN_QUERY_YEAR as i64,
            max: MAX_QUERY_YEAR as i64,
        })
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, ValidationError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(ValidationError::OutOfRange {
        field: "year".to_string(),
        min: MIN_QUERY_YEAR as i64,
        max: MAX_QUERY_YEAR as i64,
    })
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    start_of_day(day) + Duration::days(1) - Duration::milliseconds(1)
}

fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (start_of_day(day), end_of_day(day))
}

// =============================================================================
// Unit Tests
// =============================================================================
