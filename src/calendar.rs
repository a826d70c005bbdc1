//! Day arithmetic on Unix seconds.
//!
//! Timestamps that have been shifted by a customer timezone offset are treated
//! as "local" seconds: midnight alignment and day keys are computed on them as
//! if they were UTC.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::limits::*;
use crate::model::{LeadTime, LeadUnit, Ts};

pub fn now_secs() -> Ts {
    Utc::now().timestamp()
}

/// Start of the day containing `ts`. Saturates at the ends of the `i64` range.
pub fn midnight(ts: Ts) -> Ts {
    ts.saturating_sub(ts.rem_euclid(DAY_IN_SECONDS))
}

/// Last second of the day containing `ts`.
pub fn end_of_day(ts: Ts) -> Ts {
    midnight(ts).saturating_add(DAY_IN_SECONDS - 1)
}

pub fn add_days(ts: Ts, days: i64) -> Ts {
    ts.saturating_add(days.saturating_mul(DAY_IN_SECONDS))
}

fn datetime(ts: Ts) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Calendar day of a (local) timestamp.
pub fn day_of(ts: Ts) -> NaiveDate {
    datetime(ts).date_naive()
}

pub fn day_start(day: NaiveDate) -> Ts {
    day.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

/// Hour and minute of a timestamp as a `HHMM` number.
pub fn hhmm(ts: Ts) -> u32 {
    let dt = datetime(ts);
    dt.hour() * 100 + dt.minute()
}

/// Same month and day, ignoring the year.
pub fn same_month_day(a: Ts, b: Ts) -> bool {
    let (a, b) = (datetime(a), datetime(b));
    a.month() == b.month() && a.day() == b.day()
}

pub fn hours_to_offset(hours: f64) -> Ts {
    if !hours.is_finite() || hours.abs() > MAX_TIMEZONE_OFFSET_HOURS {
        return 0;
    }
    (hours * HOUR_IN_SECONDS as f64).round() as Ts
}

/// Parse a caller-supplied offset in hours (`"2"`, `"-5.5"`). Anything else is 0.
pub fn parse_timezone_offset(input: &str) -> Ts {
    input
        .trim()
        .parse::<f64>()
        .map(hours_to_offset)
        .unwrap_or(0)
}

/// Parse a caller-supplied date. Returns `None` for anything unrecognised.
///
/// Accepted: Unix seconds (`"1741305600"`, `"@1741305600"`), RFC 3339,
/// `YYYY-MM-DD[ T]HH:MM[:SS]`, `YYYY-MM-DD` and `YYYY/MM/DD` (midnight).
pub fn parse_caller_date(input: &str) -> Option<Ts> {
    let raw = input.trim();
    if raw.is_empty() {
        return None;
    }
    let digits = raw.strip_prefix('@').unwrap_or(raw);
    if digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('-') {
        if let Ok(ts) = digits.parse::<Ts>() {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(dt.and_utc().timestamp());
        }
    }
    for pattern in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(day) = NaiveDate::parse_from_str(raw, pattern) {
            return Some(day_start(day));
        }
    }
    None
}

/// `now` plus a lead time. Months are calendar months.
pub fn add_lead_time(now: Ts, lead: LeadTime) -> Ts {
    let value = Ts::from(lead.value);
    match lead.unit {
        LeadUnit::Minute => now + value * MINUTE_IN_SECONDS,
        LeadUnit::Hour => now + value * HOUR_IN_SECONDS,
        LeadUnit::Day => now + value * DAY_IN_SECONDS,
        LeadUnit::Week => now + value * 7 * DAY_IN_SECONDS,
        LeadUnit::Month => datetime(now)
            .checked_add_months(Months::new(lead.value))
            .map(|dt| dt.timestamp())
            .unwrap_or(now + value * 31 * DAY_IN_SECONDS),
    }
}

/// A strftime pattern used to render day keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateFormat(String);

impl DateFormat {
    /// Returns `None` if the pattern has an invalid specifier.
    pub fn new(pattern: &str) -> Option<Self> {
        let invalid = StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error));
        (!invalid && !pattern.is_empty()).then(|| Self(pattern.to_string()))
    }

    /// Translate a PHP `date()` pattern such as `Y-n-j`.
    pub fn from_php(pattern: &str) -> Option<Self> {
        let mut out = String::new();
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                'Y' => out.push_str("%Y"),
                'y' => out.push_str("%y"),
                'm' => out.push_str("%m"),
                'n' => out.push_str("%-m"),
                'd' => out.push_str("%d"),
                'j' => out.push_str("%-d"),
                'M' => out.push_str("%b"),
                'F' => out.push_str("%B"),
                'D' => out.push_str("%a"),
                'l' => out.push_str("%A"),
                'N' => out.push_str("%u"),
                'w' => out.push_str("%w"),
                'H' => out.push_str("%H"),
                'G' => out.push_str("%-H"),
                'i' => out.push_str("%M"),
                's' => out.push_str("%S"),
                '%' => out.push_str("%%"),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        if escaped == '%' {
                            out.push_str("%%");
                        } else {
                            out.push(escaped);
                        }
                    }
                }
                other => out.push(other),
            }
        }
        Self::new(&out)
    }

    pub fn pattern(&self) -> &str {
        &self.0
    }

    pub fn format(&self, day: NaiveDate) -> String {
        let mut out = String::new();
        if write!(out, "{}", day.format(&self.0)).is_err() {
            return day.to_string();
        }
        out
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self(DEFAULT_DATE_FORMAT.to_string())
    }
}
