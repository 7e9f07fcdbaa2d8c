//! Fixed UTC offset helpers. Every owner has one offset; local dates and
//! "today" are always derived through it.

use crate::error::CoreError;
use crate::models::DayCode;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// Parses `+05:30`, `-0800`, `+02`, `Z` or `UTC` into a fixed offset.
pub fn parse_utc_offset(input: &str) -> Result<FixedOffset, CoreError> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| CoreError::InvalidOffset(input.to_string()));
    }

    let invalid = || CoreError::InvalidOffset(input.to_string());
    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| invalid())?,
            digits[2..].parse::<i32>().map_err(|_| invalid())?,
        ),
        _ => return Err(invalid()),
    };
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Formats an offset as `+HH:MM`.
pub fn format_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
}

/// The owner-local calendar date of an instant.
pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// The instant of a local wall-clock time on a local date.
pub fn local_datetime(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match offset.from_local_datetime(&naive).single() {
        Some(local) => local.with_timezone(&Utc),
        // A fixed offset is never ambiguous; shift manually if chrono still refuses.
        None => DateTime::<Utc>::from_naive_utc_and_offset(
            naive - Duration::seconds(offset.local_minus_utc() as i64),
            Utc,
        ),
    }
}

/// The owner-local wall-clock time of an instant.
pub fn local_time(at: DateTime<Utc>, offset: FixedOffset) -> NaiveTime {
    at.with_timezone(&offset).time()
}

/// Like [`local_time`], truncated to the minute. Template times are stored
/// at minute precision.
pub fn local_minute(at: DateTime<Utc>, offset: FixedOffset) -> NaiveTime {
    let time = local_time(at, offset);
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

pub fn day_code(at: DateTime<Utc>, offset: FixedOffset) -> DayCode {
    DayCode::for_date(local_date(at, offset))
}

/// Whole-second "now", matching the storage precision of timestamps.
pub fn now() -> DateTime<Utc> {
    use chrono::SubsecRound;
    Utc::now().trunc_subsecs(0)
}
