use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use nag_core::models::{DayCode, Recurrence};
use nag_core::timezone::{local_date, local_datetime};

/// Parses a reminder time in the owner's offset.
///
/// Accepts RFC 3339 (`2024-05-13T10:00:00Z`), a local date and time
/// (`2024-05-13 10:00`), a bare time for today (`10:00`) or a relative delay
/// (`+30m`, `+2h`, `+1d`).
pub fn parse_when(input: &str, offset: FixedOffset, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Some(delay) = input.strip_prefix('+') {
        return now
            .checked_add_signed(parse_delay(delay)?)
            .ok_or_else(|| anyhow!("Delay '+{}' is out of range", delay));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(local) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(local_datetime(local.date(), local.time(), offset));
        }
    }
    if let Ok(time) = parse_time(input) {
        return Ok(local_datetime(local_date(now, offset), time, offset));
    }

    Err(anyhow!(
        "Failed to parse time '{}': expected HH:MM, 'YYYY-MM-DD HH:MM', RFC 3339 or +30m",
        input
    ))
}

fn parse_time(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .map_err(|e| anyhow!("Invalid time '{}': {}", input, e))
}

fn parse_delay(input: &str) -> Result<Duration> {
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Missing unit in delay '+{}' (use m, h or d)", input))?;
    let (amount, unit) = input.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| anyhow!("Invalid delay '+{}'", input))?;
    let delay = match unit {
        "m" | "min" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => return Err(anyhow!("Unknown delay unit '{}' (use m, h or d)", unit)),
    };
    delay.ok_or_else(|| anyhow!("Delay '+{}' is out of range", input))
}

/// Parses `today`, `tomorrow`, `yesterday` or `YYYY-MM-DD` in the owner's offset.
pub fn parse_date(input: &str, offset: FixedOffset, now: DateTime<Utc>) -> Result<NaiveDate> {
    let today = local_date(now, offset);
    match input.trim().to_lowercase().as_str() {
        "today" => Ok(today),
        "tomorrow" => Ok(today + Duration::days(1)),
        "yesterday" => Ok(today - Duration::days(1)),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .map_err(|e| anyhow!("Invalid date '{}': {}", input, e)),
    }
}

/// Parses `daily`, `weekdays`, `weekends` or a comma separated day list
/// such as `mon,wed,fri`.
pub fn parse_days(input: &str) -> Result<Recurrence> {
    let recurrence = match input.trim().to_lowercase().as_str() {
        "daily" | "everyday" => Recurrence::daily(),
        "weekdays" => Recurrence::new(vec![
            DayCode::Mon,
            DayCode::Tue,
            DayCode::Wed,
            DayCode::Thu,
            DayCode::Fri,
        ]),
        "weekends" => Recurrence::new(vec![DayCode::Sat, DayCode::Sun]),
        list => list.parse::<Recurrence>()?,
    };
    if recurrence.is_empty() {
        return Err(anyhow!("At least one day is required"));
    }
    Ok(recurrence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-05-13T08:00:00Z".parse().unwrap()
    }

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
    }

    #[test]
    fn test_parse_when_formats() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            parse_when("2024-05-13T10:00:00Z", utc, now()).unwrap(),
            "2024-05-13T10:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            parse_when("2024-05-14 09:30", ist(), now()).unwrap(),
            "2024-05-14T04:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            parse_when("21:00", ist(), now()).unwrap(),
            "2024-05-13T15:30:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(parse_when("+90m", utc, now()).unwrap(), now() + Duration::minutes(90));
        assert_eq!(parse_when("+1d", utc, now()).unwrap(), now() + Duration::days(1));
    }

    #[test]
    fn test_parse_when_rejects_garbage() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert!(parse_when("next tuesday", utc, now()).is_err());
        assert!(parse_when("+5", utc, now()).is_err());
        assert!(parse_when("+5w", utc, now()).is_err());
        assert!(parse_when("+153722867280912930m", utc, now()).is_err());
        assert!(parse_when("+999999999999d", utc, now()).is_err());
    }

    #[test]
    fn test_parse_date_keywords() {
        // 08:00 UTC is already 13:30 on the 13th at +05:30.
        assert_eq!(parse_date("today", ist(), now()).unwrap(), NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert_eq!(parse_date("Tomorrow", ist(), now()).unwrap(), NaiveDate::from_ymd_opt(2024, 5, 14).unwrap());
        assert_eq!(parse_date("2024-06-01", ist(), now()).unwrap(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!(parse_date("someday", ist(), now()).is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days("daily").unwrap(), Recurrence::daily());
        assert_eq!(parse_days("weekends").unwrap().days(), &[DayCode::Sat, DayCode::Sun]);
        assert_eq!(parse_days("wed,mon").unwrap().to_string(), "MON,WED");
        assert!(parse_days("").is_err());
        assert!(parse_days("mon,funday").is_err());
    }
}
