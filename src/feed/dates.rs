//! Tolerant feed-date parsing
//!
//! Feed timestamps arrive in every format publishers can invent. Parsing
//! tries the standard formats first and never fails hard: unparseable dates
//! are simply absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Fallback formats tried after RFC 3339 and RFC 2822.
const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
];

const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%B %d, %Y"];

/// Parses a date string into a UTC datetime.
///
/// Strategy order:
/// 1. RFC 3339 / ISO 8601 (Atom, JSON Feed)
/// 2. RFC 2822 (RSS 2.0 pubDate)
/// 3. Common non-standard formats, naive values assumed UTC
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in FALLBACK_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in FALLBACK_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    tracing::debug!(date = %trimmed, "unparseable date string");
    None
}

/// Filters out entry dates later than `now`; future-dated posts would skew
/// last-updated and velocity.
pub fn non_future(dates: Vec<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    dates.into_iter().filter(|d| *d <= now).collect()
}

/// Items published per day: item count over the observed entry date range.
///
/// A single-day (or single-entry) range counts as one day, so a feed with
/// five items all posted today has a velocity of 5.
pub fn velocity(item_count: u32, dates: &[DateTime<Utc>]) -> f64 {
    if item_count == 0 {
        return 0.0;
    }
    let (Some(earliest), Some(latest)) = (dates.iter().min(), dates.iter().max()) else {
        return 0.0;
    };
    let days = (*latest - *earliest).num_days().max(1);

    item_count as f64 / days as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339() {
        let dt = parse_date("2024-06-01T12:30:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T12:30:00+00:00");
    }

    #[test]
    fn test_rfc3339_with_offset() {
        let dt = parse_date("2024-06-01T12:30:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T10:30:00+00:00");
    }

    #[test]
    fn test_rfc2822() {
        let dt = parse_date("Sat, 01 Jun 2024 12:30:00 GMT").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T12:30:00+00:00");
    }

    #[test]
    fn test_rfc2822_with_offset() {
        let dt = parse_date("Sat, 01 Jun 2024 12:30:00 -0500").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T17:30:00+00:00");
    }

    #[test]
    fn test_fallback_naive_datetime() {
        let dt = parse_date("2024-06-01 12:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T12:30:00+00:00");
    }

    #[test]
    fn test_fallback_date_only() {
        let dt = parse_date("2024-06-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T00:00:00+00:00");
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
    }

    #[test]
    fn test_non_future_filters() {
        let now = parse_date("2024-06-01T00:00:00Z").unwrap();
        let past = parse_date("2024-05-01T00:00:00Z").unwrap();
        let future = parse_date("2024-07-01T00:00:00Z").unwrap();

        let kept = non_future(vec![past, future, now], now);
        assert_eq!(kept, vec![past, now]);
    }

    #[test]
    fn test_velocity_over_range() {
        let dates = vec![
            parse_date("2024-06-01T00:00:00Z").unwrap(),
            parse_date("2024-06-11T00:00:00Z").unwrap(),
        ];
        // 5 items across 10 days
        assert_eq!(velocity(5, &dates), 0.5);
    }

    #[test]
    fn test_velocity_single_day_range() {
        let dates = vec![parse_date("2024-06-01T00:00:00Z").unwrap()];
        assert_eq!(velocity(5, &dates), 5.0);
    }

    #[test]
    fn test_velocity_empty() {
        assert_eq!(velocity(0, &[]), 0.0);
        assert_eq!(velocity(5, &[]), 0.0);
    }
}
