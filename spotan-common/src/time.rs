//! Timestamp utilities

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Instant a play started, given the instant it stopped and how long it played.
///
/// `None` when the result falls outside the representable range.
pub fn start_from_stop(stop: DateTime<Utc>, played_ms: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_milliseconds(played_ms).and_then(|played| stop.checked_sub_signed(played))
}

/// Parse a release date reported at year, month or day precision.
///
/// `"1997"`, `"1997-05"` and `"1997-05-21"` are accepted; a missing month or
/// day is taken as the first. Anything else yields `None`.
pub fn parse_partial_date(value: &str) -> Option<NaiveDate> {
    let mut parts = value.trim().splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // After 2000-01-01 and before 2100-01-01
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[tokio::test]
    async fn test_now_successive_calls_advance() {
        let time1 = now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let time2 = now();
        assert!(time2 > time1);
    }

    #[test]
    fn test_start_from_stop() {
        let stop: DateTime<Utc> = "2024-01-01T00:05:00Z".parse().unwrap();
        let start = start_from_stop(stop, 200_000);
        assert_eq!(start, Some("2024-01-01T00:01:40Z".parse::<DateTime<Utc>>().unwrap()));
    }

    #[test]
    fn test_start_from_stop_zero_duration() {
        let stop: DateTime<Utc> = "2024-01-01T00:05:00Z".parse().unwrap();
        assert_eq!(start_from_stop(stop, 0), Some(stop));
    }

    #[test]
    fn test_start_from_stop_out_of_range() {
        let stop: DateTime<Utc> = "2024-01-01T00:05:00Z".parse().unwrap();
        assert_eq!(start_from_stop(stop, i64::MAX), None);
        assert_eq!(start_from_stop(DateTime::<Utc>::MIN_UTC, 1), None);
    }

    #[test]
    fn test_parse_partial_date_precisions() {
        assert_eq!(parse_partial_date("1997"), NaiveDate::from_ymd_opt(1997, 1, 1));
        assert_eq!(parse_partial_date("1997-05"), NaiveDate::from_ymd_opt(1997, 5, 1));
        assert_eq!(parse_partial_date("1997-05-21"), NaiveDate::from_ymd_opt(1997, 5, 21));
    }

    #[test]
    fn test_parse_partial_date_rejects_garbage() {
        assert_eq!(parse_partial_date(""), None);
        assert_eq!(parse_partial_date("soon"), None);
        assert_eq!(parse_partial_date("1997-13"), None);
        assert_eq!(parse_partial_date("1997-02-30"), None);
    }
}
