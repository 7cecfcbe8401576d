//! Publish-date parsing shared by the connectors. Every parser returns
//! `None` on failure; callers fall back to the fetch time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// RFC-2822 / RFC-1123 dates as found in RSS `pubDate`, plus the two-digit
/// year RFC-822 forms.
pub fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Some(d.with_timezone(&Utc));
    }

    // RFC-822 with a named UTC zone, e.g. "02 Jan 06 15:04 GMT"
    let numeric = ["GMT", "UTC", "UT", "Z"]
        .iter()
        .find_map(|z| s.strip_suffix(z).map(|rest| format!("{}+0000", rest)))
        .unwrap_or_else(|| s.to_string());
    let body = match numeric.split_once(", ") {
        Some((_, rest)) => rest.to_string(),
        None => numeric,
    };
    ["%d %b %y %H:%M %z", "%d %b %y %H:%M:%S %z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&body, fmt).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Epochs at or above this are milliseconds. As seconds it would be
/// year 5138; as milliseconds it is March 1973.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Unix epoch in seconds or milliseconds, told apart by magnitude.
pub fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.unsigned_abs() >= MILLIS_THRESHOLD as u64 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

/// Ordered layout list for loosely-typed JSON dates: RFC-3339, naive ISO,
/// space-separated, RFC-2822/822, bare date, unix seconds or milliseconds.
pub fn parse_flexible(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(d) = parse_rfc3339(s) {
        return Some(d);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&n));
        }
    }
    if let Some(d) = parse_rfc2822(s) {
        return Some(d);
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    s.parse::<i64>().ok().and_then(from_epoch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn rss_pubdate_variants() {
        let want = ts("2024-03-05T10:00:00Z");
        assert_eq!(parse_rfc2822("Tue, 05 Mar 2024 10:00:00 GMT"), Some(want));
        assert_eq!(parse_rfc2822("Tue, 05 Mar 2024 11:00:00 +0100"), Some(want));
        assert_eq!(parse_rfc2822("05 Mar 24 10:00 GMT"), Some(want));
        assert_eq!(parse_rfc2822("05 Mar 24 10:00 +0000"), Some(want));
        assert_eq!(parse_rfc2822("yesterday"), None);
    }

    #[test]
    fn flexible_layouts_in_order() {
        let want = ts("2024-03-05T10:00:00Z");
        assert_eq!(parse_flexible("2024-03-05T10:00:00Z"), Some(want));
        assert_eq!(parse_flexible("2024-03-05T12:00:00+02:00"), Some(want));
        assert_eq!(parse_flexible("2024-03-05T10:00:00"), Some(want));
        assert_eq!(parse_flexible("2024-03-05 10:00:00"), Some(want));
        assert_eq!(parse_flexible("Tue, 05 Mar 2024 10:00:00 +0000"), Some(want));
        assert_eq!(parse_flexible("1709632800"), Some(want));
        assert_eq!(
            parse_flexible("2024-03-05"),
            Some(ts("2024-03-05T00:00:00Z"))
        );
        assert_eq!(parse_flexible(""), None);
        assert_eq!(parse_flexible("soon"), None);
    }

    #[test]
    fn millisecond_epochs_are_not_read_as_seconds() {
        let want = ts("2024-03-05T10:00:00Z");
        assert_eq!(parse_flexible("1709632800000"), Some(want));
        assert_eq!(from_epoch(1_709_632_800_000), Some(want));
        assert_eq!(from_epoch(1_709_632_800), Some(want));
        assert_eq!(from_epoch(0), Some(ts("1970-01-01T00:00:00Z")));
    }
}
