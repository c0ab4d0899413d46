/// Timestamp parsing and display formatting
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Parse an ISO-8601 timestamp, with or without an offset (naive means UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `dd/MM HH:mm` in local time, empty when the input is missing or invalid
pub fn format_timestamp(raw: Option<&str>) -> String {
    format_timestamp_in(raw, &Local)
}

pub fn format_timestamp_in<Tz: TimeZone>(raw: Option<&str>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    raw.and_then(parse_timestamp)
        .map(|dt| dt.with_timezone(tz).format("%d/%m %H:%M").to_string())
        .unwrap_or_default()
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-05-01T12:30:00Z").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00+02:00").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00.123456").is_some());
        assert!(parse_timestamp("2024-05-01 12:30:00").is_some());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());

        let with_offset = parse_timestamp("2024-05-01T12:30:00+02:00").unwrap();
        let naive = parse_timestamp("2024-05-01T10:30:00").unwrap();
        assert_eq!(with_offset, naive);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp_in(Some("2024-03-07T09:05:00Z"), &Utc),
            "07/03 09:05"
        );
        assert_eq!(format_timestamp_in(Some("garbage"), &Utc), "");
        assert_eq!(format_timestamp_in(None, &Utc), "");
    }
}
