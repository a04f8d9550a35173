use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
};

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Millisecond-precision UTC timestamp, e.g. `2025-01-15T09:30:00.123Z`.
pub fn to_iso(ts: OffsetDateTime) -> String {
    let fmt = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    let utc = ts.to_offset(time::UtcOffset::UTC);
    utc.format(&fmt).unwrap_or_else(|_| utc.to_string())
}

pub fn now_iso() -> String {
    to_iso(now())
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_loose(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_with_millis_and_zulu() {
        let ts = datetime!(2025-01-15 09:30:00.123456 UTC);
        assert_eq!(to_iso(ts), "2025-01-15T09:30:00.123Z");
    }

    #[test]
    fn parses_timestamps_and_dates() {
        assert_eq!(
            parse_loose("2025-01-15T09:30:00.123Z"),
            Some(datetime!(2025-01-15 09:30:00.123 UTC))
        );
        assert_eq!(
            parse_loose("2025-01-15"),
            Some(datetime!(2025-01-15 00:00 UTC))
        );
        assert_eq!(parse_loose("last tuesday"), None);
        assert_eq!(parse_loose(""), None);
    }

    #[test]
    fn now_iso_round_trips_through_parse() {
        assert!(parse_loose(&now_iso()).is_some());
    }
}
