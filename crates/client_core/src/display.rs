use chrono::{DateTime, Local, TimeZone};
use shared::domain::Timestamp;

/// Hour and minute in the local zone. Origin values that do not parse as
/// RFC 3339 are returned verbatim.
pub fn display_time(timestamp: &Timestamp) -> String {
    display_time_in(timestamp, &Local)
}

pub fn display_time_in<Tz>(timestamp: &Timestamp, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match timestamp {
        Timestamp::Origin(raw) => match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(parsed) => parsed.with_timezone(tz).format("%H:%M").to_string(),
            Err(_) => raw.clone(),
        },
        Timestamp::Arrival(at) => at.with_timezone(tz).format("%H:%M").to_string(),
    }
}
