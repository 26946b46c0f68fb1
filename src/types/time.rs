//! UTC instants used by `reftime` and by metadata notes.
//!
//! Mirrors the original `arki::core::Time`: a naive (year, month, day, hour,
//! minute, second) tuple interpreted as UTC, with a canonical ISO-8601 text
//! form and a fixed-width binary form (no varint needed — every field has a
//! known range).

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::error::{ArkError, Result};

/// A UTC point in time, second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Time {
    pub fn new(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub fn to_chrono(self) -> Result<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month as u32, self.day as u32)
            .ok_or_else(|| ArkError::format("invalid calendar date", 0))?;
        let time = date
            .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
            .ok_or_else(|| ArkError::format("invalid time of day", 0))?;
        Ok(Utc.from_utc_datetime(&time))
    }

    pub fn from_chrono(dt: DateTime<Utc>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        }
    }

    /// `YYYY-MM-DD HH:MM:SS` — the canonical text form used by the matcher
    /// grammar and by YAML output.
    pub fn to_iso8601(self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }

    pub fn parse_iso8601(s: &str) -> Result<Self> {
        let s = s.trim();
        let (date_part, time_part) = match s.split_once(|c| c == ' ' || c == 'T') {
            Some((d, t)) => (d, t),
            None => (s, "00:00:00"),
        };
        let mut date_fields = date_part.split('-');
        let year: i32 = date_fields
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ArkError::format("invalid year in reftime", 0))?;
        let month: u8 = date_fields
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let day: u8 = date_fields
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let mut time_fields = time_part.split(':');
        let hour: u8 = time_fields
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let minute: u8 = time_fields
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let second: u8 = time_fields
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let t = Self::new(year, month, day, hour, minute, second);
        t.to_chrono()?; // validates the calendar date
        Ok(t)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.year.to_le_bytes());
        out.push(self.month);
        out.push(self.day);
        out.push(self.hour);
        out.push(self.minute);
        out.push(self.second);
    }

    pub const ENCODED_LEN: usize = 4 + 5;

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(ArkError::format("truncated time value", 0));
        }
        let year = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        Ok(Self {
            year,
            month: bytes[4],
            day: bytes[5],
            hour: bytes[6],
            minute: bytes[7],
            second: bytes[8],
        })
    }

    pub fn start_of_month(&self) -> Self {
        Self::new(self.year, self.month, 1, 0, 0, 0)
    }

    pub fn start_of_next_month(&self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1, 1, 0, 0, 0)
        } else {
            Self::new(self.year, self.month + 1, 1, 0, 0, 0)
        }
    }

    /// The next representable instant, used to turn an exclusive `<`/`>`
    /// bound expressed in the matcher grammar into the half-open
    /// `[ge, lt)` range the engine compares against internally.
    pub fn next_second(&self) -> Self {
        self.to_chrono()
            .map(|dt| Self::from_chrono(dt + chrono::Duration::seconds(1)))
            .unwrap_or(*self)
    }
}

/// A (start, end) time interval, half-open `[start, end)`, used both for
/// `Period` reftimes and for segment/dataset extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: Time,
    pub end: Time,
}

impl Interval {
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && t < self.end
    }

    pub fn intersects(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Interval::new(start, end))
        } else {
            None
        }
    }

    /// Smallest interval covering both `self` and `other`.
    pub fn union(&self, other: &Interval) -> Interval {
        Interval::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_roundtrip() {
        let t = Time::new(2024, 1, 15, 12, 30, 0);
        let s = t.to_iso8601();
        assert_eq!(s, "2024-01-15 12:30:00");
        assert_eq!(Time::parse_iso8601(&s).unwrap(), t);
    }

    #[test]
    fn parse_date_only_defaults_midnight() {
        let t = Time::parse_iso8601("2024-02-01").unwrap();
        assert_eq!(t, Time::new(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn binary_roundtrip() {
        let t = Time::new(2024, 1, 15, 0, 0, 0);
        let mut buf = Vec::new();
        t.encode(&mut buf);
        assert_eq!(buf.len(), Time::ENCODED_LEN);
        assert_eq!(Time::decode(&buf).unwrap(), t);
    }

    #[test]
    fn interval_intersection() {
        let a = Interval::new(Time::new(2024, 1, 1, 0, 0, 0), Time::new(2024, 1, 10, 0, 0, 0));
        let b = Interval::new(Time::new(2024, 1, 5, 0, 0, 0), Time::new(2024, 1, 20, 0, 0, 0));
        let i = a.intersect(&b).unwrap();
        assert_eq!(i.start, Time::new(2024, 1, 5, 0, 0, 0));
        assert_eq!(i.end, Time::new(2024, 1, 10, 0, 0, 0));
    }

    #[test]
    fn interval_disjoint_has_no_intersection() {
        let a = Interval::new(Time::new(2024, 1, 1, 0, 0, 0), Time::new(2024, 1, 2, 0, 0, 0));
        let b = Interval::new(Time::new(2024, 2, 1, 0, 0, 0), Time::new(2024, 2, 2, 0, 0, 0));
        assert!(a.intersect(&b).is_none());
        assert!(!a.intersects(&b));
    }

    #[test]
    fn start_of_next_month_wraps_year() {
        let t = Time::new(2024, 12, 15, 0, 0, 0);
        assert_eq!(t.start_of_next_month(), Time::new(2025, 1, 1, 0, 0, 0));
    }
}
