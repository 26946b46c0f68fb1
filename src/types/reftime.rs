//! `reftime` — the one dimension every archived message must carry
//! (invariant 1).

use std::cmp::Ordering;

use crate::error::{ArkError, Result};
use crate::types::time::{Interval, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reftime {
    Position(Time),
    Period(Time, Time),
}

impl Reftime {
    pub fn style(&self) -> &'static str {
        match self {
            Reftime::Position(_) => "POSITION",
            Reftime::Period(_, _) => "PERIOD",
        }
    }

    /// The interval this reftime spans — a `Position` is a zero-width
    /// interval at that instant.
    pub fn interval(&self) -> Interval {
        match self {
            Reftime::Position(t) => Interval::new(*t, *t),
            Reftime::Period(a, b) => Interval::new(*a, *b),
        }
    }

    pub fn compare(&self, other: &Reftime) -> Ordering {
        self.interval()
            .start
            .cmp(&other.interval().start)
            .then_with(|| self.interval().end.cmp(&other.interval().end))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Reftime::Position(t) => {
                out.push(0);
                t.encode(out);
            }
            Reftime::Period(a, b) => {
                out.push(1);
                a.encode(out);
                b.encode(out);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ArkError::format("empty reftime payload", 0));
        }
        match bytes[0] {
            0 => Ok(Reftime::Position(Time::decode(&bytes[1..])?)),
            1 => {
                let a = Time::decode(&bytes[1..])?;
                let b = Time::decode(&bytes[1 + Time::ENCODED_LEN..])?;
                Ok(Reftime::Period(a, b))
            }
            other => Err(ArkError::format(format!("unknown reftime style {other}"), 0)),
        }
    }

    pub fn to_string_repr(&self) -> String {
        match self {
            Reftime::Position(t) => t.to_iso8601(),
            Reftime::Period(a, b) => format!("{} to {}", a.to_iso8601(), b.to_iso8601()),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        if let Some((a, b)) = s.split_once(" to ") {
            Ok(Reftime::Period(
                Time::parse_iso8601(a)?,
                Time::parse_iso8601(b)?,
            ))
        } else {
            Ok(Reftime::Position(Time::parse_iso8601(s)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_text_roundtrip() {
        let r = Reftime::Position(Time::new(2024, 1, 15, 0, 0, 0));
        let s = r.to_string_repr();
        assert_eq!(Reftime::parse(&s).unwrap(), r);
    }

    #[test]
    fn period_binary_roundtrip() {
        let r = Reftime::Period(
            Time::new(2024, 1, 15, 0, 0, 0),
            Time::new(2024, 1, 16, 0, 0, 0),
        );
        let mut buf = Vec::new();
        r.encode(&mut buf);
        assert_eq!(Reftime::decode(&buf).unwrap(), r);
    }

    #[test]
    fn ordering_by_start_then_end() {
        let a = Reftime::Position(Time::new(2024, 1, 1, 0, 0, 0));
        let b = Reftime::Position(Time::new(2024, 1, 2, 0, 0, 0));
        assert_eq!(a.compare(&b), Ordering::Less);
    }
}
