//! The remaining, simpler dimensions: `run`, `task`, `quantity`, and the
//! opaque `value` payload.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::structured::Structured;

/// `run` — model cycle, a minute-of-day offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Run(pub u32);

impl Run {
    pub fn style(&self) -> &'static str {
        "MINUTE"
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.0 as u64).unwrap();
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(bytes);
        Ok(Run(read_varint(&mut cursor, 0)? as u32))
    }

    pub fn to_string_repr(&self) -> String {
        format!("MINUTE({})", self.0)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (style, args) = crate::types::origin::split_style_call(s)?;
        if style != "MINUTE" {
            return Err(ArkError::UnsupportedStyle(style.to_string()));
        }
        Ok(Run(args
            .trim()
            .parse()
            .map_err(|_| ArkError::format("bad run minute value", 0))?))
    }

    pub fn to_structured(&self) -> Structured {
        Structured::map()
            .field("style", Structured::Str("MINUTE".into()))
            .field("value", Structured::Int(self.0 as i64))
            .build()
    }

    pub fn compare(&self, other: &Run) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// `task` — free-text processing task name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Task(pub String);

impl Task {
    pub fn style(&self) -> &'static str {
        ""
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.0.len() as u64).unwrap();
        out.extend_from_slice(self.0.as_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let len = read_varint(&mut cursor, 0)? as usize;
        let mut buf = vec![0u8; len];
        cursor
            .read_exact(&mut buf)
            .map_err(|_| ArkError::format("truncated task value", 0))?;
        Ok(Task(
            String::from_utf8(buf).map_err(|_| ArkError::format("non-utf8 task value", 0))?,
        ))
    }

    pub fn to_string_repr(&self) -> String {
        self.0.clone()
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(Task(s.to_string()))
    }

    pub fn to_structured(&self) -> Structured {
        Structured::Str(self.0.clone())
    }

    pub fn compare(&self, other: &Task) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// `quantity` — set of derived-quantity names, kept sorted so the binary
/// and text encodings are canonical regardless of how the set was built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quantity(pub BTreeSet<String>);

impl Quantity {
    pub fn style(&self) -> &'static str {
        ""
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.0.len() as u64).unwrap();
        for s in &self.0 {
            write_varint(out, s.len() as u64).unwrap();
            out.extend_from_slice(s.as_bytes());
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let count = read_varint(&mut cursor, 0)?;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            let len = read_varint(&mut cursor, 0)? as usize;
            let mut buf = vec![0u8; len];
            cursor
                .read_exact(&mut buf)
                .map_err(|_| ArkError::format("truncated quantity entry", 0))?;
            set.insert(
                String::from_utf8(buf).map_err(|_| ArkError::format("non-utf8 quantity entry", 0))?,
            );
        }
        Ok(Quantity(set))
    }

    pub fn to_string_repr(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(", ")
    }

    pub fn parse(s: &str) -> Result<Self> {
        let set = s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(Quantity(set))
    }

    pub fn to_structured(&self) -> Structured {
        Structured::List(self.0.iter().cloned().map(Structured::Str).collect())
    }

    pub fn compare(&self, other: &Quantity) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// `value` — compact opaque payload (used by VM2 station series).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawValue(pub Vec<u8>);

impl RawValue {
    pub fn style(&self) -> &'static str {
        ""
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.0.len() as u64).unwrap();
        out.extend_from_slice(&self.0);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let len = read_varint(&mut cursor, 0)? as usize;
        let mut buf = vec![0u8; len];
        cursor
            .read_exact(&mut buf)
            .map_err(|_| ArkError::format("truncated value payload", 0))?;
        Ok(RawValue(buf))
    }

    pub fn to_string_repr(&self) -> String {
        // VM2 values are short comma-separated numeric fields in practice;
        // we round-trip via a hex fallback for arbitrary bytes.
        String::from_utf8(self.0.clone()).unwrap_or_else(|_| hex_encode(&self.0))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(RawValue(s.as_bytes().to_vec()))
    }

    pub fn to_structured(&self) -> Structured {
        Structured::Str(self.to_string_repr())
    }

    pub fn compare(&self, other: &RawValue) -> Ordering {
        self.0.cmp(&other.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
