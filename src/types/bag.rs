//! Shared "bag of named scalars" shape used by both `area` and `proddef`
//! (both are "a bag of named scalar values").

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    Int(i64),
    Str(String),
}

impl Scalar {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Scalar::Int(v) => {
                out.push(0);
                let zigzag = ((*v << 1) ^ (*v >> 63)) as u64;
                write_varint(out, zigzag).unwrap();
            }
            Scalar::Str(s) => {
                out.push(1);
                write_varint(out, s.len() as u64).unwrap();
                out.extend_from_slice(s.as_bytes());
            }
        }
    }

    fn to_structured(&self) -> Structured {
        match self {
            Scalar::Int(v) => Structured::Int(*v),
            Scalar::Str(s) => Structured::Str(s.clone()),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Sorted name -> scalar map; sorted so binary encoding and comparison are
/// order-independent of insertion order (needed for the round-trip law).
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Bag(pub BTreeMap<String, Scalar>);

impl Bag {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: &str, value: Scalar) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.0.get(key)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.0.len() as u64).unwrap();
        for (k, v) in &self.0 {
            write_varint(out, k.len() as u64).unwrap();
            out.extend_from_slice(k.as_bytes());
            v.encode(out);
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let count = read_varint(&mut cursor, 0)?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let klen = read_varint(&mut cursor, 0)? as usize;
            let mut kbuf = vec![0u8; klen];
            cursor
                .read_exact(&mut kbuf)
                .map_err(|_| ArkError::format("truncated bag key", 0))?;
            let key = String::from_utf8(kbuf).map_err(|_| ArkError::format("non-utf8 bag key", 0))?;

            let mut tag = [0u8; 1];
            cursor
                .read_exact(&mut tag)
                .map_err(|_| ArkError::format("truncated bag value tag", 0))?;
            let value = match tag[0] {
                0 => {
                    let zigzag = read_varint(&mut cursor, 0)?;
                    let v = ((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64);
                    Scalar::Int(v)
                }
                1 => {
                    let len = read_varint(&mut cursor, 0)? as usize;
                    let mut buf = vec![0u8; len];
                    cursor
                        .read_exact(&mut buf)
                        .map_err(|_| ArkError::format("truncated bag string value", 0))?;
                    Scalar::Str(
                        String::from_utf8(buf)
                            .map_err(|_| ArkError::format("non-utf8 bag value", 0))?,
                    )
                }
                other => return Err(ArkError::format(format!("unknown scalar tag {other}"), 0)),
            };
            map.insert(key, value);
        }
        Ok(Bag(map))
    }

    pub fn to_string_repr(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| match v {
                Scalar::Str(s) => format!("{k}={s}"),
                Scalar::Int(i) => format!("{k}={i}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut map = BTreeMap::new();
        let s = s.trim();
        if s.is_empty() {
            return Ok(Bag(map));
        }
        for part in s.split(',') {
            let (k, v) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| ArkError::format("bag entry missing '='", 0))?;
            let value = if let Ok(i) = v.trim().parse::<i64>() {
                Scalar::Int(i)
            } else {
                Scalar::Str(v.trim().to_string())
            };
            map.insert(k.trim().to_string(), value);
        }
        Ok(Bag(map))
    }

    pub fn to_structured(&self) -> Structured {
        Structured::Map(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_structured()))
                .collect(),
        )
    }

    pub fn compare(&self, other: &Bag) -> Ordering {
        self.0.cmp(&other.0)
    }
}
