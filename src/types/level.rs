//! `level` — the vertical coordinate dimension.

use std::cmp::Ordering;

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::origin::split_style_call;
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    Grib1 { kind: u8, l1: u16, l2: u16 },
    Grib2S { kind: u8, scale: u8, value: i32 },
    Grib2D { kind1: u8, scale1: u8, value1: i32, kind2: u8, scale2: u8, value2: i32 },
    Odimh5 { range: i64, elevation: i64 },
}

impl Level {
    pub fn style(&self) -> &'static str {
        match self {
            Level::Grib1 { .. } => "GRIB1",
            Level::Grib2S { .. } => "GRIB2S",
            Level::Grib2D { .. } => "GRIB2D",
            Level::Odimh5 { .. } => "ODIMH5",
        }
    }

    fn style_tag(&self) -> u8 {
        match self {
            Level::Grib1 { .. } => 1,
            Level::Grib2S { .. } => 2,
            Level::Grib2D { .. } => 3,
            Level::Odimh5 { .. } => 4,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.style_tag());
        match self {
            Level::Grib1 { kind, l1, l2 } => {
                out.push(*kind);
                out.extend_from_slice(&l1.to_le_bytes());
                out.extend_from_slice(&l2.to_le_bytes());
            }
            Level::Grib2S { kind, scale, value } => {
                out.push(*kind);
                out.push(*scale);
                out.extend_from_slice(&value.to_le_bytes());
            }
            Level::Grib2D {
                kind1,
                scale1,
                value1,
                kind2,
                scale2,
                value2,
            } => {
                out.push(*kind1);
                out.push(*scale1);
                out.extend_from_slice(&value1.to_le_bytes());
                out.push(*kind2);
                out.push(*scale2);
                out.extend_from_slice(&value2.to_le_bytes());
            }
            Level::Odimh5 { range, elevation } => {
                write_varint(out, *range as u64).unwrap();
                write_varint(out, *elevation as u64).unwrap();
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let mut tag = [0u8; 1];
        cursor
            .read_exact(&mut tag)
            .map_err(|_| ArkError::format("empty level payload", 0))?;
        let read_u16 = |c: &mut std::io::Cursor<&[u8]>| -> Result<u16> {
            let mut b = [0u8; 2];
            c.read_exact(&mut b)
                .map_err(|_| ArkError::format("truncated level field", 0))?;
            Ok(u16::from_le_bytes(b))
        };
        let read_i32 = |c: &mut std::io::Cursor<&[u8]>| -> Result<i32> {
            let mut b = [0u8; 4];
            c.read_exact(&mut b)
                .map_err(|_| ArkError::format("truncated level field", 0))?;
            Ok(i32::from_le_bytes(b))
        };
        let read_u8 = |c: &mut std::io::Cursor<&[u8]>| -> Result<u8> {
            let mut b = [0u8; 1];
            c.read_exact(&mut b)
                .map_err(|_| ArkError::format("truncated level field", 0))?;
            Ok(b[0])
        };
        match tag[0] {
            1 => {
                let kind = read_u8(&mut cursor)?;
                let l1 = read_u16(&mut cursor)?;
                let l2 = read_u16(&mut cursor)?;
                Ok(Level::Grib1 { kind, l1, l2 })
            }
            2 => {
                let kind = read_u8(&mut cursor)?;
                let scale = read_u8(&mut cursor)?;
                let value = read_i32(&mut cursor)?;
                Ok(Level::Grib2S { kind, scale, value })
            }
            3 => {
                let kind1 = read_u8(&mut cursor)?;
                let scale1 = read_u8(&mut cursor)?;
                let value1 = read_i32(&mut cursor)?;
                let kind2 = read_u8(&mut cursor)?;
                let scale2 = read_u8(&mut cursor)?;
                let value2 = read_i32(&mut cursor)?;
                Ok(Level::Grib2D {
                    kind1,
                    scale1,
                    value1,
                    kind2,
                    scale2,
                    value2,
                })
            }
            4 => {
                let range = read_varint(&mut cursor, 0)? as i64;
                let elevation = read_varint(&mut cursor, 0)? as i64;
                Ok(Level::Odimh5 { range, elevation })
            }
            other => Err(ArkError::format(format!("unknown level style {other}"), 0)),
        }
    }

    pub fn to_string_repr(&self) -> String {
        match self {
            Level::Grib1 { kind, l1, l2 } => format!("GRIB1({kind}, {l1}, {l2})"),
            Level::Grib2S { kind, scale, value } => format!("GRIB2S({kind}, {scale}, {value})"),
            Level::Grib2D {
                kind1,
                scale1,
                value1,
                kind2,
                scale2,
                value2,
            } => format!("GRIB2D({kind1}, {scale1}, {value1}, {kind2}, {scale2}, {value2})"),
            Level::Odimh5 { range, elevation } => format!("ODIMH5({range}, {elevation})"),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (style, args) = split_style_call(s)?;
        let parts: Vec<&str> = args.split(',').map(|p| p.trim()).collect();
        let pi = |p: &str| -> Result<i64> {
            p.parse::<i64>()
                .map_err(|_| ArkError::format(format!("bad integer '{p}'"), 0))
        };
        match style {
            "GRIB1" => Ok(Level::Grib1 {
                kind: pi(parts[0])? as u8,
                l1: pi(parts[1])? as u16,
                l2: pi(parts[2])? as u16,
            }),
            "GRIB2S" => Ok(Level::Grib2S {
                kind: pi(parts[0])? as u8,
                scale: pi(parts[1])? as u8,
                value: pi(parts[2])? as i32,
            }),
            "GRIB2D" => Ok(Level::Grib2D {
                kind1: pi(parts[0])? as u8,
                scale1: pi(parts[1])? as u8,
                value1: pi(parts[2])? as i32,
                kind2: pi(parts[3])? as u8,
                scale2: pi(parts[4])? as u8,
                value2: pi(parts[5])? as i32,
            }),
            "ODIMH5" => Ok(Level::Odimh5 {
                range: pi(parts[0])?,
                elevation: pi(parts[1])?,
            }),
            other => Err(ArkError::UnsupportedStyle(other.to_string())),
        }
    }

    pub fn to_structured(&self) -> Structured {
        let b = Structured::map().field("style", Structured::Str(self.style().to_string()));
        match self {
            Level::Grib1 { kind, l1, l2 } => b
                .field("level_type", Structured::Int(*kind as i64))
                .field("l1", Structured::Int(*l1 as i64))
                .field("l2", Structured::Int(*l2 as i64))
                .build(),
            Level::Grib2S { kind, scale, value } => b
                .field("level_type", Structured::Int(*kind as i64))
                .field("scale", Structured::Int(*scale as i64))
                .field("value", Structured::Int(*value as i64))
                .build(),
            Level::Grib2D {
                kind1,
                scale1,
                value1,
                kind2,
                scale2,
                value2,
            } => b
                .field("l1_type", Structured::Int(*kind1 as i64))
                .field("l1_scale", Structured::Int(*scale1 as i64))
                .field("l1_value", Structured::Int(*value1 as i64))
                .field("l2_type", Structured::Int(*kind2 as i64))
                .field("l2_scale", Structured::Int(*scale2 as i64))
                .field("l2_value", Structured::Int(*value2 as i64))
                .build(),
            Level::Odimh5 { range, elevation } => b
                .field("range", Structured::Int(*range))
                .field("elevation", Structured::Int(*elevation))
                .build(),
        }
    }

    pub fn compare(&self, other: &Level) -> Ordering {
        self.style_tag()
            .cmp(&other.style_tag())
            .then_with(|| self.encode_for_compare().cmp(&other.encode_for_compare()))
    }

    fn encode_for_compare(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grib1_roundtrip() {
        let l = Level::Grib1 {
            kind: 105,
            l1: 2,
            l2: 0,
        };
        let mut buf = Vec::new();
        l.encode(&mut buf);
        assert_eq!(Level::decode(&buf).unwrap(), l);
        assert_eq!(Level::parse(&l.to_string_repr()).unwrap(), l);
    }

    #[test]
    fn grib2d_roundtrip_with_negative_value() {
        let l = Level::Grib2D {
            kind1: 100,
            scale1: 0,
            value1: -5,
            kind2: 100,
            scale2: 0,
            value2: 10,
        };
        let mut buf = Vec::new();
        l.encode(&mut buf);
        assert_eq!(Level::decode(&buf).unwrap(), l);
    }
}
