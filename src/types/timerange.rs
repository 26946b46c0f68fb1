//! `timerange` — the statistical period dimension.

use std::cmp::Ordering;

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::origin::split_style_call;
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timerange {
    Grib1 { kind: u8, unit: u8, p1: u32, p2: u32 },
    Grib2 { kind: u8, unit: u8, p1: u32, p2: u32 },
    Bufr { value: u32, unit: u8 },
}

impl Timerange {
    pub fn style(&self) -> &'static str {
        match self {
            Timerange::Grib1 { .. } => "GRIB1",
            Timerange::Grib2 { .. } => "GRIB2",
            Timerange::Bufr { .. } => "BUFR",
        }
    }

    fn style_tag(&self) -> u8 {
        match self {
            Timerange::Grib1 { .. } => 1,
            Timerange::Grib2 { .. } => 2,
            Timerange::Bufr { .. } => 3,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.style_tag());
        match self {
            Timerange::Grib1 { kind, unit, p1, p2 } | Timerange::Grib2 { kind, unit, p1, p2 } => {
                out.push(*kind);
                out.push(*unit);
                write_varint(out, *p1 as u64).unwrap();
                write_varint(out, *p2 as u64).unwrap();
            }
            Timerange::Bufr { value, unit } => {
                write_varint(out, *value as u64).unwrap();
                out.push(*unit);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let mut tag = [0u8; 1];
        cursor
            .read_exact(&mut tag)
            .map_err(|_| ArkError::format("empty timerange payload", 0))?;
        match tag[0] {
            1 | 2 => {
                let mut kind_unit = [0u8; 2];
                cursor
                    .read_exact(&mut kind_unit)
                    .map_err(|_| ArkError::format("truncated timerange", 0))?;
                let p1 = read_varint(&mut cursor, 0)? as u32;
                let p2 = read_varint(&mut cursor, 0)? as u32;
                if tag[0] == 1 {
                    Ok(Timerange::Grib1 {
                        kind: kind_unit[0],
                        unit: kind_unit[1],
                        p1,
                        p2,
                    })
                } else {
                    Ok(Timerange::Grib2 {
                        kind: kind_unit[0],
                        unit: kind_unit[1],
                        p1,
                        p2,
                    })
                }
            }
            3 => {
                let value = read_varint(&mut cursor, 0)? as u32;
                let mut unit = [0u8; 1];
                cursor
                    .read_exact(&mut unit)
                    .map_err(|_| ArkError::format("truncated BUFR timerange", 0))?;
                Ok(Timerange::Bufr { value, unit: unit[0] })
            }
            other => Err(ArkError::format(format!("unknown timerange style {other}"), 0)),
        }
    }

    pub fn to_string_repr(&self) -> String {
        match self {
            Timerange::Grib1 { kind, unit, p1, p2 } => format!("GRIB1({kind}, {unit}, {p1}, {p2})"),
            Timerange::Grib2 { kind, unit, p1, p2 } => format!("GRIB2({kind}, {unit}, {p1}, {p2})"),
            Timerange::Bufr { value, unit } => format!("BUFR({value}, {unit})"),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (style, args) = split_style_call(s)?;
        let parts: Vec<&str> = args.split(',').map(|p| p.trim()).collect();
        let pu = |p: &str| -> Result<u64> {
            p.parse::<u64>()
                .map_err(|_| ArkError::format(format!("bad integer '{p}'"), 0))
        };
        match style {
            "GRIB1" => Ok(Timerange::Grib1 {
                kind: pu(parts[0])? as u8,
                unit: pu(parts[1])? as u8,
                p1: pu(parts[2])? as u32,
                p2: pu(parts[3])? as u32,
            }),
            "GRIB2" => Ok(Timerange::Grib2 {
                kind: pu(parts[0])? as u8,
                unit: pu(parts[1])? as u8,
                p1: pu(parts[2])? as u32,
                p2: pu(parts[3])? as u32,
            }),
            "BUFR" => Ok(Timerange::Bufr {
                value: pu(parts[0])? as u32,
                unit: pu(parts[1])? as u8,
            }),
            other => Err(ArkError::UnsupportedStyle(other.to_string())),
        }
    }

    pub fn to_structured(&self) -> Structured {
        let b = Structured::map().field("style", Structured::Str(self.style().to_string()));
        match self {
            Timerange::Grib1 { kind, unit, p1, p2 } | Timerange::Grib2 { kind, unit, p1, p2 } => b
                .field("time_range", Structured::Int(*kind as i64))
                .field("unit", Structured::Int(*unit as i64))
                .field("p1", Structured::Int(*p1 as i64))
                .field("p2", Structured::Int(*p2 as i64))
                .build(),
            Timerange::Bufr { value, unit } => b
                .field("value", Structured::Int(*value as i64))
                .field("unit", Structured::Int(*unit as i64))
                .build(),
        }
    }

    pub fn compare(&self, other: &Timerange) -> Ordering {
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
