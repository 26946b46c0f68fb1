//! `origin` — the producing centre, one tagged variant per source format.

use std::cmp::Ordering;

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Grib1 {
        centre: u8,
        subcentre: u8,
        process: u8,
    },
    Grib2 {
        centre: u16,
        subcentre: u16,
        process_type: u8,
        background_process: u8,
        process: u8,
    },
    Bufr {
        centre: u8,
        subcentre: u8,
    },
    Odimh5 {
        wmo: String,
        rad: String,
        plc: String,
    },
}

impl Origin {
    pub fn style(&self) -> &'static str {
        match self {
            Origin::Grib1 { .. } => "GRIB1",
            Origin::Grib2 { .. } => "GRIB2",
            Origin::Bufr { .. } => "BUFR",
            Origin::Odimh5 { .. } => "ODIMH5",
        }
    }

    fn style_tag(&self) -> u8 {
        match self {
            Origin::Grib1 { .. } => 1,
            Origin::Grib2 { .. } => 2,
            Origin::Bufr { .. } => 3,
            Origin::Odimh5 { .. } => 4,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.style_tag());
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => {
                out.extend_from_slice(&[*centre, *subcentre, *process]);
            }
            Origin::Grib2 {
                centre,
                subcentre,
                process_type,
                background_process,
                process,
            } => {
                write_varint(out, *centre as u64).unwrap();
                write_varint(out, *subcentre as u64).unwrap();
                out.extend_from_slice(&[*process_type, *background_process, *process]);
            }
            Origin::Bufr { centre, subcentre } => {
                out.extend_from_slice(&[*centre, *subcentre]);
            }
            Origin::Odimh5 { wmo, rad, plc } => {
                for field in [wmo, rad, plc] {
                    write_varint(out, field.len() as u64).unwrap();
                    out.extend_from_slice(field.as_bytes());
                }
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(bytes);
        let mut tag = [0u8; 1];
        std::io::Read::read_exact(&mut cursor, &mut tag)
            .map_err(|_| ArkError::format("empty origin payload", 0))?;
        use std::io::Read;
        match tag[0] {
            1 => {
                let mut rest = [0u8; 3];
                cursor
                    .read_exact(&mut rest)
                    .map_err(|_| ArkError::format("truncated GRIB1 origin", 0))?;
                Ok(Origin::Grib1 {
                    centre: rest[0],
                    subcentre: rest[1],
                    process: rest[2],
                })
            }
            2 => {
                let centre = read_varint(&mut cursor, 0)? as u16;
                let subcentre = read_varint(&mut cursor, 0)? as u16;
                let mut rest = [0u8; 3];
                cursor
                    .read_exact(&mut rest)
                    .map_err(|_| ArkError::format("truncated GRIB2 origin", 0))?;
                Ok(Origin::Grib2 {
                    centre,
                    subcentre,
                    process_type: rest[0],
                    background_process: rest[1],
                    process: rest[2],
                })
            }
            3 => {
                let mut rest = [0u8; 2];
                cursor
                    .read_exact(&mut rest)
                    .map_err(|_| ArkError::format("truncated BUFR origin", 0))?;
                Ok(Origin::Bufr {
                    centre: rest[0],
                    subcentre: rest[1],
                })
            }
            4 => {
                let read_str = |cur: &mut std::io::Cursor<&[u8]>| -> Result<String> {
                    let len = read_varint(cur, 0)? as usize;
                    let mut buf = vec![0u8; len];
                    cur.read_exact(&mut buf)
                        .map_err(|_| ArkError::format("truncated ODIMH5 origin field", 0))?;
                    String::from_utf8(buf).map_err(|_| ArkError::format("non-utf8 origin field", 0))
                };
                let wmo = read_str(&mut cursor)?;
                let rad = read_str(&mut cursor)?;
                let plc = read_str(&mut cursor)?;
                Ok(Origin::Odimh5 { wmo, rad, plc })
            }
            other => Err(ArkError::format(format!("unknown origin style {other}"), 0)),
        }
    }

    pub fn to_string_repr(&self) -> String {
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => format!("GRIB1({centre}, {subcentre}, {process})"),
            Origin::Grib2 {
                centre,
                subcentre,
                process_type,
                background_process,
                process,
            } => format!(
                "GRIB2({centre}, {subcentre}, {process_type}, {background_process}, {process})"
            ),
            Origin::Bufr { centre, subcentre } => format!("BUFR({centre}, {subcentre})"),
            Origin::Odimh5 { wmo, rad, plc } => format!("ODIMH5({wmo}, {rad}, {plc})"),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (style, args) = split_style_call(s)?;
        let parts: Vec<&str> = args.split(',').map(|p| p.trim()).collect();
        let parse_u: fn(&str) -> Result<u64> =
            |p| p.parse::<u64>().map_err(|_| ArkError::format(format!("bad integer '{p}'"), 0));
        match style {
            "GRIB1" => {
                if parts.len() != 3 {
                    return Err(ArkError::format("GRIB1 origin needs 3 fields", 0));
                }
                Ok(Origin::Grib1 {
                    centre: parse_u(parts[0])? as u8,
                    subcentre: parse_u(parts[1])? as u8,
                    process: parse_u(parts[2])? as u8,
                })
            }
            "GRIB2" => {
                if parts.len() != 5 {
                    return Err(ArkError::format("GRIB2 origin needs 5 fields", 0));
                }
                Ok(Origin::Grib2 {
                    centre: parse_u(parts[0])? as u16,
                    subcentre: parse_u(parts[1])? as u16,
                    process_type: parse_u(parts[2])? as u8,
                    background_process: parse_u(parts[3])? as u8,
                    process: parse_u(parts[4])? as u8,
                })
            }
            "BUFR" => {
                if parts.len() != 2 {
                    return Err(ArkError::format("BUFR origin needs 2 fields", 0));
                }
                Ok(Origin::Bufr {
                    centre: parse_u(parts[0])? as u8,
                    subcentre: parse_u(parts[1])? as u8,
                })
            }
            "ODIMH5" => {
                if parts.len() != 3 {
                    return Err(ArkError::format("ODIMH5 origin needs 3 fields", 0));
                }
                Ok(Origin::Odimh5 {
                    wmo: parts[0].to_string(),
                    rad: parts[1].to_string(),
                    plc: parts[2].to_string(),
                })
            }
            other => Err(ArkError::UnsupportedStyle(other.to_string())),
        }
    }

    pub fn to_structured(&self) -> Structured {
        let b = Structured::map().field("style", Structured::Str(self.style().to_string()));
        match self {
            Origin::Grib1 {
                centre,
                subcentre,
                process,
            } => b
                .field("centre", Structured::Int(*centre as i64))
                .field("subcentre", Structured::Int(*subcentre as i64))
                .field("process", Structured::Int(*process as i64))
                .build(),
            Origin::Grib2 {
                centre,
                subcentre,
                process_type,
                background_process,
                process,
            } => b
                .field("centre", Structured::Int(*centre as i64))
                .field("subcentre", Structured::Int(*subcentre as i64))
                .field("process_type", Structured::Int(*process_type as i64))
                .field("background_process", Structured::Int(*background_process as i64))
                .field("process", Structured::Int(*process as i64))
                .build(),
            Origin::Bufr { centre, subcentre } => b
                .field("centre", Structured::Int(*centre as i64))
                .field("subcentre", Structured::Int(*subcentre as i64))
                .build(),
            Origin::Odimh5 { wmo, rad, plc } => b
                .field("wmo", Structured::Str(wmo.clone()))
                .field("rad", Structured::Str(rad.clone()))
                .field("plc", Structured::Str(plc.clone()))
                .build(),
        }
    }

    pub fn compare(&self, other: &Origin) -> Ordering {
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

/// Parse `STYLE(a, b, c)` into `("STYLE", "a, b, c")`.
pub(crate) fn split_style_call(s: &str) -> Result<(&str, &str)> {
    let s = s.trim();
    let open = s
        .find('(')
        .ok_or_else(|| ArkError::format("missing '(' in tagged value", 0))?;
    if !s.ends_with(')') {
        return Err(ArkError::format("missing closing ')' in tagged value", 0));
    }
    Ok((&s[..open], &s[open + 1..s.len() - 1]))
}
