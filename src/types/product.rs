//! `product` — the variable/parameter dimension.

use std::cmp::Ordering;

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::origin::split_style_call;
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Product {
    Grib1 {
        origin: u8,
        table: u8,
        product: u8,
    },
    Grib2 {
        centre: u16,
        discipline: u8,
        category: u8,
        number: u8,
    },
    Bufr {
        kind: u8,
        subtype: u8,
        local_subtype: u8,
        name: String,
    },
    Odimh5 {
        object: String,
        product: String,
    },
    Vm2 {
        variable: u32,
    },
}

impl Product {
    pub fn style(&self) -> &'static str {
        match self {
            Product::Grib1 { .. } => "GRIB1",
            Product::Grib2 { .. } => "GRIB2",
            Product::Bufr { .. } => "BUFR",
            Product::Odimh5 { .. } => "ODIMH5",
            Product::Vm2 { .. } => "VM2",
        }
    }

    fn style_tag(&self) -> u8 {
        match self {
            Product::Grib1 { .. } => 1,
            Product::Grib2 { .. } => 2,
            Product::Bufr { .. } => 3,
            Product::Odimh5 { .. } => 4,
            Product::Vm2 { .. } => 5,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.style_tag());
        match self {
            Product::Grib1 {
                origin,
                table,
                product,
            } => out.extend_from_slice(&[*origin, *table, *product]),
            Product::Grib2 {
                centre,
                discipline,
                category,
                number,
            } => {
                write_varint(out, *centre as u64).unwrap();
                out.extend_from_slice(&[*discipline, *category, *number]);
            }
            Product::Bufr {
                kind,
                subtype,
                local_subtype,
                name,
            } => {
                out.extend_from_slice(&[*kind, *subtype, *local_subtype]);
                write_varint(out, name.len() as u64).unwrap();
                out.extend_from_slice(name.as_bytes());
            }
            Product::Odimh5 { object, product } => {
                for s in [object, product] {
                    write_varint(out, s.len() as u64).unwrap();
                    out.extend_from_slice(s.as_bytes());
                }
            }
            Product::Vm2 { variable } => {
                write_varint(out, *variable as u64).unwrap();
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let mut tag = [0u8; 1];
        cursor
            .read_exact(&mut tag)
            .map_err(|_| ArkError::format("empty product payload", 0))?;
        match tag[0] {
            1 => {
                let mut rest = [0u8; 3];
                cursor
                    .read_exact(&mut rest)
                    .map_err(|_| ArkError::format("truncated GRIB1 product", 0))?;
                Ok(Product::Grib1 {
                    origin: rest[0],
                    table: rest[1],
                    product: rest[2],
                })
            }
            2 => {
                let centre = read_varint(&mut cursor, 0)? as u16;
                let mut rest = [0u8; 3];
                cursor
                    .read_exact(&mut rest)
                    .map_err(|_| ArkError::format("truncated GRIB2 product", 0))?;
                Ok(Product::Grib2 {
                    centre,
                    discipline: rest[0],
                    category: rest[1],
                    number: rest[2],
                })
            }
            3 => {
                let mut rest = [0u8; 3];
                cursor
                    .read_exact(&mut rest)
                    .map_err(|_| ArkError::format("truncated BUFR product", 0))?;
                let len = read_varint(&mut cursor, 0)? as usize;
                let mut name_buf = vec![0u8; len];
                cursor
                    .read_exact(&mut name_buf)
                    .map_err(|_| ArkError::format("truncated BUFR product name", 0))?;
                Ok(Product::Bufr {
                    kind: rest[0],
                    subtype: rest[1],
                    local_subtype: rest[2],
                    name: String::from_utf8(name_buf)
                        .map_err(|_| ArkError::format("non-utf8 BUFR product name", 0))?,
                })
            }
            4 => {
                let read_str = |cur: &mut std::io::Cursor<&[u8]>| -> Result<String> {
                    let len = read_varint(cur, 0)? as usize;
                    let mut buf = vec![0u8; len];
                    cur.read_exact(&mut buf)
                        .map_err(|_| ArkError::format("truncated ODIMH5 product field", 0))?;
                    String::from_utf8(buf).map_err(|_| ArkError::format("non-utf8 product field", 0))
                };
                let object = read_str(&mut cursor)?;
                let product = read_str(&mut cursor)?;
                Ok(Product::Odimh5 { object, product })
            }
            5 => {
                let variable = read_varint(&mut cursor, 0)? as u32;
                Ok(Product::Vm2 { variable })
            }
            other => Err(ArkError::format(format!("unknown product style {other}"), 0)),
        }
    }

    pub fn to_string_repr(&self) -> String {
        match self {
            Product::Grib1 {
                origin,
                table,
                product,
            } => format!("GRIB1({origin}, {table}, {product})"),
            Product::Grib2 {
                centre,
                discipline,
                category,
                number,
            } => format!("GRIB2({centre}, {discipline}, {category}, {number})"),
            Product::Bufr {
                kind,
                subtype,
                local_subtype,
                name,
            } => format!("BUFR({kind}, {subtype}, {local_subtype}, {name})"),
            Product::Odimh5 { object, product } => format!("ODIMH5({object}, {product})"),
            Product::Vm2 { variable } => format!("VM2({variable})"),
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
            "GRIB1" => Ok(Product::Grib1 {
                origin: pu(parts[0])? as u8,
                table: pu(parts[1])? as u8,
                product: pu(parts[2])? as u8,
            }),
            "GRIB2" => Ok(Product::Grib2 {
                centre: pu(parts[0])? as u16,
                discipline: pu(parts[1])? as u8,
                category: pu(parts[2])? as u8,
                number: pu(parts[3])? as u8,
            }),
            "BUFR" => Ok(Product::Bufr {
                kind: pu(parts[0])? as u8,
                subtype: pu(parts[1])? as u8,
                local_subtype: pu(parts[2])? as u8,
                name: parts[3].to_string(),
            }),
            "ODIMH5" => Ok(Product::Odimh5 {
                object: parts[0].to_string(),
                product: parts[1].to_string(),
            }),
            "VM2" => Ok(Product::Vm2 {
                variable: pu(parts[0])? as u32,
            }),
            other => Err(ArkError::UnsupportedStyle(other.to_string())),
        }
    }

    pub fn to_structured(&self) -> Structured {
        let b = Structured::map().field("style", Structured::Str(self.style().to_string()));
        match self {
            Product::Grib1 {
                origin,
                table,
                product,
            } => b
                .field("origin", Structured::Int(*origin as i64))
                .field("table", Structured::Int(*table as i64))
                .field("product", Structured::Int(*product as i64))
                .build(),
            Product::Grib2 {
                centre,
                discipline,
                category,
                number,
            } => b
                .field("centre", Structured::Int(*centre as i64))
                .field("discipline", Structured::Int(*discipline as i64))
                .field("category", Structured::Int(*category as i64))
                .field("number", Structured::Int(*number as i64))
                .build(),
            Product::Bufr {
                kind,
                subtype,
                local_subtype,
                name,
            } => b
                .field("type", Structured::Int(*kind as i64))
                .field("subtype", Structured::Int(*subtype as i64))
                .field("local_subtype", Structured::Int(*local_subtype as i64))
                .field("name", Structured::Str(name.clone()))
                .build(),
            Product::Odimh5 { object, product } => b
                .field("object", Structured::Str(object.clone()))
                .field("product", Structured::Str(product.clone()))
                .build(),
            Product::Vm2 { variable } => b.field("variable", Structured::Int(*variable as i64)).build(),
        }
    }

    pub fn compare(&self, other: &Product) -> Ordering {
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
    fn grib2_roundtrip_binary_and_text() {
        let p = Product::Grib2 {
            centre: 98,
            discipline: 0,
            category: 1,
            number: 2,
        };
        let mut buf = Vec::new();
        p.encode(&mut buf);
        assert_eq!(Product::decode(&buf).unwrap(), p);
        assert_eq!(Product::parse(&p.to_string_repr()).unwrap(), p);
    }

    #[test]
    fn bufr_name_with_text_roundtrips() {
        let p = Product::Bufr {
            kind: 0,
            subtype: 255,
            local_subtype: 0,
            name: "synop".into(),
        };
        let mut buf = Vec::new();
        p.encode(&mut buf);
        assert_eq!(Product::decode(&buf).unwrap(), p);
    }

    #[test]
    fn vm2_roundtrip() {
        let p = Product::Vm2 { variable: 158 };
        assert_eq!(Product::parse(&p.to_string_repr()).unwrap(), p);
    }
}
