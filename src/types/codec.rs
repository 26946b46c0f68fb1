//! Binary envelope shared by every typed metadata value.
//!
//! ```text
//! type-code: u8 | length: varint | payload: length bytes
//! ```
//!
//! Unknown type codes must survive a decode/re-encode round trip verbatim —
//! a metadata record holding a dimension this build does not recognize still
//! has to pass it through unchanged (forward-compatibility rule), so
//! the envelope reader always hands back the raw payload bytes alongside the
//! type code, never just the decoded value.

use std::io::{self, Read, Write};

use crate::error::{ArkError, Result};

/// Write a LEB128 varint (unsigned).
pub fn write_varint<W: Write>(writer: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

/// Read a LEB128 varint (unsigned), tracking the offset for format errors.
pub fn read_varint<R: Read>(reader: &mut R, base_offset: u64) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut pos = base_offset;
    loop {
        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .map_err(|_| ArkError::format("truncated varint", pos))?;
        pos += 1;
        value |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(ArkError::format("varint too long", pos));
        }
    }
    Ok(value)
}

/// One framed value as it appears inside a metadata record: the dimension's
/// type code plus the raw envelope payload, decoded lazily by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEnvelope {
    pub type_code: u8,
    pub payload: Vec<u8>,
}

impl RawEnvelope {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.type_code])?;
        write_varint(writer, self.payload.len() as u64)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let mut code_buf = [0u8; 1];
        reader
            .read_exact(&mut code_buf)
            .map_err(|_| ArkError::format("truncated envelope type code", offset))?;
        let len = read_varint(reader, offset + 1)?;
        let mut payload = vec![0u8; len as usize];
        reader
            .read_exact(&mut payload)
            .map_err(|_| ArkError::format("truncated envelope payload", offset + 1))?;
        Ok(Self {
            type_code: code_buf[0],
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v).unwrap();
            let mut cursor = io::Cursor::new(buf);
            let got = read_varint(&mut cursor, 0).unwrap();
            assert_eq!(got, v);
        }
    }

    #[test]
    fn envelope_roundtrip_preserves_unknown_type_code() {
        let env = RawEnvelope {
            type_code: 250,
            payload: vec![1, 2, 3, 4, 5],
        };
        let mut buf = Vec::new();
        env.write_to(&mut buf).unwrap();
        let mut cursor = io::Cursor::new(buf);
        let back = RawEnvelope::read_from(&mut cursor, 0).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn truncated_envelope_is_format_error() {
        let buf = vec![5u8, 10]; // type code 5, length 10, but no payload
        let mut cursor = io::Cursor::new(buf);
        let err = RawEnvelope::read_from(&mut cursor, 0).unwrap_err();
        assert_eq!(err.code(), "FORMAT_ERROR");
    }
}
