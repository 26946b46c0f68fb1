//! The metadata binary stream: a concatenation of framed records.
//!
//! Frame: `signature:2 | version:u16 | length:u32 | payload:length`.
//! Signatures: `MD` (single metadata), `!D` (metadata with inline data
//! appended), `SU` (summary), `MG` (group of MD sharing a header). The
//! stream ends at EOF; a frame cut short partway through is a `FormatError`,
//! not a silent truncation.

use std::io::{Read, Write};

use crate::error::{ArkError, Result};
use crate::metadata::record::Metadata;
use crate::metadata::summary::Summary;
use crate::types::codec::{read_varint, write_varint};

pub const VERSION: u16 = 1;

const SIG_MD: [u8; 2] = *b"MD";
const SIG_INLINE: [u8; 2] = *b"!D";
const SIG_SUMMARY: [u8; 2] = *b"SU";
const SIG_GROUP: [u8; 2] = *b"MG";

#[derive(Debug, Clone)]
pub enum StreamRecord {
    Metadata(Metadata),
    Inline(Metadata, Vec<u8>),
    Summary(Summary),
    Group(Vec<Metadata>),
}

fn write_frame<W: Write>(w: &mut W, signature: [u8; 2], payload: &[u8]) -> Result<()> {
    w.write_all(&signature)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&(payload.len() as u32).to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

pub fn write_metadata<W: Write>(w: &mut W, md: &Metadata) -> Result<()> {
    write_frame(w, SIG_MD, &md.encode_body())
}

pub fn write_inline<W: Write>(w: &mut W, md: &Metadata, data: &[u8]) -> Result<()> {
    let mut payload = md.encode_body();
    write_varint(&mut payload, data.len() as u64)?;
    payload.extend_from_slice(data);
    write_frame(w, SIG_INLINE, &payload)
}

pub fn write_summary<W: Write>(w: &mut W, summary: &Summary) -> Result<()> {
    write_frame(w, SIG_SUMMARY, &summary.encode())
}

pub fn write_group<W: Write>(w: &mut W, group: &[Metadata]) -> Result<()> {
    let mut payload = Vec::new();
    write_varint(&mut payload, group.len() as u64)?;
    for md in group {
        let body = md.encode_body();
        write_varint(&mut payload, body.len() as u64)?;
        payload.extend_from_slice(&body);
    }
    write_frame(w, SIG_GROUP, &payload)
}

/// Read the next frame, or `Ok(None)` on a clean EOF between frames.
pub fn read_next<R: Read>(r: &mut R) -> Result<Option<StreamRecord>> {
    let mut sig = [0u8; 2];
    match r.read(&mut sig)? {
        0 => return Ok(None),
        2 => {}
        _ => return Err(ArkError::format("truncated stream frame signature", 0)),
    }
    let mut version_buf = [0u8; 2];
    r.read_exact(&mut version_buf)
        .map_err(|_| ArkError::format("truncated stream frame version", 0))?;
    let version = u16::from_le_bytes(version_buf);
    if version != VERSION {
        return Err(ArkError::format(format!("unsupported stream version {version}"), 0));
    }
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)
        .map_err(|_| ArkError::format("truncated stream frame length", 0))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .map_err(|_| ArkError::format("truncated stream frame payload", 0))?;

    match sig {
        SIG_MD => Ok(Some(StreamRecord::Metadata(Metadata::decode_body(&payload)?))),
        SIG_INLINE => {
            let mut cursor = std::io::Cursor::new(payload.as_slice());
            let md = read_metadata_prefix(&mut cursor)?;
            let data_len = read_varint(&mut cursor, cursor.position())? as usize;
            let mut data = vec![0u8; data_len];
            cursor.read_exact(&mut data)?;
            Ok(Some(StreamRecord::Inline(md, data)))
        }
        SIG_SUMMARY => Ok(Some(StreamRecord::Summary(Summary::decode(&payload)?))),
        SIG_GROUP => {
            let mut cursor = std::io::Cursor::new(payload.as_slice());
            let count = read_varint(&mut cursor, 0)?;
            let mut group = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let body_len = read_varint(&mut cursor, cursor.position())? as usize;
                let mut body = vec![0u8; body_len];
                cursor.read_exact(&mut body)?;
                group.push(Metadata::decode_body(&body)?);
            }
            Ok(Some(StreamRecord::Group(group)))
        }
        other => Err(ArkError::format(
            format!("unknown stream signature {:?}", String::from_utf8_lossy(&other)),
            0,
        )),
    }
}

/// `!D` payloads don't carry their own length prefix for the metadata body
/// (unlike `MG`'s members), so we decode from the shared cursor's remaining
/// bytes and advance by however much `decode_body_prefix` says it consumed.
fn read_metadata_prefix(cursor: &mut std::io::Cursor<&[u8]>) -> Result<Metadata> {
    let remaining = &cursor.get_ref()[cursor.position() as usize..];
    let (md, consumed) = Metadata::decode_body_prefix(remaining)?;
    cursor.set_position(cursor.position() + consumed as u64);
    Ok(md)
}
