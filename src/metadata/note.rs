//! Free-text, timestamped annotations attached to a metadata record (//! "a list of free-text notes (timestamped)").

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub time: DateTime<Utc>,
    pub content: String,
}

impl Note {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            content: content.into(),
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.time.timestamp() as u64).unwrap();
        write_varint(out, self.content.len() as u64).unwrap();
        out.extend_from_slice(self.content.as_bytes());
    }

    pub fn decode(cursor: &mut std::io::Cursor<&[u8]>) -> Result<Self> {
        use std::io::Read;
        let secs = read_varint(cursor, cursor.position())? as i64;
        let time = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| ArkError::format("invalid note timestamp", cursor.position()))?;
        let len = read_varint(cursor, cursor.position())? as usize;
        let mut buf = vec![0u8; len];
        cursor
            .read_exact(&mut buf)
            .map_err(|_| ArkError::format("truncated note content", cursor.position()))?;
        let content =
            String::from_utf8(buf).map_err(|_| ArkError::format("non-utf8 note content", cursor.position()))?;
        Ok(Note { time, content })
    }

    pub fn to_structured(&self) -> Structured {
        Structured::map()
            .field("time", Structured::Str(self.time.to_rfc3339()))
            .field("content", Structured::Str(self.content.clone()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_roundtrip() {
        let n = Note::new("rescanned after disk error");
        let mut buf = Vec::new();
        n.encode(&mut buf);
        let mut cursor = std::io::Cursor::new(buf.as_slice());
        let back = Note::decode(&mut cursor).unwrap();
        assert_eq!(back.content, n.content);
        assert_eq!(back.time.timestamp(), n.time.timestamp());
    }
}
