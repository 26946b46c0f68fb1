//! Where a message's bytes actually live ("a source").

use std::path::PathBuf;

use crate::error::{ArkError, Result};
use crate::types::codec::{read_varint, write_varint};
use crate::types::structured::Structured;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Bytes carried directly in the metadata record (pre-commit scanner
    /// output, or a query result materialized with `with_data`).
    Inline(Vec<u8>),
    /// A message fetched from a remote URL rather than a local segment.
    Url(String),
    /// A slice of an on-disk segment: the canonical post-commit shape.
    Blob {
        format: String,
        basedir: PathBuf,
        relpath: PathBuf,
        offset: u64,
        size: u64,
    },
}

impl Source {
    pub fn is_inline(&self) -> bool {
        matches!(self, Source::Inline(_))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Source::Blob { .. })
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            Source::Inline(bytes) => Some(bytes.len() as u64),
            Source::Url(_) => None,
            Source::Blob { size, .. } => Some(*size),
        }
    }

    /// `(offset, size)` within the owning segment, for the query evaluator
    /// to hand to [`crate::segment::SegmentReader::read`]. Only `Blob`
    /// sources have a segment-relative location.
    pub fn location(&self) -> Option<(u64, u64)> {
        match self {
            Source::Blob { offset, size, .. } => Some((*offset, *size)),
            _ => None,
        }
    }

    /// Rewrite a blob source to use an absolute base directory, leaving
    /// other source kinds untouched.
    pub fn make_absolute(&mut self) {
        if let Source::Blob { basedir, .. } = self {
            if basedir.is_relative() {
                if let Ok(abs) = basedir.canonicalize() {
                    *basedir = abs;
                }
            }
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Source::Inline(bytes) => {
                out.push(0);
                write_varint(out, bytes.len() as u64).unwrap();
                out.extend_from_slice(bytes);
            }
            Source::Url(url) => {
                out.push(1);
                write_varint(out, url.len() as u64).unwrap();
                out.extend_from_slice(url.as_bytes());
            }
            Source::Blob {
                format,
                basedir,
                relpath,
                offset,
                size,
            } => {
                out.push(2);
                for s in [format.as_str(), &basedir.to_string_lossy(), &relpath.to_string_lossy()] {
                    write_varint(out, s.len() as u64).unwrap();
                    out.extend_from_slice(s.as_bytes());
                }
                write_varint(out, *offset).unwrap();
                write_varint(out, *size).unwrap();
            }
        }
    }

    pub fn decode(cursor: &mut std::io::Cursor<&[u8]>) -> Result<Self> {
        use std::io::Read;
        let mut tag = [0u8; 1];
        cursor
            .read_exact(&mut tag)
            .map_err(|_| ArkError::format("truncated source tag", cursor.position()))?;
        let read_str = |c: &mut std::io::Cursor<&[u8]>| -> Result<String> {
            let len = read_varint(c, c.position())? as usize;
            let mut buf = vec![0u8; len];
            c.read_exact(&mut buf)
                .map_err(|_| ArkError::format("truncated source string", c.position()))?;
            String::from_utf8(buf).map_err(|_| ArkError::format("non-utf8 source string", c.position()))
        };
        match tag[0] {
            0 => {
                let len = read_varint(cursor, cursor.position())? as usize;
                let mut buf = vec![0u8; len];
                cursor
                    .read_exact(&mut buf)
                    .map_err(|_| ArkError::format("truncated inline source", cursor.position()))?;
                Ok(Source::Inline(buf))
            }
            1 => Ok(Source::Url(read_str(cursor)?)),
            2 => {
                let format = read_str(cursor)?;
                let basedir = PathBuf::from(read_str(cursor)?);
                let relpath = PathBuf::from(read_str(cursor)?);
                let offset = read_varint(cursor, cursor.position())?;
                let size = read_varint(cursor, cursor.position())?;
                Ok(Source::Blob {
                    format,
                    basedir,
                    relpath,
                    offset,
                    size,
                })
            }
            other => Err(ArkError::format(format!("unknown source tag {other}"), cursor.position())),
        }
    }

    pub fn to_structured(&self) -> Structured {
        match self {
            Source::Inline(bytes) => Structured::map()
                .field("style", Structured::Str("INLINE".into()))
                .field("size", Structured::Int(bytes.len() as i64))
                .build(),
            Source::Url(url) => Structured::map()
                .field("style", Structured::Str("URL".into()))
                .field("url", Structured::Str(url.clone()))
                .build(),
            Source::Blob {
                format,
                basedir,
                relpath,
                offset,
                size,
            } => Structured::map()
                .field("style", Structured::Str("BLOB".into()))
                .field("format", Structured::Str(format.clone()))
                .field("basedir", Structured::Str(basedir.to_string_lossy().into_owned()))
                .field("relpath", Structured::Str(relpath.to_string_lossy().into_owned()))
                .field("offset", Structured::Int(*offset as i64))
                .field("size", Structured::Int(*size as i64))
                .build(),
        }
    }
}
