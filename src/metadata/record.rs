//! The per-message metadata record.
//!
//! Arena + indices: rather than a `Vec<Box<dyn
//! DimensionValue>>` of owning polymorphic pointers, a record is a small
//! `Vec<(Code, arena-slot)>` index plus one `Vec<Value>` arena. Looking a
//! dimension up is a linear scan over at most eleven pairs — cheaper than
//! a vtable dispatch through a heap allocation, and it keeps `Metadata`
//! `Clone` without cloning trait objects.

use crate::error::Result;
use crate::metadata::note::Note;
use crate::metadata::source::Source;
use crate::types::codec::{read_varint, write_varint, RawEnvelope};
use crate::types::{Code, Reftime, Value};

/// A dataset that has, at some point, accepted this metadata (/// "assigned-dataset tags recording acquisition history").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedDataset {
    pub name: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
enum Entry {
    Known(Code, u32),
    /// A dimension this build doesn't recognize, kept verbatim so it
    /// survives a decode/re-encode round trip (forward-compat rule).
    Unknown(RawEnvelope),
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Vec<Entry>,
    arena: Vec<Value>,
    pub source: Source,
    pub notes: Vec<Note>,
    pub assigned_datasets: Vec<AssignedDataset>,
}

impl Default for Source {
    fn default() -> Self {
        Source::Inline(Vec::new())
    }
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(source: Source) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    /// Dimension codes present, in the order they were first inserted.
    pub fn codes(&self) -> Vec<Code> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Known(code, _) => Some(*code),
                Entry::Unknown(_) => None,
            })
            .collect()
    }

    pub fn get(&self, code: Code) -> Option<&Value> {
        self.entries.iter().find_map(|e| match e {
            Entry::Known(c, slot) if *c == code => Some(&self.arena[*slot as usize]),
            _ => None,
        })
    }

    pub fn reftime(&self) -> Option<&Reftime> {
        match self.get(Code::Reftime) {
            Some(Value::Reftime(r)) => Some(r),
            _ => None,
        }
    }

    /// Insert or replace the value for `value`'s dimension, preserving the
    /// slot's original insertion position when it already existed.
    pub fn set(&mut self, value: Value) {
        let code = value.code();
        if let Some(Entry::Known(_, slot)) = self
            .entries
            .iter()
            .find(|e| matches!(e, Entry::Known(c, _) if *c == code))
        {
            self.arena[*slot as usize] = value;
            return;
        }
        let slot = self.arena.len() as u32;
        self.arena.push(value);
        self.entries.push(Entry::Known(code, slot));
    }

    pub fn remove(&mut self, code: Code) -> Option<Value> {
        let pos = self
            .entries
            .iter()
            .position(|e| matches!(e, Entry::Known(c, _) if *c == code))?;
        match self.entries.remove(pos) {
            Entry::Known(_, slot) => Some(self.arena[slot as usize].clone()),
            Entry::Unknown(_) => unreachable!(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Code, &Value)> {
        self.entries.iter().filter_map(move |e| match e {
            Entry::Known(code, slot) => Some((*code, &self.arena[*slot as usize])),
            Entry::Unknown(_) => None,
        })
    }

    pub fn add_note(&mut self, content: impl Into<String>) {
        self.notes.push(Note::new(content));
    }

    pub fn assign_dataset(&mut self, name: impl Into<String>, id: Option<String>) {
        self.assigned_datasets.push(AssignedDataset {
            name: name.into(),
            id,
        });
    }

    /// Replace a blob source with its bytes, pulled through `fetch` (the
    /// segment substrate reads the bytes; this module has no disk access
    /// of its own).
    pub fn make_inline(&mut self, fetch: impl FnOnce(&Source) -> Result<Vec<u8>>) -> Result<()> {
        if !self.source.is_inline() {
            let bytes = fetch(&self.source)?;
            self.source = Source::Inline(bytes);
        }
        Ok(())
    }

    pub fn make_absolute(&mut self) {
        self.source.make_absolute();
    }

    /// Binary body: dimension envelopes (known and unknown, insertion
    /// order), then source, then notes, then assigned-dataset tags. Wrapped
    /// in the outer `MD`/`!D`/`MG` stream frame by `metadata::stream`.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.entries.len() as u64).unwrap();
        for entry in &self.entries {
            let env = match entry {
                Entry::Known(code, slot) => RawEnvelope {
                    type_code: *code as u8,
                    payload: self.arena[*slot as usize].encode(),
                },
                Entry::Unknown(env) => env.clone(),
            };
            env.write_to(&mut out).unwrap();
        }
        self.source.encode(&mut out);
        write_varint(&mut out, self.notes.len() as u64).unwrap();
        for note in &self.notes {
            note.encode(&mut out);
        }
        write_varint(&mut out, self.assigned_datasets.len() as u64).unwrap();
        for ad in &self.assigned_datasets {
            write_varint(&mut out, ad.name.len() as u64).unwrap();
            out.extend_from_slice(ad.name.as_bytes());
            match &ad.id {
                Some(id) => {
                    out.push(1);
                    write_varint(&mut out, id.len() as u64).unwrap();
                    out.extend_from_slice(id.as_bytes());
                }
                None => out.push(0),
            }
        }
        out
    }

    pub fn decode_body(bytes: &[u8]) -> Result<Self> {
        let (md, _consumed) = Self::decode_body_prefix(bytes)?;
        Ok(md)
    }

    /// Like [`decode_body`](Self::decode_body), but also reports how many
    /// leading bytes of `bytes` the record consumed — needed by the `!D`
    /// stream frame, whose metadata body has no length prefix of its own.
    pub fn decode_body_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        use std::io::Read;
        let mut cursor = std::io::Cursor::new(bytes);
        let count = read_varint(&mut cursor, 0)?;
        let mut entries = Vec::with_capacity(count as usize);
        let mut arena = Vec::new();
        for _ in 0..count {
            let pos = cursor.position();
            let env = RawEnvelope::read_from(&mut cursor, pos)?;
            match Code::from_u8(env.type_code) {
                Some(code) => {
                    let value = Value::decode(code, &env.payload)?;
                    let slot = arena.len() as u32;
                    arena.push(value);
                    entries.push(Entry::Known(code, slot));
                }
                None => entries.push(Entry::Unknown(env)),
            }
        }
        let source = Source::decode(&mut cursor)?;
        let note_count = read_varint(&mut cursor, cursor.position())?;
        let mut notes = Vec::with_capacity(note_count as usize);
        for _ in 0..note_count {
            notes.push(Note::decode(&mut cursor)?);
        }
        let ad_count = read_varint(&mut cursor, cursor.position())?;
        let mut assigned_datasets = Vec::with_capacity(ad_count as usize);
        for _ in 0..ad_count {
            let name_len = read_varint(&mut cursor, cursor.position())? as usize;
            let mut name_buf = vec![0u8; name_len];
            cursor.read_exact(&mut name_buf)?;
            let name = String::from_utf8(name_buf)
                .map_err(|_| crate::error::ArkError::format("non-utf8 assigned-dataset name", cursor.position()))?;
            let mut has_id = [0u8; 1];
            cursor.read_exact(&mut has_id)?;
            let id = if has_id[0] == 1 {
                let id_len = read_varint(&mut cursor, cursor.position())? as usize;
                let mut id_buf = vec![0u8; id_len];
                cursor.read_exact(&mut id_buf)?;
                Some(
                    String::from_utf8(id_buf)
                        .map_err(|_| crate::error::ArkError::format("non-utf8 assigned-dataset id", cursor.position()))?,
                )
            } else {
                None
            };
            assigned_datasets.push(AssignedDataset { name, id });
        }
        Ok((
            Metadata {
                entries,
                arena,
                source,
                notes,
                assigned_datasets,
            },
            cursor.position() as usize,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::scalar_dims::Run;

    #[test]
    fn set_preserves_insertion_order_on_replace() {
        let mut m = Metadata::new();
        m.set(Value::Run(Run(10)));
        m.set(Value::Task(crate::types::scalar_dims::Task("a".into())));
        m.set(Value::Run(Run(20)));
        assert_eq!(m.codes(), vec![Code::Run, Code::Task]);
        assert_eq!(m.get(Code::Run), Some(&Value::Run(Run(20))));
    }

    #[test]
    fn body_roundtrip_preserves_unknown_dimension() {
        let mut m = Metadata::new();
        m.set(Value::Run(Run(90)));
        m.add_note("test note");
        m.assign_dataset("ds1", Some("42".into()));

        // Build the body by hand so an envelope with a type code this
        // build's `Code` enum doesn't define sits inside the entries
        // section, as it would on a real stream from a newer writer.
        let mut body = Vec::new();
        write_varint(&mut body, 2).unwrap();
        RawEnvelope {
            type_code: Code::Run as u8,
            payload: {
                let mut p = Vec::new();
                Run(90).encode(&mut p);
                p
            },
        }
        .write_to(&mut body)
        .unwrap();
        RawEnvelope {
            type_code: 200,
            payload: vec![9, 9, 9],
        }
        .write_to(&mut body)
        .unwrap();
        m.source.encode(&mut body);
        write_varint(&mut body, m.notes.len() as u64).unwrap();
        for note in &m.notes {
            note.encode(&mut body);
        }
        write_varint(&mut body, m.assigned_datasets.len() as u64).unwrap();
        for ad in &m.assigned_datasets {
            write_varint(&mut body, ad.name.len() as u64).unwrap();
            body.extend_from_slice(ad.name.as_bytes());
            body.push(1);
            let id = ad.id.as_ref().unwrap();
            write_varint(&mut body, id.len() as u64).unwrap();
            body.extend_from_slice(id.as_bytes());
        }

        let back = Metadata::decode_body(&body).unwrap();
        assert_eq!(back.get(Code::Run), Some(&Value::Run(Run(90))));
        assert_eq!(back.notes.len(), 1);
        assert_eq!(back.assigned_datasets[0].name, "ds1");
        let re_encoded = back.encode_body();
        assert_eq!(re_encoded, body);
    }
}
