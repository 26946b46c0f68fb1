//! Shared row storage backing both index shapes: a flat list of
//! stored metadata records, a unique-key map for duplicate detection, and
//! one secondary lookup table per configured `index` dimension.
//!
//! Grounded on a shared index-file-format split (one physical record
//! layout, reused by both the dataset-global index and the per-segment
//! index); generalized from a single "by node type" inverted index to
//! one inverted index per configured dimension.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ReplaceStrategy;
use crate::error::Result;
use crate::metadata::Metadata;
use crate::types::Code;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRow {
    metadata_body: Vec<u8>,
    usn: Option<i64>,
    deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RowStoreFile {
    rows: Vec<StoredRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Replaced,
    Duplicate,
}

/// One row as handed back to a caller walking lookup results: its live
/// position (needed by the checker to mark it deleted or by repack to
/// build the keep-list) plus the stored metadata.
#[derive(Debug, Clone)]
pub struct Row {
    pub row_id: usize,
    pub metadata: Metadata,
}

/// Hashes the configured `unique` dimensions' encoded values into a fixed
/// 32-byte dedup key, `None` when no dimension is configured as unique
/// (no uniqueness constraint). A fixed-size digest keeps the duplicate
/// lookup table's keys cheap to hash and compare regardless of how large
/// the underlying values (e.g. an `area` polygon) happen to be.
fn key_fingerprint(codes: &[Code], md: &Metadata) -> Option<[u8; 32]> {
    if codes.is_empty() {
        return None;
    }
    let mut out = Vec::new();
    for code in codes {
        out.push(*code as u8);
        match md.get(*code) {
            Some(v) => {
                let enc = v.encode();
                out.extend_from_slice(&(enc.len() as u32).to_le_bytes());
                out.extend_from_slice(&enc);
            }
            None => out.push(0xff),
        }
    }
    Some(*blake3::hash(&out).as_bytes())
}

/// A flat list of stored metadata rows with unique-key dedup and
/// per-dimension secondary lookup, shared by [`crate::index::global::GlobalIndex`]
/// and [`crate::index::segment_index::SegmentIndex`].
#[derive(Default)]
pub struct RowStore {
    rows: Vec<StoredRow>,
    unique_by_key: HashMap<[u8; 32], usize>,
    by_dimension: BTreeMap<Code, BTreeMap<Vec<u8>, Vec<usize>>>,
}

impl RowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.iter().filter(|r| !r.deleted).count()
    }

    /// Total row slots ever assigned, including logically deleted ones —
    /// an upper bound for callers that need to enumerate ids rather than
    /// live rows (e.g. a full matcher-less scan with no indexed dimension
    /// to narrow by).
    pub fn row_count_total(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rebuild_views(&mut self, unique_codes: &[Code], index_codes: &[Code]) -> Result<()> {
        self.unique_by_key.clear();
        self.by_dimension.clear();
        for (row_id, row) in self.rows.iter().enumerate() {
            if row.deleted {
                continue;
            }
            let md = Metadata::decode_body(&row.metadata_body)?;
            if let Some(key) = key_fingerprint(unique_codes, &md) {
                self.unique_by_key.insert(key, row_id);
            }
            for code in index_codes {
                if let Some(v) = md.get(*code) {
                    self.by_dimension
                        .entry(*code)
                        .or_default()
                        .entry(v.encode())
                        .or_default()
                        .push(row_id);
                }
            }
        }
        Ok(())
    }

    /// Insert or replace per `replace` (insert-policy table). `usn`
    /// is the caller-extracted Update-Sequence-Number used by
    /// `higher_usn`; datasets that don't carry one pass `None`, which is
    /// always treated as lower than any concrete USN.
    pub fn insert(
        &mut self,
        unique_codes: &[Code],
        index_codes: &[Code],
        md: &Metadata,
        usn: Option<i64>,
        replace: ReplaceStrategy,
    ) -> Result<InsertOutcome> {
        let key = key_fingerprint(unique_codes, md);
        let existing = key.and_then(|k| self.unique_by_key.get(&k).copied());

        match existing {
            None => {
                self.push_row(index_codes, md, usn, key)?;
                Ok(InsertOutcome::Inserted)
            }
            Some(old_row_id) => match replace {
                ReplaceStrategy::Never => Ok(InsertOutcome::Duplicate),
                ReplaceStrategy::Always => {
                    self.rows[old_row_id].deleted = true;
                    self.push_row(index_codes, md, usn, key)?;
                    Ok(InsertOutcome::Replaced)
                }
                ReplaceStrategy::HigherUsn => {
                    let old_usn = self.rows[old_row_id].usn;
                    if usn > old_usn {
                        self.rows[old_row_id].deleted = true;
                        self.push_row(index_codes, md, usn, key)?;
                        Ok(InsertOutcome::Replaced)
                    } else {
                        Ok(InsertOutcome::Duplicate)
                    }
                }
            },
        }
    }

    fn push_row(&mut self, index_codes: &[Code], md: &Metadata, usn: Option<i64>, key: Option<[u8; 32]>) -> Result<()> {
        let row_id = self.rows.len();
        self.rows.push(StoredRow {
            metadata_body: md.encode_body(),
            usn,
            deleted: false,
        });
        if let Some(key) = key {
            self.unique_by_key.insert(key, row_id);
        }
        for code in index_codes {
            if let Some(v) = md.get(*code) {
                self.by_dimension
                    .entry(*code)
                    .or_default()
                    .entry(v.encode())
                    .or_default()
                    .push(row_id);
            }
        }
        Ok(())
    }

    /// Logical delete: the row stops appearing in lookups but its bytes
    /// stay in the segment until a repack reclaims them (used by the
    /// `always` replace policy).
    pub fn mark_deleted(&mut self, row_id: usize) {
        if let Some(row) = self.rows.get_mut(row_id) {
            row.deleted = true;
        }
    }

    /// All non-deleted rows whose dimension at `code` matches `accept`,
    /// or every non-deleted row if `code` has no secondary index built
    /// for it ("dimensions not in `index` are evaluated post-hoc").
    pub fn candidates_for(&self, code: Code) -> Box<dyn Iterator<Item = usize> + '_> {
        match self.by_dimension.get(&code) {
            Some(buckets) => Box::new(buckets.values().flatten().copied()),
            None => Box::new((0..self.rows.len()).filter(|i| !self.rows[*i].deleted)),
        }
    }

    pub fn all_rows(&self) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for (row_id, row) in self.rows.iter().enumerate() {
            if row.deleted {
                continue;
            }
            out.push(Row {
                row_id,
                metadata: Metadata::decode_body(&row.metadata_body)?,
            });
        }
        Ok(out)
    }

    /// Every logically-deleted row, for the checker's per-segment
    /// `deleted_bytes` accounting (`scan`).
    pub fn deleted_rows(&self) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for (row_id, row) in self.rows.iter().enumerate() {
            if row.deleted {
                out.push(Row {
                    row_id,
                    metadata: Metadata::decode_body(&row.metadata_body)?,
                });
            }
        }
        Ok(out)
    }

    pub fn get(&self, row_id: usize) -> Result<Option<Row>> {
        match self.rows.get(row_id) {
            Some(row) if !row.deleted => Ok(Some(Row {
                row_id,
                metadata: Metadata::decode_body(&row.metadata_body)?,
            })),
            _ => Ok(None),
        }
    }

    /// Bytes freed by a repack: the encoded size of every still-deleted
    /// row, approximated by the message size carried in its `Source`.
    pub fn deleted_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for row in &self.rows {
            if row.deleted {
                let md = Metadata::decode_body(&row.metadata_body)?;
                total += md.source.size().unwrap_or(0);
            }
        }
        Ok(total)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = RowStoreFile { rows: self.rows.clone() };
        let bytes = bincode::serialize(&file)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path, unique_codes: &[Code], index_codes: &[Code]) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = fs::read(path)?;
        let file: RowStoreFile = bincode::deserialize(&bytes)?;
        let mut store = RowStore {
            rows: file.rows,
            unique_by_key: HashMap::new(),
            by_dimension: BTreeMap::new(),
        };
        store.rebuild_views(unique_codes, index_codes)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Source;
    use crate::types::{Reftime, Time, Value};

    fn md_at(day: u8) -> Metadata {
        let mut md = Metadata::with_source(Source::Blob {
            format: "grib".into(),
            basedir: "/data".into(),
            relpath: "2024/01".into(),
            offset: 0,
            size: 10,
        });
        md.set(Value::Reftime(Reftime::Position(Time::new(2024, 1, day, 0, 0, 0))));
        md
    }

    #[test]
    fn never_rejects_duplicate() {
        let mut store = RowStore::new();
        let unique = [Code::Reftime];
        assert_eq!(
            store.insert(&unique, &[], &md_at(15), None, ReplaceStrategy::Never).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert(&unique, &[], &md_at(15), None, ReplaceStrategy::Never).unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn higher_usn_replaces_only_when_strictly_higher() {
        let mut store = RowStore::new();
        let unique = [Code::Reftime];
        store
            .insert(&unique, &[], &md_at(15), Some(3), ReplaceStrategy::HigherUsn)
            .unwrap();
        assert_eq!(
            store
                .insert(&unique, &[], &md_at(15), Some(2), ReplaceStrategy::HigherUsn)
                .unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(
            store
                .insert(&unique, &[], &md_at(15), Some(4), ReplaceStrategy::HigherUsn)
                .unwrap(),
            InsertOutcome::Replaced
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_and_load_roundtrips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.bin");
        let mut store = RowStore::new();
        let unique = [Code::Reftime];
        store.insert(&unique, &[], &md_at(15), None, ReplaceStrategy::Never).unwrap();
        store.insert(&unique, &[], &md_at(16), None, ReplaceStrategy::Never).unwrap();
        store.save(&path).unwrap();

        let loaded = RowStore::load(&path, &unique, &[]).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn deleted_rows_are_excluded_from_len_and_candidates() {
        let mut store = RowStore::new();
        let unique = [Code::Reftime];
        store.insert(&unique, &[], &md_at(15), None, ReplaceStrategy::Never).unwrap();
        assert_eq!(store.len(), 1);
        store.mark_deleted(0);
        assert_eq!(store.len(), 0);
        assert!(store.get(0).unwrap().is_none());
    }
}
