//! Per-segment index: "one small index file alongside each
//! segment; the dataset-level query fans out over matching segments ...
//! and unions results." Used by the `iseg` engine variant.

use std::path::{Path, PathBuf};

use crate::config::ReplaceStrategy;
use crate::error::Result;
use crate::index::store::{InsertOutcome, Row, RowStore};
use crate::matcher::Matcher;
use crate::types::Code;

/// Sidecar extension for a segment's own index file, alongside
/// `.metadata`/`.summary` (on-disk layout).
pub const INDEX_EXTENSION: &str = "index";

pub struct SegmentIndex {
    path: PathBuf,
    unique_codes: Vec<Code>,
    index_codes: Vec<Code>,
    store: RowStore,
}

impl SegmentIndex {
    pub fn open(path: impl Into<PathBuf>, unique_codes: Vec<Code>, index_codes: Vec<Code>) -> Result<Self> {
        let path = path.into();
        let store = RowStore::load(&path, &unique_codes, &index_codes)?;
        Ok(Self {
            path,
            unique_codes,
            index_codes,
            store,
        })
    }

    pub fn insert(&mut self, md: &crate::metadata::Metadata, usn: Option<i64>, replace: ReplaceStrategy) -> Result<InsertOutcome> {
        self.store.insert(&self.unique_codes, &self.index_codes, md, usn, replace)
    }

    pub fn mark_deleted(&mut self, row_id: usize) {
        self.store.mark_deleted(row_id)
    }

    pub fn deleted_bytes(&self) -> Result<u64> {
        self.store.deleted_bytes()
    }

    pub fn lookup(&self, matcher: &Matcher) -> Result<Vec<Row>> {
        let narrowing_code = self
            .index_codes
            .iter()
            .find(|code| matcher.clause_for(**code).is_some());
        let candidate_ids: Box<dyn Iterator<Item = usize>> = match narrowing_code {
            Some(code) => self.store.candidates_for(*code),
            None => Box::new(0..self.store.row_count_total()),
        };
        let mut out = Vec::new();
        for row_id in candidate_ids {
            if let Some(row) = self.store.get(row_id)? {
                if matcher.accepts(&row.metadata) {
                    out.push(row);
                }
            }
        }
        Ok(out)
    }

    pub fn all(&self) -> Result<Vec<Row>> {
        self.store.all_rows()
    }

    pub fn deleted_rows(&self) -> Result<Vec<Row>> {
        self.store.deleted_rows()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild this segment's index from scratch given freshly re-scanned
    /// metadata (checker `scan_data`), discarding whatever was there
    /// before — used after a repack or a corruption repair.
    pub fn rebuild(&mut self, records: &[crate::metadata::Metadata]) -> Result<()> {
        self.store = RowStore::new();
        for md in records {
            self.store
                .insert(&self.unique_codes, &self.index_codes, md, None, ReplaceStrategy::Always)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Source;
    use crate::types::{Reftime, Time, Value};

    fn md_at(offset: u64, day: u8) -> crate::metadata::Metadata {
        let mut md = crate::metadata::Metadata::with_source(Source::Blob {
            format: "grib".into(),
            basedir: "/data".into(),
            relpath: "2024/01-15".into(),
            offset,
            size: 10,
        });
        md.set(Value::Reftime(Reftime::Position(Time::new(2024, 1, day, 0, 0, 0))));
        md
    }

    #[test]
    fn rebuild_replaces_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024/01-15.index");
        let mut idx = SegmentIndex::open(&path, vec![Code::Reftime], vec![]).unwrap();
        idx.insert(&md_at(0, 15), None, ReplaceStrategy::Never).unwrap();
        assert_eq!(idx.len(), 1);
        idx.rebuild(&[md_at(0, 15), md_at(10, 16)]).unwrap();
        assert_eq!(idx.len(), 2);
    }
}
