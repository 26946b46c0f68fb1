//! Dataset-global index: "one relational store keyed on the
//! configured `index` dimensions plus `reftime`", used by the `ondisk2`
//! and `simple` engine variants. Physically one file under the dataset
//! root (`index.sqlite` for `ondisk2`, `MANIFEST` for `simple` in the
//! original naming — both are this same hand-rolled row store here; see
//! DESIGN.md).

use std::path::{Path, PathBuf};

use crate::config::ReplaceStrategy;
use crate::error::Result;
use crate::index::store::{InsertOutcome, Row, RowStore};
use crate::matcher::Matcher;
use crate::types::Code;

pub struct GlobalIndex {
    path: PathBuf,
    unique_codes: Vec<Code>,
    index_codes: Vec<Code>,
    store: RowStore,
}

impl GlobalIndex {
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

    /// Candidates come from the most selective
    /// indexed dimension present in the matcher, then every remaining
    /// clause (including any not-indexed dimension) is applied post-hoc.
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Source;
    use crate::types::{Reftime, Time, Value};

    fn md_at(day: u8) -> crate::metadata::Metadata {
        let mut md = crate::metadata::Metadata::with_source(Source::Blob {
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
    fn insert_then_reload_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        {
            let mut idx = GlobalIndex::open(&path, vec![Code::Reftime], vec![]).unwrap();
            idx.insert(&md_at(15), None, ReplaceStrategy::Never).unwrap();
            idx.insert(&md_at(16), None, ReplaceStrategy::Never).unwrap();
            idx.save().unwrap();
        }
        let reopened = GlobalIndex::open(&path, vec![Code::Reftime], vec![]).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn lookup_applies_matcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        let mut idx = GlobalIndex::open(&path, vec![Code::Reftime], vec![]).unwrap();
        idx.insert(&md_at(15), None, ReplaceStrategy::Never).unwrap();
        idx.insert(&md_at(16), None, ReplaceStrategy::Never).unwrap();
        let m = Matcher::parse("reftime:=2024-01-15").unwrap();
        let rows = idx.lookup(&m).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
