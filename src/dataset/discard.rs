//! `discard` ("Format variants"): accepts and immediately throws away
//! every record. Useful for a dispatcher rule that should match and
//! consume input the way a real dataset would, without anyone wanting the
//! bytes kept — e.g. known-bad products en route to quarantine.
//!
//! Grounded on `global_dataset.rs`'s shape, minus the index and segments:
//! no on-disk state at all, so nothing here can ever need checking or
//! repacking.

use std::any::Any;
use std::io::Write;

use crate::config::DatasetConfig;
use crate::dispatch::DatasetAcceptor;
use crate::error::Result;
use crate::index::InsertOutcome;
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Summary};
use crate::query::{QueryResult, SortInterval};

use super::Dataset;

pub struct DiscardDataset {
    cfg: DatasetConfig,
    filter: Option<Matcher>,
}

impl DiscardDataset {
    pub fn open(cfg: DatasetConfig) -> Result<Self> {
        let filter = cfg.filter.as_deref().map(Matcher::parse).transpose()?;
        Ok(Self { cfg, filter })
    }
}

impl Dataset for DiscardDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    fn acquire(&mut self, _md: Metadata) -> Result<InsertOutcome> {
        Ok(InsertOutcome::Inserted)
    }

    fn query_metadata(&self, _matcher: &Matcher, _sort: Option<SortInterval>) -> Result<Vec<QueryResult>> {
        Ok(Vec::new())
    }

    fn query_bytes(
        &self,
        _matcher: &Matcher,
        _sort: Option<SortInterval>,
        _sink: &mut dyn Write,
        _postprocess: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<u64> {
        Ok(0)
    }

    fn query_summary(&self, _matcher: &Matcher) -> Result<Summary> {
        Ok(Summary::new())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DatasetAcceptor for DiscardDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn filter(&self) -> Option<&Matcher> {
        self.filter.as_ref()
    }

    fn acquire(&mut self, md: Metadata) -> Result<InsertOutcome> {
        Dataset::acquire(self, md)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfigBuilder, DatasetType};
    use crate::metadata::Source;
    use crate::types::{Reftime, Time, Value};

    #[test]
    fn acquire_succeeds_but_keeps_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = DiscardDataset::open(DatasetConfigBuilder::new("junk", dir.path(), DatasetType::Discard).build()).unwrap();
        let mut md = Metadata::with_source(Source::Inline(b"x".to_vec()));
        md.set(Value::Reftime(Reftime::Position(Time::new(2024, 1, 1, 0, 0, 0))));
        assert_eq!(Dataset::acquire(&mut ds, md).unwrap(), InsertOutcome::Inserted);
        assert!(ds.query_metadata(&Matcher::empty(), None).unwrap().is_empty());
    }
}
