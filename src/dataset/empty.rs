//! `empty` ("Format variants"): a dataset that never contains any
//! data. Queries always come back empty and acquisition always fails —
//! unlike [`super::discard::DiscardDataset`], which accepts input and
//! throws it away, `empty` is a placeholder for "nothing should ever be
//! routed here" (e.g. a disabled dataset kept in the config so existing
//! queries naming it don't error out).

use std::any::Any;
use std::io::Write;

use crate::config::DatasetConfig;
use crate::dispatch::DatasetAcceptor;
use crate::error::{ArkError, Result};
use crate::index::InsertOutcome;
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Summary};
use crate::query::{QueryResult, SortInterval};

use super::Dataset;

pub struct EmptyDataset {
    cfg: DatasetConfig,
}

impl EmptyDataset {
    pub fn open(cfg: DatasetConfig) -> Result<Self> {
        Ok(Self { cfg })
    }
}

impl Dataset for EmptyDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    fn acquire(&mut self, _md: Metadata) -> Result<InsertOutcome> {
        Err(ArkError::Consistency(format!("dataset '{}' is type `empty`; it accepts nothing", self.cfg.name)))
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

impl DatasetAcceptor for EmptyDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn filter(&self) -> Option<&Matcher> {
        // Never volunteers for dispatch: a dataset-level filter only
        // narrows which records an otherwise-willing dataset keeps, but
        // `empty` is never willing, so it has nothing to narrow.
        None
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

    #[test]
    fn acquire_always_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = EmptyDataset::open(DatasetConfigBuilder::new("placeholder", dir.path(), DatasetType::Empty).build()).unwrap();
        let md = Metadata::with_source(Source::Inline(b"x".to_vec()));
        assert!(Dataset::acquire(&mut ds, md).is_err());
    }

    #[test]
    fn queries_always_come_back_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ds = EmptyDataset::open(DatasetConfigBuilder::new("placeholder", dir.path(), DatasetType::Empty).build()).unwrap();
        assert!(ds.query_metadata(&Matcher::empty(), None).unwrap().is_empty());
    }
}
