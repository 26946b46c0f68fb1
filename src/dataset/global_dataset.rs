//! The `simple`/`ondisk2` dataset variants: a flat file
//! segment per step bucket, indexed by one dataset-wide [`GlobalIndex`].
//! A single index with no per-segment partitioning means the query
//! evaluator's segment-candidate pruning buys nothing here —
//! `GlobalDataset` answers queries straight out of `GlobalIndex::lookup`
//! instead of going through [`crate::query::QueryBackend`], which
//! [`super::iseg_dataset::IsegDataset`] uses instead. See DESIGN.md.

use std::any::Any;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::checker::CheckerBackend;
use crate::config::DatasetConfig;
use crate::dispatch::DatasetAcceptor;
use crate::error::{ArkError, Result};
use crate::index::{GlobalIndex, InsertOutcome, Row};
use crate::matcher::{DimMatch, Matcher};
use crate::metadata::{Metadata, Source, Summary};
use crate::query::{sort, QueryResult, SortInterval};
use crate::segment::{SegmentChecker, SegmentWriter};
use crate::summary_cache::SummaryCache;
use crate::types::Code;

use super::scanner::LengthPrefixedScanner;
use super::{layout, Dataset};

const INDEX_FILENAME_SIMPLE: &str = "MANIFEST";
const INDEX_FILENAME_ONDISK2: &str = "index.sqlite";

pub struct GlobalDataset {
    cfg: DatasetConfig,
    filter: Option<Matcher>,
    index: GlobalIndex,
    summaries: SummaryCache,
}

impl GlobalDataset {
    pub fn open(cfg: DatasetConfig) -> Result<Self> {
        let filter = cfg.filter.as_deref().map(Matcher::parse).transpose()?;
        let index_name = match cfg.dataset_type {
            crate::config::DatasetType::Simple => INDEX_FILENAME_SIMPLE,
            _ => INDEX_FILENAME_ONDISK2,
        };
        std::fs::create_dir_all(&cfg.path)?;
        let index = GlobalIndex::open(cfg.path.join(index_name), cfg.unique.clone(), cfg.index.clone())?;
        let summaries = SummaryCache::open(&cfg.path)?;
        Ok(Self {
            cfg,
            filter,
            index,
            summaries,
        })
    }

    fn results(&self, matcher: &Matcher, sort_by: Option<SortInterval>) -> Result<Vec<QueryResult>> {
        let mut results: Vec<QueryResult> = self
            .index
            .lookup(matcher)?
            .into_iter()
            .map(|row| QueryResult {
                relpath: blob_relpath(&row),
                row,
            })
            .collect();
        match sort_by {
            Some(interval) => sort::sort_results(&mut results, interval),
            // Default order is segment-name ascending then segment-order,
            // not a global reftime sort — see src/query/mod.rs.
            None => results.sort_by(|a, b| a.relpath.cmp(&b.relpath).then_with(|| a.row.row_id.cmp(&b.row.row_id))),
        }
        Ok(results)
    }
}

fn blob_relpath(row: &Row) -> PathBuf {
    match &row.metadata.source {
        Source::Blob { relpath, .. } => relpath.clone(),
        _ => PathBuf::new(),
    }
}

impl Dataset for GlobalDataset {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    fn acquire(&mut self, mut md: Metadata) -> Result<InsertOutcome> {
        let reftime = md
            .reftime()
            .ok_or_else(|| ArkError::Consistency("record has no reftime; cannot pick a segment".into()))?;
        let when = reftime.interval().start;
        let relpath = self.cfg.step.relpath(when);

        let payload = match &md.source {
            Source::Inline(bytes) => bytes.clone(),
            other => {
                return Err(ArkError::Consistency(format!(
                    "acquire expects an inline-sourced record, got {other:?}"
                )))
            }
        };

        let mut writer = layout::open_writer(&self.cfg, &relpath)?;
        // A directory member is one file per message, already self-delimited
        // by the filesystem; only a flat file segment needs the varint
        // length-prefix frame so `scan_data` can re-derive message
        // boundaries later.
        let (stored_offset, stored_size) = if layout::is_directory_layout(&self.cfg) {
            let (seq, size) = writer.append(&payload)?;
            (seq, size)
        } else {
            let (frame, prefix_len) = LengthPrefixedScanner::frame(&payload);
            let (frame_offset, _frame_len) = writer.append(&frame)?;
            (frame_offset + prefix_len, payload.len() as u64)
        };
        writer.commit()?;

        md.source = Source::Blob {
            format: self.cfg.format.clone(),
            basedir: self.cfg.path.clone(),
            relpath: relpath.clone(),
            offset: stored_offset,
            size: stored_size,
        };
        let usn = super::extract_usn(&md);
        let outcome = self.index.insert(&md, usn, self.cfg.replace)?;
        if !matches!(outcome, InsertOutcome::Duplicate) {
            self.summaries.invalidate(self.cfg.step.interval(when))?;
            if !self.cfg.eatmydata {
                self.index.save()?;
            }
        }
        Ok(outcome)
    }

    fn query_metadata(&self, matcher: &Matcher, sort: Option<SortInterval>) -> Result<Vec<QueryResult>> {
        self.results(matcher, sort)
    }

    fn query_bytes(
        &self,
        matcher: &Matcher,
        sort_by: Option<SortInterval>,
        sink: &mut dyn Write,
        postprocess: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<u64> {
        let mut written = 0u64;
        let mut open_relpath: Option<PathBuf> = None;
        let mut reader: Option<Box<dyn crate::segment::SegmentReader>> = None;
        for result in self.results(matcher, sort_by)? {
            if open_relpath.as_deref() != Some(result.relpath.as_path()) {
                reader = Some(layout::open_reader(&self.cfg, &result.relpath));
                open_relpath = Some(result.relpath.clone());
            }
            let (offset, size) = result
                .row
                .metadata
                .source
                .location()
                .ok_or_else(|| ArkError::Query("matched record has no stored location".into()))?;
            let bytes = reader.as_ref().unwrap().read(offset, size)?;
            let out = postprocess(&bytes)?;
            sink.write_all(&out)?;
            written += out.len() as u64;
        }
        Ok(written)
    }

    fn query_summary(&self, matcher: &Matcher) -> Result<Summary> {
        self.summaries.query_summary(matcher, |year, month| {
            let month_start = crate::types::Time::new(year, month, 1, 0, 0, 0);
            let month_matcher = Matcher::new(vec![(
                Code::Reftime,
                DimMatch::Reftime {
                    ge: Some(month_start),
                    lt: Some(month_start.start_of_next_month()),
                },
            )]);
            let mut s = Summary::new();
            for row in self.index.lookup(&month_matcher)? {
                s.add(&row.metadata);
            }
            Ok(s)
        })
    }

    fn flush(&mut self) -> Result<()> {
        self.index.save()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DatasetAcceptor for GlobalDataset {
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

impl CheckerBackend for GlobalDataset {
    fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    fn on_disk_segments(&self) -> Result<Vec<PathBuf>> {
        layout::scan_on_disk(&self.cfg)
    }

    fn indexed_segments(&self) -> Result<Vec<PathBuf>> {
        let mut set = BTreeSet::new();
        for row in self.index.all()? {
            set.insert(blob_relpath(&row));
        }
        Ok(set.into_iter().collect())
    }

    fn deleted_bytes(&self, relpath: &Path) -> Result<u64> {
        let mut total = 0u64;
        for row in self.index.deleted_rows()? {
            if blob_relpath(&row) == relpath {
                total += row.metadata.source.size().unwrap_or(0);
            }
        }
        Ok(total)
    }

    fn segment_interval(&self, relpath: &Path) -> crate::types::Interval {
        let representative = self
            .index
            .all()
            .ok()
            .and_then(|rows| {
                rows.into_iter()
                    .find(|r| blob_relpath(r) == relpath)
                    .and_then(|r| r.metadata.reftime().map(|rt| rt.interval().start))
            })
            .or_else(|| self.cfg.step.parse_relpath(relpath))
            .unwrap_or(crate::types::Time::new(1970, 1, 1, 0, 0, 0));
        self.cfg.step.interval(representative)
    }

    fn live_rows(&self, relpath: &Path) -> Result<Vec<Row>> {
        Ok(self.index.all()?.into_iter().filter(|r| blob_relpath(r) == relpath).collect())
    }

    fn open_segment_checker(&self, relpath: &Path) -> Result<Box<dyn SegmentChecker>> {
        Ok(layout::open_checker(&self.cfg, relpath))
    }

    fn reindex(&mut self, relpath: &Path, records: &[Metadata]) -> Result<()> {
        for row in self.index.all()?.into_iter().filter(|r| blob_relpath(r) == relpath) {
            self.index.mark_deleted(row.row_id);
        }
        for md in records {
            self.index.insert(md, super::extract_usn(md), crate::config::ReplaceStrategy::Always)?;
        }
        self.index.save()
    }

    fn remove_segment_from_index(&mut self, relpath: &Path) -> Result<()> {
        for row in self.index.all()?.into_iter().filter(|r| blob_relpath(r) == relpath) {
            self.index.mark_deleted(row.row_id);
        }
        self.index.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfigBuilder, DatasetType, Step};
    use crate::types::{Reftime, Time, Value};

    fn cfg(dir: &Path) -> DatasetConfig {
        DatasetConfigBuilder::new("daily_grib", dir, DatasetType::Simple)
            .format("grib")
            .step(Step::Daily)
            .unique(vec![Code::Reftime])
            .build()
    }

    fn inline_md(day: u8) -> Metadata {
        let mut md = Metadata::with_source(Source::Inline(b"hello-message".to_vec()));
        md.set(Value::Reftime(Reftime::Position(Time::new(2024, 1, day, 0, 0, 0))));
        md
    }

    #[test]
    fn acquire_then_query_roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = GlobalDataset::open(cfg(dir.path())).unwrap();
        Dataset::acquire(&mut ds, inline_md(15)).unwrap();

        let matcher = Matcher::parse("reftime:=2024-01-15").unwrap();
        let results = ds.query_metadata(&matcher, None).unwrap();
        assert_eq!(results.len(), 1);

        let mut out = Vec::new();
        let written = ds.query_bytes(&matcher, None, &mut out, &|b| Ok(b.to_vec())).unwrap();
        assert_eq!(written, 13);
        assert_eq!(out, b"hello-message");
    }

    #[test]
    fn duplicate_reftime_is_rejected_under_never() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = GlobalDataset::open(cfg(dir.path())).unwrap();
        Dataset::acquire(&mut ds, inline_md(15)).unwrap();
        let outcome = Dataset::acquire(&mut ds, inline_md(15)).unwrap();
        assert_eq!(outcome, InsertOutcome::Duplicate);
    }

    #[test]
    fn checker_sees_segment_as_ok_right_after_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = GlobalDataset::open(cfg(dir.path())).unwrap();
        Dataset::acquire(&mut ds, inline_md(15)).unwrap();
        let states = crate::checker::scan(&ds, Time::new(2024, 1, 16, 0, 0, 0), None).unwrap();
        assert_eq!(states[&PathBuf::from("2024/01-15")].state, crate::segment::State::Ok);
    }

    #[test]
    fn query_summary_counts_acquired_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = GlobalDataset::open(cfg(dir.path())).unwrap();
        Dataset::acquire(&mut ds, inline_md(15)).unwrap();
        let summary = ds.query_summary(&Matcher::parse("reftime:>=2024-01-01,<2024-02-01").unwrap()).unwrap();
        assert_eq!(summary.total().count, 1);
    }
}
