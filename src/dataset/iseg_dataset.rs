//! The `iseg` dataset variant: one [`SegmentIndex`] per
//! segment instead of a single dataset-wide index, so the query
//! evaluator's candidate pruning actually earns its keep — a
//! lookup only opens the handful of per-segment indices the matcher's
//! reftime span could possibly touch, rather than scanning every row the
//! dataset has ever seen. See `global_dataset.rs`'s doc comment and
//! DESIGN.md.

use std::any::Any;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::checker::CheckerBackend;
use crate::config::{DatasetConfig, Step};
use crate::dispatch::DatasetAcceptor;
use crate::error::{ArkError, Result};
use crate::index::{segment_index::INDEX_EXTENSION, InsertOutcome, Row, SegmentIndex};
use crate::matcher::{DimMatch, Matcher};
use crate::metadata::{Metadata, Source, Summary};
use crate::query::{self, QueryBackend, QueryResult, SortInterval};
use crate::segment::{SegmentChecker, SegmentReader, SegmentWriter};
use crate::summary_cache::SummaryCache;
use crate::types::{Code, Interval, Time};

use super::scanner::LengthPrefixedScanner;
use super::{layout, Dataset};

fn index_path(cfg: &DatasetConfig, relpath: &Path) -> PathBuf {
    let mut p = layout::data_path(cfg, relpath);
    p.set_extension(format!("{}.{INDEX_EXTENSION}", cfg.format));
    p
}

pub struct IsegDataset {
    cfg: DatasetConfig,
    filter: Option<Matcher>,
    summaries: SummaryCache,
    // Lazily opened and kept alive for the dataset's lifetime; a segment's
    // index is small (one file's worth of rows) so there is no eviction
    // policy here, unlike the reader LRUs session.rs keeps for open file
    // handles.
    indices: Mutex<BTreeMap<PathBuf, SegmentIndex>>,
    extent: Mutex<Option<Interval>>,
}

impl IsegDataset {
    pub fn open(cfg: DatasetConfig) -> Result<Self> {
        let filter = cfg.filter.as_deref().map(Matcher::parse).transpose()?;
        std::fs::create_dir_all(&cfg.path)?;
        let summaries = SummaryCache::open(&cfg.path)?;
        let mut extent: Option<Interval> = None;
        for relpath in layout::scan_on_disk(&cfg)? {
            if let Some(when) = cfg.step.parse_relpath(&relpath) {
                let iv = cfg.step.interval(when);
                extent = Some(match extent {
                    Some(e) => Interval::new(e.start.min(iv.start), e.end.max(iv.end)),
                    None => iv,
                });
            }
        }
        Ok(Self {
            cfg,
            filter,
            summaries,
            indices: Mutex::new(BTreeMap::new()),
            extent: Mutex::new(extent),
        })
    }

    /// Opens (loading from disk, or creating empty) the per-segment index
    /// for `relpath`, caching it for the rest of the dataset's lifetime.
    fn with_index<T>(&self, relpath: &Path, f: impl FnOnce(&mut SegmentIndex) -> Result<T>) -> Result<T> {
        let mut indices = self.indices.lock().unwrap();
        if !indices.contains_key(relpath) {
            let idx = SegmentIndex::open(index_path(&self.cfg, relpath), self.cfg.unique.clone(), self.cfg.index.clone())?;
            indices.insert(relpath.to_path_buf(), idx);
        }
        f(indices.get_mut(relpath).unwrap())
    }

    fn widen_extent(&self, when: Time) {
        let iv = self.cfg.step.interval(when);
        let mut extent = self.extent.lock().unwrap();
        *extent = Some(match *extent {
            Some(e) => Interval::new(e.start.min(iv.start), e.end.max(iv.end)),
            None => iv,
        });
    }

    /// Every relpath with an index sidecar file on disk, regardless of
    /// whether the data file itself is still there (`Missing`).
    fn indexed_relpaths(&self) -> Result<Vec<PathBuf>> {
        let mut out: std::collections::BTreeSet<PathBuf> = self.indices.lock().unwrap().keys().cloned().collect();
        if self.cfg.path.exists() {
            walk_index_sidecars(&self.cfg.path, &self.cfg.path, &self.cfg.format, &mut out)?;
        }
        Ok(out.into_iter().collect())
    }
}

fn walk_index_sidecars(root: &Path, dir: &Path, format: &str, out: &mut std::collections::BTreeSet<PathBuf>) -> Result<()> {
    let suffix = format!(".{format}.{INDEX_EXTENSION}");
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_index_sidecars(root, &path, format, out)?;
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(&suffix) {
                let relpath = path.strip_prefix(root).unwrap().with_extension("").with_extension("");
                out.insert(relpath);
            }
        }
    }
    Ok(())
}

impl QueryBackend for IsegDataset {
    fn step(&self) -> Step {
        self.cfg.step
    }

    fn known_interval(&self) -> Option<Interval> {
        *self.extent.lock().unwrap()
    }

    fn segment_rows(&self, relpath: &Path, matcher: &Matcher) -> Result<Vec<Row>> {
        if !layout::exists(&self.cfg, relpath) && !index_path(&self.cfg, relpath).exists() {
            return Ok(Vec::new());
        }
        self.with_index(relpath, |idx| idx.lookup(matcher))
    }

    fn open_segment_reader(&self, relpath: &Path) -> Result<Box<dyn SegmentReader>> {
        Ok(layout::open_reader(&self.cfg, relpath))
    }
}

impl Dataset for IsegDataset {
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
        let replace = self.cfg.replace;
        let outcome = self.with_index(&relpath, |idx| idx.insert(&md, usn, replace))?;
        if !matches!(outcome, InsertOutcome::Duplicate) {
            self.widen_extent(when);
            self.summaries.invalidate(self.cfg.step.interval(when))?;
            if !self.cfg.eatmydata {
                self.with_index(&relpath, |idx| idx.save())?;
            }
        }
        Ok(outcome)
    }

    fn query_metadata(&self, matcher: &Matcher, sort: Option<SortInterval>) -> Result<Vec<QueryResult>> {
        query::evaluate(self, matcher, sort)
    }

    fn query_bytes(
        &self,
        matcher: &Matcher,
        sort: Option<SortInterval>,
        sink: &mut dyn Write,
        postprocess: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<u64> {
        query::query_bytes(self, matcher, sort, sink, postprocess)
    }

    fn query_summary(&self, matcher: &Matcher) -> Result<Summary> {
        self.summaries.query_summary(matcher, |year, month| {
            let month_start = Time::new(year, month, 1, 0, 0, 0);
            let span = Interval::new(month_start, month_start.start_of_next_month());
            let month_matcher = Matcher::new(vec![(
                Code::Reftime,
                DimMatch::Reftime {
                    ge: Some(span.start),
                    lt: Some(span.end),
                },
            )]);
            let mut s = Summary::new();
            for relpath in self.cfg.step.candidates(span) {
                for row in self.segment_rows(&relpath, &month_matcher)? {
                    s.add(&row.metadata);
                }
            }
            Ok(s)
        })
    }

    fn flush(&mut self) -> Result<()> {
        for idx in self.indices.lock().unwrap().values() {
            idx.save()?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DatasetAcceptor for IsegDataset {
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

impl CheckerBackend for IsegDataset {
    fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    fn on_disk_segments(&self) -> Result<Vec<PathBuf>> {
        layout::scan_on_disk(&self.cfg)
    }

    fn indexed_segments(&self) -> Result<Vec<PathBuf>> {
        self.indexed_relpaths()
    }

    fn deleted_bytes(&self, relpath: &Path) -> Result<u64> {
        if !index_path(&self.cfg, relpath).exists() && !self.indices.lock().unwrap().contains_key(relpath) {
            return Ok(0);
        }
        self.with_index(relpath, |idx| idx.deleted_bytes())
    }

    fn segment_interval(&self, relpath: &Path) -> Interval {
        let representative = self.cfg.step.parse_relpath(relpath).unwrap_or(Time::new(1970, 1, 1, 0, 0, 0));
        self.cfg.step.interval(representative)
    }

    fn live_rows(&self, relpath: &Path) -> Result<Vec<Row>> {
        if !index_path(&self.cfg, relpath).exists() && !self.indices.lock().unwrap().contains_key(relpath) {
            return Ok(Vec::new());
        }
        self.with_index(relpath, |idx| idx.all())
    }

    fn open_segment_checker(&self, relpath: &Path) -> Result<Box<dyn SegmentChecker>> {
        Ok(layout::open_checker(&self.cfg, relpath))
    }

    fn reindex(&mut self, relpath: &Path, records: &[Metadata]) -> Result<()> {
        self.with_index(relpath, |idx| idx.rebuild(records))?;
        self.with_index(relpath, |idx| idx.save())
    }

    fn remove_segment_from_index(&mut self, relpath: &Path) -> Result<()> {
        let ids: Vec<usize> = self.with_index(relpath, |idx| idx.all())?.into_iter().map(|r| r.row_id).collect();
        self.with_index(relpath, |idx| {
            for id in &ids {
                idx.mark_deleted(*id);
            }
            idx.save()
        })
    }
}
