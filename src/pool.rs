//! Pool: the writer/checker-map layer over a [`Session`]: "A Pool
//! layers over a Session and adds dispatcher state (the map of writers)
//! and checker state (the map of checkers). Pool operations are
//! synchronous; fan-out over datasets is sequential in the reference
//! design."
//!
//! Generalizes a name -> `Arc<Database>` manager map from one backing
//! type to the seven `Dataset` engine variants, reusing
//! [`crate::dispatch::Dispatcher`] for the routing half and
//! downcasting through [`Dataset::as_any_mut`] for the checker half —
//! there's no separate "checker object" per dataset, just a narrower view
//! of the same one, which is why Pool keeps a single map rather than two.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::checker::CheckerBackend;
use crate::config::{self, DatasetConfig, DatasetType};
use crate::dataset::{
    discard::DiscardDataset, empty::EmptyDataset, global_dataset::GlobalDataset, iseg_dataset::IsegDataset, outbound::OutboundDataset, scanner::LengthPrefixedScanner, Dataset,
};
use crate::dispatch::{DatasetAcceptor, DispatchResult, Dispatcher};
use crate::error::{ArkError, Result};
use crate::index::InsertOutcome;
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Summary};
use crate::query::{QueryResult, SortInterval};
use crate::segment::State;
use crate::session::Session;
use crate::types::Time;

#[cfg(feature = "http")]
use crate::dataset::http::HttpDataset;

fn open_dataset(cfg: DatasetConfig) -> Result<Box<dyn Dataset>> {
    Ok(match cfg.dataset_type {
        DatasetType::Simple | DatasetType::Ondisk2 => Box::new(GlobalDataset::open(cfg)?),
        DatasetType::Iseg => Box::new(IsegDataset::open(cfg)?),
        DatasetType::Discard => Box::new(DiscardDataset::open(cfg)?),
        DatasetType::Empty => Box::new(EmptyDataset::open(cfg)?),
        DatasetType::Outbound => Box::new(OutboundDataset::open(cfg)?),
        #[cfg(feature = "http")]
        DatasetType::Http => Box::new(HttpDataset::open(cfg)?),
        #[cfg(not(feature = "http"))]
        DatasetType::Http => return Err(ArkError::Config("dataset type 'http' requires the 'http' crate feature".into())),
    })
}

/// Wraps one open [`Dataset`] so it can also serve as a
/// [`DatasetAcceptor`] inside a [`Dispatcher`]: the filter is compiled
/// once here from the dataset's own config rather than recompiled on
/// every dispatch.
struct PoolEntry {
    dataset: Box<dyn Dataset>,
    filter: Option<Matcher>,
}

impl PoolEntry {
    fn new(dataset: Box<dyn Dataset>) -> Result<Self> {
        let filter = dataset.config().filter.as_deref().map(Matcher::parse).transpose()?;
        Ok(Self { dataset, filter })
    }
}

impl DatasetAcceptor for PoolEntry {
    fn name(&self) -> &str {
        self.dataset.name()
    }

    fn filter(&self) -> Option<&Matcher> {
        self.filter.as_ref()
    }

    fn acquire(&mut self, md: Metadata) -> Result<InsertOutcome> {
        self.dataset.acquire(md)
    }
}

pub struct Pool {
    pub session: Session,
    dispatcher: Dispatcher<PoolEntry>,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            session: Session::new(),
            dispatcher: Dispatcher::new("error", "duplicates"),
        }
    }

    /// Parses a companion sections file ("A companion sections file
    /// collects multiple datasets") and opens every section it names.
    /// Each section's own root directory defaults to `base_dir/<name>`
    /// unless it sets a `path` key.
    pub fn open_from_sections(base_dir: &Path, sections_text: &str) -> Result<Self> {
        let mut pool = Self::new();
        for (name, kv) in config::parse_sections(sections_text)? {
            let path = kv.get("path").map(PathBuf::from).unwrap_or_else(|| base_dir.join(&name));
            let cfg = config::config_from_section(&name, &kv, path)?;
            pool.register(cfg)?;
        }
        Ok(pool)
    }

    pub fn register(&mut self, cfg: DatasetConfig) -> Result<()> {
        let dataset = open_dataset(cfg)?;
        self.dispatcher.register(PoolEntry::new(dataset)?);
        Ok(())
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.dispatcher.dataset_names()
    }

    pub fn acquire(&mut self, md: Metadata) -> Result<DispatchResult> {
        self.dispatcher.dispatch(md)
    }

    pub fn acquire_batch(&mut self, records: Vec<Metadata>) -> Result<Vec<DispatchResult>> {
        self.dispatcher.dispatch_batch(records)
    }

    fn entry(&self, name: &str) -> Result<&PoolEntry> {
        self.dispatcher.get(name).ok_or_else(|| ArkError::DatasetNotFound(name.to_string()))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut PoolEntry> {
        self.dispatcher.get_mut(name).ok_or_else(|| ArkError::DatasetNotFound(name.to_string()))
    }

    pub fn query_metadata(&self, name: &str, matcher: &Matcher, sort: Option<SortInterval>) -> Result<Vec<QueryResult>> {
        self.entry(name)?.dataset.query_metadata(matcher, sort)
    }

    pub fn query_bytes(
        &self,
        name: &str,
        matcher: &Matcher,
        sort: Option<SortInterval>,
        sink: &mut dyn Write,
        postprocess: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<u64> {
        self.entry(name)?.dataset.query_bytes(matcher, sort, sink, postprocess)
    }

    pub fn query_summary(&self, name: &str, matcher: &Matcher) -> Result<Summary> {
        self.entry(name)?.dataset.query_summary(matcher)
    }

    /// Unions `query_summary` across every dataset the matcher could
    /// touch — the read-side counterpart of `dispatch`'s write-side
    /// fan-out, sequential.
    pub fn query_summary_all(&self, matcher: &Matcher) -> Result<Summary> {
        let mut total = Summary::new();
        for name in self.dataset_names().map(str::to_string).collect::<Vec<_>>() {
            let s = self.query_summary(&name, matcher)?;
            total.add_summary(&s);
        }
        Ok(total)
    }

    pub fn flush(&mut self, name: &str) -> Result<()> {
        self.entry_mut(name)?.dataset.flush()
    }

    fn checker(&mut self, name: &str) -> Result<&mut dyn CheckerBackend> {
        let entry = self.entry_mut(name)?;
        as_checker_mut(&mut *entry.dataset).ok_or_else(|| {
            ArkError::Consistency(format!("dataset '{name}' is not segmented; it has no checker state"))
        })
    }

    /// Scans a dataset's segments, re-parsing each one through the
    /// dataset's own wire framing to also catch `State::Corrupted`.
    pub fn checker_scan(&mut self, name: &str, now: Time) -> Result<BTreeMap<PathBuf, State>> {
        let checker = self.checker(name)?;
        Ok(crate::checker::scan(checker, now, Some(&LengthPrefixedScanner))?
            .into_iter()
            .map(|(k, v)| (k, v.state))
            .collect())
    }

    pub fn checker_repack(&mut self, name: &str, relpath: &Path) -> Result<()> {
        let checker = self.checker(name)?;
        crate::checker::repack(checker, relpath)
    }

    pub fn checker_archive(&mut self, name: &str, relpath: &Path) -> Result<()> {
        let checker = self.checker(name)?;
        crate::checker::archive(checker, relpath)
    }

    /// `check(fix=True)`'s repair for a segment `checker_scan` classified
    /// `Unaligned` (spec §8 scenario 6): truncates the index to the rows
    /// its bytes can still back. Returns how many rows were dropped.
    pub fn checker_fix_unaligned(&mut self, name: &str, relpath: &Path) -> Result<usize> {
        let checker = self.checker(name)?;
        crate::checker::fix_unaligned(checker, relpath)
    }

    /// `check(fix=True)`'s repair for the "issue 51" truncated-final-byte
    /// corruption. Returns whether a patch was applied.
    pub fn checker_fix_issue51(&mut self, name: &str, relpath: &Path) -> Result<bool> {
        let checker = self.checker(name)?;
        crate::checker::fix_issue51(checker, relpath, &LengthPrefixedScanner)
    }

    /// Combined scan-then-repair pass: always scans, and when `fix` is
    /// set also runs `fix_unaligned` on every `Unaligned` segment and
    /// `fix_issue51` on every `Corrupted` one, returning the
    /// post-repair classification.
    pub fn check(&mut self, name: &str, now: Time, fix: bool) -> Result<BTreeMap<PathBuf, State>> {
        let states = self.checker_scan(name, now)?;
        if !fix {
            return Ok(states);
        }
        let mut any_fixed = false;
        for (relpath, state) in &states {
            match state {
                State::Unaligned => {
                    self.checker_fix_unaligned(name, relpath)?;
                    any_fixed = true;
                }
                State::Corrupted => {
                    self.checker_fix_issue51(name, relpath)?;
                    any_fixed = true;
                }
                _ => {}
            }
        }
        if any_fixed {
            self.checker_scan(name, now)
        } else {
            Ok(states)
        }
    }

    /// Sweeps every segment past `delete age`: scans first, then
    /// removes each segment `scan` classified `DeleteAge`, returning the
    /// relpaths it removed.
    pub fn checker_remove_old(&mut self, name: &str, now: Time) -> Result<Vec<PathBuf>> {
        let due: Vec<PathBuf> = {
            let checker = self.checker(name)?;
            crate::checker::scan(checker, now, Some(&LengthPrefixedScanner))?
                .into_iter()
                .filter(|(_, state)| state.state == State::DeleteAge)
                .map(|(relpath, _)| relpath)
                .collect()
        };
        let checker = self.checker(name)?;
        for relpath in &due {
            crate::checker::remove_old(checker, relpath)?;
        }
        Ok(due)
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

fn as_checker_mut(dataset: &mut dyn Dataset) -> Option<&mut dyn CheckerBackend> {
    if let Some(ds) = dataset.as_any_mut().downcast_mut::<GlobalDataset>() {
        return Some(ds);
    }
    if let Some(ds) = dataset.as_any_mut().downcast_mut::<IsegDataset>() {
        return Some(ds);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Source;
    use crate::types::{Reftime, Value};

    fn sections(daily_dir: &Path) -> String {
        format!(
            "[daily]\ntype = iseg\nformat = grib\nstep = daily\nunique = reftime\npath = {}\n\n[error]\ntype = discard\n\n[duplicates]\ntype = discard\n",
            daily_dir.display()
        )
    }

    fn inline_md(day: u8) -> Metadata {
        let mut md = Metadata::with_source(Source::Inline(b"hello".to_vec()));
        md.set(Value::Reftime(Reftime::Position(Time::new(2024, 1, day, 0, 0, 0))));
        md
    }

    #[test]
    fn open_from_sections_registers_every_section() {
        let root = tempfile::tempdir().unwrap();
        let daily_dir = root.path().join("daily");
        let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir)).unwrap();
        let mut names: Vec<&str> = pool.dataset_names().collect();
        names.sort();
        assert_eq!(names, vec!["daily", "duplicates", "error"]);

        let outcome = pool.acquire(inline_md(15)).unwrap();
        assert_eq!(outcome.outcome, crate::dispatch::RouteOutcome::Accepted("daily".into()));
    }

    #[test]
    fn checker_scan_sees_an_acquired_segment_as_ok() {
        let root = tempfile::tempdir().unwrap();
        let daily_dir = root.path().join("daily");
        let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir)).unwrap();
        pool.acquire(inline_md(15)).unwrap();
        let states = pool.checker_scan("daily", Time::new(2024, 1, 16, 0, 0, 0)).unwrap();
        assert_eq!(states[&PathBuf::from("2024/01-15")], State::Ok);
    }

    #[test]
    fn checker_on_a_glue_dataset_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let daily_dir = root.path().join("daily");
        let mut pool = Pool::open_from_sections(root.path(), &sections(&daily_dir)).unwrap();
        assert!(pool.checker_scan("error", Time::new(2024, 1, 16, 0, 0, 0)).is_err());
    }

    #[test]
    fn unknown_dataset_name_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let daily_dir = root.path().join("daily");
        let pool = Pool::open_from_sections(root.path(), &sections(&daily_dir)).unwrap();
        assert!(pool.query_summary("nope", &Matcher::empty()).is_err());
    }
}
