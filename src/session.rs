//! Session: per-work-unit cached state: "A Session owns: the
//! matcher alias database; a dataset-level LRU of opened readers; a
//! segment-reader LRU keyed by absolute path ... Sessions are not shared
//! across threads implicitly."
//!
//! Generalizes a single-connection client session (one connection's
//! single current-database handle) from "holds one `Arc<Database>`" to
//! "holds bounded caches of several". Not `Send`/`Sync`: callers open
//! one `Session` per thread against the same on-disk dataset tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::dataset::{layout, Dataset};
use crate::error::Result;
use crate::segment::SegmentReader;

const DEFAULT_DATASET_CAPACITY: usize = 8;
const DEFAULT_SEGMENT_READER_CAPACITY: usize = 64;

/// Short names standing in for a longer matcher expression (the full
/// alias grammar is an external collaborator; this just holds the table
/// and does the textual substitution the convenience parser in
/// `matcher.rs` expects to already have happened).
#[derive(Debug, Default, Clone)]
pub struct AliasDatabase {
    aliases: BTreeMap<String, String>,
}

impl AliasDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, expr: impl Into<String>) {
        self.aliases.insert(name.into(), expr.into());
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Expands every `@name` clause in a comma-separated matcher
    /// expression, leaving clauses without an `@` prefix untouched.
    pub fn expand(&self, expr: &str) -> String {
        expr.split(',')
            .map(|clause| {
                let clause = clause.trim();
                match clause.strip_prefix('@') {
                    Some(name) => self.resolve(name).map(str::to_string).unwrap_or_else(|| clause.to_string()),
                    None => clause.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Bounded least-recently-used map. Small and hand-rolled rather than a
/// dependency, same call as the ini config parser in `config.rs` — the
/// capacities here (single digits to low hundreds of entries) don't
/// justify pulling in a crate for O(1) eviction over this O(n) scan.
struct LruMap<V> {
    capacity: usize,
    order: Vec<PathBuf>,
    entries: BTreeMap<PathBuf, V>,
}

impl<V> LruMap<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: Vec::new(),
            entries: BTreeMap::new(),
        }
    }

    fn touch(&mut self, key: &Path) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    /// Inserts `value`, returning the evicted entry (if the map was at
    /// capacity and `key` is new) so the caller can give it a chance to
    /// flush before it's dropped.
    fn insert(&mut self, key: PathBuf, value: V) -> Option<V> {
        let mut evicted = None;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = (!self.order.is_empty()).then(|| self.order.remove(0)) {
                evicted = self.entries.remove(&oldest);
            }
        }
        self.touch(&key);
        if !self.order.iter().any(|k| k == &key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, value);
        evicted
    }

    fn get_mut(&mut self, key: &Path) -> Option<&mut V> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get_mut(key)
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A work unit's shared caches: aliases, opened dataset handles, and
/// segment readers. Dataset entries are opened via a caller-supplied
/// opener closure and evicted by strict LRU once `dataset_capacity` is
/// exceeded — an evicted dataset is flushed before being dropped so no
/// buffered index state is lost (acquire durability).
pub struct Session {
    pub aliases: AliasDatabase,
    datasets: LruMap<Box<dyn Dataset>>,
    segment_readers: BTreeMap<PathBuf, Weak<dyn SegmentReader>>,
    segment_reader_capacity: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_capacities(DEFAULT_DATASET_CAPACITY, DEFAULT_SEGMENT_READER_CAPACITY)
    }

    pub fn with_capacities(dataset_capacity: usize, segment_reader_capacity: usize) -> Self {
        Self {
            aliases: AliasDatabase::new(),
            datasets: LruMap::new(dataset_capacity),
            segment_readers: BTreeMap::new(),
            segment_reader_capacity: segment_reader_capacity.max(1),
        }
    }

    /// Returns the cached handle for `path`, opening it via `open` on a
    /// miss. `path` is the dataset's own config path, used as the cache
    /// key since dataset names are only unique within one pool's config.
    pub fn dataset(&mut self, path: &Path, open: impl FnOnce() -> Result<Box<dyn Dataset>>) -> Result<&mut Box<dyn Dataset>> {
        if self.datasets.get_mut(path).is_none() {
            let ds = open()?;
            if let Some(mut evicted) = self.datasets.insert(path.to_path_buf(), ds) {
                evicted.flush()?;
            }
        }
        Ok(self.datasets.get_mut(path).expect("just inserted"))
    }

    pub fn open_dataset_count(&self) -> usize {
        self.datasets.len()
    }

    /// Returns a strong reference to the segment reader for `relpath`
    /// under `basedir`, reusing a live cached one if any query still
    /// holds it, evicting only the weak map slot (not the reader itself)
    /// once `segment_reader_capacity` is exceeded (weak-reference
    /// requirement: "a reader being evicted ... remains valid until the
    /// last user releases it").
    pub fn segment_reader(&mut self, cfg: &crate::config::DatasetConfig, relpath: &Path) -> Arc<dyn SegmentReader> {
        let key = cfg.path.join(relpath);
        if let Some(weak) = self.segment_readers.get(&key) {
            if let Some(strong) = weak.upgrade() {
                return strong;
            }
        }
        let reader: Arc<dyn SegmentReader> = Arc::from(layout::open_reader(cfg, relpath));
        self.prune_segment_readers();
        self.segment_readers.insert(key, Arc::downgrade(&reader));
        reader
    }

    fn prune_segment_readers(&mut self) {
        self.segment_readers.retain(|_, weak| weak.strong_count() > 0);
        while self.segment_readers.len() >= self.segment_reader_capacity {
            let Some(key) = self.segment_readers.keys().next().cloned() else {
                break;
            };
            self.segment_readers.remove(&key);
        }
    }

    pub fn cached_segment_reader_count(&self) -> usize {
        self.segment_readers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_expand_substitutes_defined_names() {
        let mut aliases = AliasDatabase::new();
        aliases.define("italy", "area:bbox POLYGON((6 36,19 36,19 47,6 47,6 36))");
        let expanded = aliases.expand("@italy,product:t2m");
        assert_eq!(expanded, "area:bbox POLYGON((6 36,19 36,19 47,6 47,6 36)),product:t2m");
    }

    #[test]
    fn alias_expand_leaves_unknown_names_untouched() {
        let aliases = AliasDatabase::new();
        assert_eq!(aliases.expand("@missing"), "@missing");
    }

    #[test]
    fn dataset_cache_evicts_least_recently_used() {
        let mut lru: LruMap<u32> = LruMap::new(2);
        lru.insert(PathBuf::from("a"), 1);
        lru.insert(PathBuf::from("b"), 2);
        lru.get_mut(Path::new("a")); // touch a, making b the LRU entry
        lru.insert(PathBuf::from("c"), 3);
        assert!(lru.get_mut(Path::new("b")).is_none());
        assert!(lru.get_mut(Path::new("a")).is_some());
        assert!(lru.get_mut(Path::new("c")).is_some());
    }

    #[test]
    fn segment_reader_is_reused_while_a_strong_ref_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = crate::config::DatasetConfigBuilder::new("ds", dir.path(), crate::config::DatasetType::Iseg)
            .format("grib")
            .build();
        let mut session = Session::new();
        let relpath = Path::new("2024/01-15");
        let first = session.segment_reader(&cfg, relpath);
        let second = session.segment_reader(&cfg, relpath);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn segment_reader_is_reopened_once_all_strong_refs_drop() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = crate::config::DatasetConfigBuilder::new("ds", dir.path(), crate::config::DatasetType::Iseg)
            .format("grib")
            .build();
        let mut session = Session::new();
        let relpath = Path::new("2024/01-15");
        {
            let _first = session.segment_reader(&cfg, relpath);
        }
        let second = session.segment_reader(&cfg, relpath);
        assert_eq!(Arc::strong_count(&second), 1);
    }
}
