//! The query evaluator: "given a matcher (and optionally a sort
//! interval), enumerate `(relpath, offset, size, metadata)` tuples across
//! the segments a dataset owns, ordered segment-name ascending then
//! segment-order, unless a sort interval says otherwise."
//!
//! Grounded on a fan-out-over-shards loop and a binary-search index
//! lookup; generalized from "shard ids keyed by hash" to "segment
//! relpaths keyed by `Step`".
//! Dataset-type-specific index access (one dataset-global index vs one
//! index per segment) is abstracted behind [`QueryBackend`] so this module
//! doesn't need to know which engine variant it's running under.

pub mod sort;

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Step;
use crate::error::Result;
use crate::index::Row;
use crate::matcher::Matcher;
use crate::segment::SegmentReader;
use crate::types::Interval;

pub use sort::SortInterval;

/// One matched record, located within its owning segment.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub relpath: PathBuf,
    pub row: Row,
}

/// What the evaluator needs from a dataset, without caring whether that
/// dataset keeps one index for the whole tree (`ondisk2`/`simple`) or one
/// per segment (`iseg`).
pub trait QueryBackend {
    fn step(&self) -> Step;

    /// The dataset's known reftime extent, if anything has ever been
    /// written — `None` for a brand new dataset, in which case the
    /// evaluator has nothing to prune against and must fall back to
    /// whatever bound the matcher itself carries.
    fn known_interval(&self) -> Option<Interval>;

    /// Rows matching `matcher` that live under segment `relpath`. Returns
    /// an empty vec for a candidate relpath with no segment on disk —
    /// candidates are a superset, not a guarantee (step 2).
    fn segment_rows(&self, relpath: &Path, matcher: &Matcher) -> Result<Vec<Row>>;

    /// Open a reader for the segment at `relpath`, used by [`query_bytes`]
    /// to stream message bytes once rows have been selected.
    fn open_segment_reader(&self, relpath: &Path) -> Result<Box<dyn SegmentReader>>;
}

/// Intersects the matcher's reftime restriction (if any) with the
/// dataset's known extent (if any). `None` means unrestricted — every
/// segment the dataset owns is a candidate.
fn effective_span(backend: &dyn QueryBackend, matcher: &Matcher) -> Option<Interval> {
    match (matcher.reftime_interval(), backend.known_interval()) {
        (Some(a), Some(b)) => a.intersect(&b),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// algorithm: prune candidate segments by step, fan out the lookup
/// over each, and optionally reorder by sort-interval bucket. Metadata
/// queries and byte-stream queries both start here; [`query_bytes`] adds
/// the actual data transfer on top.
pub fn evaluate(backend: &dyn QueryBackend, matcher: &Matcher, sort: Option<SortInterval>) -> Result<Vec<QueryResult>> {
    let candidates = match effective_span(backend, matcher) {
        Some(span) => backend.step().candidates(span),
        // No bound on either side: the only sound candidate set is "every
        // segment this dataset has", which the backend enumerates itself
        // via a full index scan keyed by relpath; represented here by an
        // empty candidate list plus a direct full lookup below.
        None => Vec::new(),
    };

    let mut results = Vec::new();
    if candidates.is_empty() && matcher.reftime_interval().is_none() && backend.known_interval().is_none() {
        // Unbounded query against an empty/unknown-extent dataset: nothing
        // to prune against, nothing to return.
        return Ok(results);
    }
    for relpath in candidates {
        for row in backend.segment_rows(&relpath, matcher)? {
            results.push(QueryResult { relpath: relpath.clone(), row });
        }
    }

    match sort {
        Some(interval) => sort::sort_results(&mut results, interval),
        // No sort interval: the default order is segment-name ascending,
        // then segment-order (the row's position within its segment) — not
        // a global reftime sort, which would silently reorder records
        // acquired out of temporal order within the same segment.
        None => results.sort_by(|a, b| a.relpath.cmp(&b.relpath).then_with(|| a.row.row_id.cmp(&b.row.row_id))),
    }
    Ok(results)
}

/// Streams the raw bytes of every matched record, in evaluator order, into
/// `sink` (`query_bytes`). `postprocess` runs each chunk through a
/// caller-supplied transform before writing — the external postprocessor
/// collaborator's job; passing `|b| Ok(b.to_vec())`
/// disables it.
pub fn query_bytes(
    backend: &dyn QueryBackend,
    matcher: &Matcher,
    sort: Option<SortInterval>,
    sink: &mut dyn Write,
    postprocess: impl Fn(&[u8]) -> Result<Vec<u8>>,
) -> Result<u64> {
    let mut written = 0u64;
    let mut open_relpath: Option<PathBuf> = None;
    let mut reader: Option<Box<dyn SegmentReader>> = None;

    for result in evaluate(backend, matcher, sort)? {
        if open_relpath.as_deref() != Some(result.relpath.as_path()) {
            reader = Some(backend.open_segment_reader(&result.relpath)?);
            open_relpath = Some(result.relpath.clone());
        }
        let source = &result.row.metadata.source;
        let (offset, size) = source
            .location()
            .ok_or_else(|| crate::error::ArkError::Query("matched record has no stored location".into()))?;
        let bytes = reader.as_ref().unwrap().read(offset, size)?;
        let out = postprocess(&bytes)?;
        sink.write_all(&out)?;
        written += out.len() as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Metadata, Source};
    use crate::types::{Code, Reftime, Time, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct FakeBackend {
        step: Step,
        interval: Option<Interval>,
        segments: BTreeMap<PathBuf, Vec<Metadata>>,
        opens: Mutex<Vec<PathBuf>>,
    }

    impl QueryBackend for FakeBackend {
        fn step(&self) -> Step {
            self.step
        }

        fn known_interval(&self) -> Option<Interval> {
            self.interval
        }

        fn segment_rows(&self, relpath: &Path, matcher: &Matcher) -> Result<Vec<Row>> {
            Ok(self
                .segments
                .get(relpath)
                .map(|mds| {
                    mds.iter()
                        .enumerate()
                        .filter(|(_, md)| matcher.accepts(md))
                        .map(|(row_id, md)| Row { row_id, metadata: md.clone() })
                        .collect()
                })
                .unwrap_or_default())
        }

        fn open_segment_reader(&self, relpath: &Path) -> Result<Box<dyn SegmentReader>> {
            self.opens.lock().unwrap().push(relpath.to_path_buf());
            struct NullReader;
            impl SegmentReader for NullReader {
                fn scan(&self, _cb: &mut dyn FnMut(Metadata) -> bool) -> Result<()> {
                    Ok(())
                }
                fn read(&self, _offset: u64, _size: u64) -> Result<Vec<u8>> {
                    Ok(vec![0xAB; 3])
                }
                fn read_into(&self, _offset: u64, _size: u64, _dst: &mut dyn Write) -> Result<u64> {
                    Ok(0)
                }
            }
            Ok(Box::new(NullReader))
        }
    }

    fn md_at(day: u8) -> Metadata {
        let mut md = Metadata::with_source(Source::Blob {
            format: "grib".into(),
            basedir: "/data".into(),
            relpath: format!("2024/01-{day:02}"),
            offset: 0,
            size: 3,
        });
        md.set(Value::Reftime(Reftime::Position(Time::new(2024, 1, day, 0, 0, 0))));
        md
    }

    fn backend_with_two_days() -> FakeBackend {
        let mut segments = BTreeMap::new();
        segments.insert(PathBuf::from("2024/01-15"), vec![md_at(15)]);
        segments.insert(PathBuf::from("2024/01-16"), vec![md_at(16)]);
        FakeBackend {
            step: Step::Daily,
            interval: Some(Interval::new(Time::new(2024, 1, 15, 0, 0, 0), Time::new(2024, 1, 17, 0, 0, 0))),
            segments,
            opens: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn evaluate_prunes_to_matching_segment_only() {
        let backend = backend_with_two_days();
        let matcher = Matcher::parse("reftime:=2024-01-15").unwrap();
        let results = evaluate(&backend, &matcher, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].relpath, PathBuf::from("2024/01-15"));
    }

    #[test]
    fn evaluate_defaults_to_segment_name_order() {
        let backend = backend_with_two_days();
        let results = evaluate(&backend, &Matcher::empty(), None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].relpath, PathBuf::from("2024/01-15"));
        assert_eq!(results[1].relpath, PathBuf::from("2024/01-16"));
    }

    #[test]
    fn evaluate_default_order_follows_segment_order_not_reftime_within_a_segment() {
        // Two rows land in the same segment with reftimes recorded out of
        // order (row 0 is later than row 1) — the default ordering must
        // follow segment-order (row_id), not a global reftime sort, so row
        // 0 is still reported before row 1.
        let mut segments = BTreeMap::new();
        segments.insert(PathBuf::from("2024/01-15"), vec![md_at(16), md_at(15)]);
        let backend = FakeBackend {
            step: Step::Daily,
            interval: Some(Interval::new(Time::new(2024, 1, 15, 0, 0, 0), Time::new(2024, 1, 16, 0, 0, 0))),
            segments,
            opens: Mutex::new(Vec::new()),
        };

        let results = evaluate(&backend, &Matcher::empty(), None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].row.row_id, 0);
        assert_eq!(results[1].row.row_id, 1);
        assert_eq!(
            results[0].row.metadata.get(Code::Reftime),
            Some(&Value::Reftime(Reftime::Position(Time::new(2024, 1, 16, 0, 0, 0))))
        );
    }

    #[test]
    fn query_bytes_reopens_reader_per_segment() {
        let backend = backend_with_two_days();
        let mut out = Vec::new();
        let written = query_bytes(&backend, &Matcher::empty(), None, &mut out, |b| Ok(b.to_vec())).unwrap();
        assert_eq!(written, 6);
        assert_eq!(backend.opens.lock().unwrap().len(), 2);
    }
}
