//! The dataset engine variants: one `Dataset` trait-object
//! contract implemented seven ways, matching the `type` config key.
//!
//! Grounded on a `Send + Sync` fat-trait pattern: one trait behind
//! which several storage engines are interchangeable, plus
//! `as_any`/`as_any_mut` for callers that need to downcast to an
//! engine-specific operation.

pub mod global_dataset;
pub mod iseg_dataset;
pub mod layout;
pub mod scanner;

pub mod discard;
pub mod empty;
#[cfg(feature = "http")]
pub mod http;
pub mod outbound;

use std::any::Any;
use std::io::Write;

use crate::config::DatasetConfig;
use crate::error::Result;
use crate::index::InsertOutcome;
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Summary};
use crate::query::{QueryResult, SortInterval};

/// One open dataset: accepts records, answers metadata/byte/summary
/// queries, and exposes itself to the checker and dispatcher through the
/// narrower [`crate::checker::CheckerBackend`] / [`crate::dispatch::DatasetAcceptor`]
/// traits those modules define.
pub trait Dataset: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &DatasetConfig;

    /// Store one record, honoring the dataset's own replace policy. The
    /// glue variants (`outbound`, `discard`, `empty`) still implement this
    /// — they just don't keep the bytes ("Format variants").
    fn acquire(&mut self, md: Metadata) -> Result<InsertOutcome>;

    fn query_metadata(&self, matcher: &Matcher, sort: Option<SortInterval>) -> Result<Vec<QueryResult>>;

    fn query_bytes(
        &self,
        matcher: &Matcher,
        sort: Option<SortInterval>,
        sink: &mut dyn Write,
        postprocess: &dyn Fn(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<u64>;

    fn query_summary(&self, matcher: &Matcher) -> Result<Summary>;

    /// Flush any buffered index state to disk ("acquire durability
    /// is per-dataset: the index is saved after every successful insert
    /// unless the dataset opts into batched flush via `eatmydata`").
    fn flush(&mut self) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Reads the Update Sequence Number convention (`higher_usn`, Open
/// Question resolution): a `usn=<integer>` note, written by the
/// acquisition pipeline before dispatch for formats that carry one (BUFR
/// WIGOS, VM2). No dedicated `Code` dimension exists for it, so it rides
/// along as a note rather than a first-class value. See DESIGN.md.
pub fn extract_usn(md: &Metadata) -> Option<i64> {
    md.notes.iter().find_map(|n| n.content.strip_prefix("usn=")?.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Source;

    #[test]
    fn extract_usn_reads_prefixed_note() {
        let mut md = Metadata::with_source(Source::Inline(vec![0; 1]));
        md.add_note("usn=42");
        assert_eq!(extract_usn(&md), Some(42));
    }

    #[test]
    fn extract_usn_is_none_without_the_note() {
        let md = Metadata::with_source(Source::Inline(vec![0; 1]));
        assert_eq!(extract_usn(&md), None);
    }
}
