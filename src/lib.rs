//! arki-core: dataset engine for an archive manager for meteorological
//! data — segment storage, indices, the query evaluator, and the
//! checker, behind a `Dataset` trait implemented seven ways (`simple`,
//! `iseg`, `ondisk2`, `outbound`, `discard`, `empty`, `remote`).
//!
//! CLI front-ends, the format scanners (GRIB/BUFR/ODIMH5/VM2), the
//! postprocessor, and the matcher grammar's full alias/sub-grammar layer
//! are external collaborators reached through the trait seams this crate
//! defines (`segment::FormatScanner`, `dataset::Dataset`); none of them
//! ship here.
//!
//! Typical use: build a [`pool::Pool`] from a companion sections file,
//! `acquire` records into it (routed by each dataset's configured
//! `filter`), and `query_metadata`/`query_bytes`/`query_summary` against
//! a named dataset. A standalone dataset can also be opened directly —
//! see `dataset::global_dataset::GlobalDataset` and
//! `dataset::iseg_dataset::IsegDataset`.

pub mod checker;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod matcher;
pub mod metadata;
pub mod pool;
pub mod query;
pub mod segment;
pub mod session;
pub mod summary_cache;
pub mod types;

pub use config::{DatasetConfig, DatasetConfigBuilder, DatasetType};
pub use dataset::Dataset;
pub use dispatch::{DatasetAcceptor, Dispatcher};
pub use error::{ArkError, Result};
pub use matcher::Matcher;
pub use metadata::{Metadata, Summary};
pub use pool::Pool;
pub use session::Session;
