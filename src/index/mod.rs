//! The index layer: "given a matcher, enumerate `(segment-relpath,
//! offset, size, metadata)` tuples whose metadata matches." Two physical
//! shapes share the row-storage and lookup machinery in [`store`]:
//! [`global::GlobalIndex`] (dataset-wide, `ondisk2`/`simple`) and
//! [`segment_index::SegmentIndex`] (per-segment, `iseg`).

pub mod global;
pub mod segment_index;
pub mod store;

pub use global::GlobalIndex;
pub use segment_index::SegmentIndex;
pub use store::{InsertOutcome, Row};
