//! The segment substrate: three physical layouts behind one reader/writer/
//! checker contract.

pub mod archived_segment;
pub mod dir_segment;
pub mod file_segment;
pub mod lock;
pub mod state;

pub use state::{SegmentState, State};

use std::io::Write;

use crate::error::Result;
use crate::metadata::Metadata;

/// Splits a segment's raw bytes into individual message byte ranges.
/// Message-format parsing (GRIB/BUFR/ODIMH5/VM2 framing) is an external
/// collaborator (Non-goals); the segment substrate only needs to know
/// where one message ends and the next begins.
pub trait FormatScanner {
    fn split(&self, format: &str, bytes: &[u8]) -> Result<Vec<(u64, u64)>>;
}

/// Shared read contract across all three physical layouts.
pub trait SegmentReader {
    /// Stream stored metadata, one record per call, stopping early if `cb`
    /// returns `false` (cancellation semantics mirrored here too).
    fn scan(&self, cb: &mut dyn FnMut(Metadata) -> bool) -> Result<()>;

    fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>>;

    /// Copy `size` bytes at `offset` into `dst`, zero-copying via
    /// `sendfile`/splice where the layout allows it. Returns bytes written.
    fn read_into(&self, offset: u64, size: u64, dst: &mut dyn Write) -> Result<u64>;
}

/// Shared append contract. One writer owns a segment at a time; the
/// advisory append lock enforces this across processes.
pub trait SegmentWriter {
    /// Append one message, returning `(offset, size)` as it should be
    /// recorded in the index — offset is a byte offset for file segments,
    /// a sequence number for directory segments.
    fn append(&mut self, bytes: &[u8]) -> Result<(u64, u64)>;

    fn commit(&mut self) -> Result<()>;

    /// Truncate back to the checkpoint taken at open time, discarding any
    /// appends made since.
    fn rollback(&mut self) -> Result<()>;
}

/// Shared maintenance contract exercised by the checker.
pub trait SegmentChecker {
    /// Re-scan raw bytes through `scanner` to rebuild metadata from
    /// scratch, ignoring whatever the index currently believes.
    fn scan_data(&self, scanner: &dyn FormatScanner, format: &str) -> Result<Vec<Metadata>>;

    /// Rewrite the segment keeping only the given `(offset, size)` ranges,
    /// in the given order, atomically replacing the old file. Returns the
    /// new segment size in bytes.
    fn repack(&mut self, keep: &[(u64, u64)]) -> Result<u64>;

    /// Convert to a `.tar` archived layout, returning its path.
    fn tar(&mut self) -> Result<std::path::PathBuf>;

    /// Convert to a `.zip` archived layout, returning its path.
    fn zip(&mut self) -> Result<std::path::PathBuf>;

    /// Convert to a `.gz`-grouped archived layout with `group_size`
    /// messages per compressed member, returning its path.
    fn compress(&mut self, group_size: usize) -> Result<std::path::PathBuf>;

    /// Remove the segment. If `with_data` is false, only sidecars
    /// (`.metadata`/`.summary`) are removed. Returns bytes freed.
    fn remove(&mut self, with_data: bool) -> Result<u64>;

    /// Whether every `(offset, size)` row the index believes lives in this
    /// segment is actually backed by bytes on disk. `false` means a
    /// `State::Unaligned` classification: the index references data a
    /// repack can't recover on its own (e.g. a truncated file), and
    /// needs truncating to the surviving rows instead.
    fn is_aligned(&self, rows: &[(u64, u64)]) -> Result<bool>;

    /// The segment's current raw bytes, in the shape `scan_data` reads —
    /// used by the "issue 51" truncated-final-byte repair to patch and
    /// rewrite a segment in one piece. Directory-layout segments have no
    /// single byte stream and refuse with `Consistency`.
    fn raw_bytes(&self) -> Result<Vec<u8>>;

    /// Atomically replaces the segment's raw bytes with `bytes` (write to
    /// a temp path, fsync, rename). Directory-layout segments refuse with
    /// `Consistency` for the same reason as [`Self::raw_bytes`].
    fn overwrite_raw(&mut self, bytes: &[u8]) -> Result<()>;
}
