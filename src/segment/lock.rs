//! Filesystem advisory locks guarding segment access across processes
//! (two-tier locking — OS advisory locks between processes, in-process
//! `RwLock` discipline on top).
//!
//! Grounded on the lock-file pattern used by the pack's other storage-engine
//! examples (`prataprc-rdms`, `ra0x3-systemg`), which reach for `fs2`'s
//! `FileExt` for the same role; `fs4` is its maintained successor.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::error::{ArkError, Result};

/// One dataset's `.lock` / `.append-lock` / `.check-lock` sentinel files.
///
/// - `append`: held exclusively by the one writer appending to a segment;
///   shared by readers who only need the segment not to grow mid-read.
/// - `check`: held exclusively by the checker; excludes writers and other
///   checkers for the duration of a repack/archive/delete pass.
pub struct SegmentLock {
    file: File,
    path: PathBuf,
}

impl SegmentLock {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(ArkError::Io)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn append_lock(dataset_dir: &Path) -> Result<Self> {
        Self::open(&dataset_dir.join(".append-lock"))
    }

    pub fn check_lock(dataset_dir: &Path) -> Result<Self> {
        Self::open(&dataset_dir.join(".check-lock"))
    }

    pub fn lock_exclusive(&self) -> Result<()> {
        self.file
            .lock_exclusive()
            .map_err(|e| ArkError::Locked(format!("{}: {e}", self.path.display())))
    }

    pub fn lock_shared(&self) -> Result<()> {
        self.file
            .lock_shared()
            .map_err(|e| ArkError::Locked(format!("{}: {e}", self.path.display())))
    }

    pub fn try_lock_exclusive(&self) -> Result<bool> {
        match self.file.try_lock_exclusive() {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(ArkError::Io(e)),
        }
    }

    pub fn unlock(&self) -> Result<()> {
        self.file.unlock().map_err(ArkError::Io)
    }
}

impl Drop for SegmentLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
