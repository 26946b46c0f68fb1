//! Picks which of the two physical segment layouts backs a
//! given dataset's segments. Real arkimet keys this off a dataset's own
//! `segment` config key independent of `type`; this build ties it to
//! `format` instead (concatenable formats get the flat file layout,
//! `odimh5` — which cannot be safely concatenated — gets one file per
//! message) since SPEC_FULL.md's config surface doesn't carry a separate
//! `segment` key. See DESIGN.md.

use std::path::{Path, PathBuf};

use crate::config::DatasetConfig;
use crate::segment::dir_segment::{DirSegment, DirSegmentChecker, DirSegmentWriter};
use crate::segment::file_segment::{FileSegment, FileSegmentChecker, FileSegmentWriter};
use crate::segment::{SegmentChecker, SegmentReader, SegmentWriter};
use crate::error::Result;

fn uses_directory_layout(cfg: &DatasetConfig) -> bool {
    cfg.format.eq_ignore_ascii_case("odimh5")
}

/// Whether `cfg`'s segments are one-file-per-message (true) or a flat
/// concatenation (false). A directory member is already self-delimited by
/// the filesystem, so callers that frame messages with
/// [`super::scanner::LengthPrefixedScanner`] before appending to a flat
/// segment must skip that framing here — the frame's length prefix would
/// otherwise end up stored as part of the message body.
pub fn is_directory_layout(cfg: &DatasetConfig) -> bool {
    uses_directory_layout(cfg)
}

pub fn data_path(cfg: &DatasetConfig, relpath: &Path) -> PathBuf {
    if uses_directory_layout(cfg) {
        DirSegment::new(&cfg.path, relpath, &cfg.format).dir_path()
    } else {
        FileSegment::new(&cfg.path, relpath, &cfg.format).data_path()
    }
}

pub fn exists(cfg: &DatasetConfig, relpath: &Path) -> bool {
    data_path(cfg, relpath).exists()
}

pub fn open_reader(cfg: &DatasetConfig, relpath: &Path) -> Box<dyn SegmentReader> {
    if uses_directory_layout(cfg) {
        Box::new(DirSegment::new(&cfg.path, relpath, &cfg.format))
    } else {
        Box::new(FileSegment::new(&cfg.path, relpath, &cfg.format))
    }
}

pub fn open_writer(cfg: &DatasetConfig, relpath: &Path) -> Result<Box<dyn SegmentWriter>> {
    if uses_directory_layout(cfg) {
        Ok(Box::new(DirSegmentWriter::open(DirSegment::new(&cfg.path, relpath, &cfg.format))?))
    } else {
        Ok(Box::new(FileSegmentWriter::open(FileSegment::new(&cfg.path, relpath, &cfg.format))?))
    }
}

pub fn open_checker(cfg: &DatasetConfig, relpath: &Path) -> Box<dyn SegmentChecker> {
    if uses_directory_layout(cfg) {
        Box::new(DirSegmentChecker::new(DirSegment::new(&cfg.path, relpath, &cfg.format)))
    } else {
        Box::new(FileSegmentChecker::new(FileSegment::new(&cfg.path, relpath, &cfg.format)))
    }
}

/// Every segment relpath that currently has bytes on disk, discovered by
/// walking the dataset directory for files/directories matching the
/// configured format's extension (`on_disk_segments`).
pub fn scan_on_disk(cfg: &DatasetConfig) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !cfg.path.exists() {
        return Ok(out);
    }
    let directory = uses_directory_layout(cfg);
    let suffix = if directory {
        format!("{}.d", cfg.format)
    } else {
        cfg.format.clone()
    };
    walk(&cfg.path, &cfg.path, &suffix, directory, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, dir: &Path, suffix: &str, directory_layout: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_dir = entry.file_type()?.is_dir();
        if is_dir && directory_layout && path.to_string_lossy().ends_with(suffix) {
            let relpath = path.strip_prefix(root).unwrap().with_extension("").with_extension("");
            out.push(relpath);
        } else if is_dir {
            walk(root, &path, suffix, directory_layout, out)?;
        } else if !directory_layout {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(&format!(".{suffix}")) && !name.contains(".metadata") && !name.contains(".summary") {
                    let relpath = path.strip_prefix(root).unwrap().with_extension("");
                    out.push(relpath);
                }
            }
        }
    }
    Ok(())
}
