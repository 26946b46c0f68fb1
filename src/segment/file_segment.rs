//! File segment: `relpath.format` is a flat concatenation of raw messages
//!.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::{ArkError, Result};
use crate::metadata::{stream, Metadata};
use crate::segment::{FormatScanner, SegmentChecker, SegmentReader, SegmentWriter};

#[derive(Debug, Clone)]
pub struct FileSegment {
    pub basedir: PathBuf,
    pub relpath: PathBuf,
    pub format: String,
}

impl FileSegment {
    pub fn new(basedir: impl Into<PathBuf>, relpath: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            basedir: basedir.into(),
            relpath: relpath.into(),
            format: format.into(),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.basedir.join(&self.relpath).with_extension(&self.format)
    }

    pub fn metadata_sidecar_path(&self) -> PathBuf {
        let mut p = self.data_path();
        p.set_extension(format!("{}.metadata", self.format));
        p
    }

    pub fn summary_sidecar_path(&self) -> PathBuf {
        let mut p = self.data_path();
        p.set_extension(format!("{}.summary", self.format));
        p
    }

    fn size_on_disk(&self) -> Result<u64> {
        Ok(fs::metadata(self.data_path())?.len())
    }

    /// Zero-copy path for file-descriptor destinations, e.g. a socket or
    /// another file, using `posix_fadvise`-hinted `libc` calls for
    /// platform-specific I/O shortcuts.
    pub fn read_into_fd(&self, offset: u64, size: u64, dst_fd: std::os::unix::io::RawFd) -> Result<u64> {
        let src = File::open(self.data_path())?;
        let src_fd = src.as_raw_fd();
        let mut sent: u64 = 0;
        let mut file_offset = offset as libc::off_t;
        while sent < size {
            let remaining = (size - sent) as usize;
            let n = unsafe { libc::sendfile(dst_fd, src_fd, &mut file_offset, remaining) };
            if n < 0 {
                return Err(ArkError::Io(std::io::Error::last_os_error()));
            }
            if n == 0 {
                break;
            }
            sent += n as u64;
        }
        Ok(sent)
    }
}

impl SegmentReader for FileSegment {
    fn scan(&self, cb: &mut dyn FnMut(Metadata) -> bool) -> Result<()> {
        let path = self.metadata_sidecar_path();
        if !path.exists() {
            return Ok(());
        }
        let mut file = File::open(path)?;
        while let Some(record) = stream::read_next(&mut file)? {
            let keep_going = match record {
                stream::StreamRecord::Metadata(md) => cb(md),
                stream::StreamRecord::Inline(md, _) => cb(md),
                stream::StreamRecord::Group(group) => {
                    let mut keep_going = true;
                    for md in group {
                        if !cb(md) {
                            keep_going = false;
                            break;
                        }
                    }
                    keep_going
                }
                stream::StreamRecord::Summary(_) => true,
            };
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mut file = File::open(self.data_path())?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_into(&self, offset: u64, size: u64, dst: &mut dyn Write) -> Result<u64> {
        let bytes = self.read(offset, size)?;
        dst.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// Append-only writer. Holds a checkpoint taken at open time so `rollback`
/// can truncate back to it without re-reading the index.
pub struct FileSegmentWriter {
    segment: FileSegment,
    file: File,
    checkpoint: u64,
}

impl FileSegmentWriter {
    pub fn open(segment: FileSegment) -> Result<Self> {
        if let Some(parent) = segment.data_path().parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(segment.data_path())?;
        let checkpoint = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            segment,
            file,
            checkpoint,
        })
    }
}

impl SegmentWriter for FileSegmentWriter {
    fn append(&mut self, bytes: &[u8]) -> Result<(u64, u64)> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(bytes)?;
        Ok((offset, bytes.len() as u64))
    }

    fn commit(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.checkpoint = self.file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.file.set_len(self.checkpoint)?;
        self.file.seek(SeekFrom::Start(self.checkpoint))?;
        Ok(())
    }
}

pub struct FileSegmentChecker {
    segment: FileSegment,
}

impl FileSegmentChecker {
    pub fn new(segment: FileSegment) -> Self {
        Self { segment }
    }
}

impl SegmentChecker for FileSegmentChecker {
    fn scan_data(&self, scanner: &dyn FormatScanner, format: &str) -> Result<Vec<Metadata>> {
        let bytes = fs::read(self.segment.data_path())?;
        let ranges = scanner.split(format, &bytes)?;
        Ok(ranges
            .into_iter()
            .map(|(offset, size)| {
                crate::metadata::Metadata::with_source(crate::metadata::Source::Blob {
                    format: format.to_string(),
                    basedir: self.segment.basedir.clone(),
                    relpath: self.segment.relpath.clone(),
                    offset,
                    size,
                })
            })
            .collect())
    }

    fn repack(&mut self, keep: &[(u64, u64)]) -> Result<u64> {
        let src_path = self.segment.data_path();
        let tmp_path = src_path.with_extension(format!("{}.repack", self.segment.format));
        {
            let mut src = File::open(&src_path)?;
            let mut tmp = File::create(&tmp_path)?;
            for &(offset, size) in keep {
                src.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0u8; size as usize];
                src.read_exact(&mut buf)?;
                tmp.write_all(&buf)?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &src_path)?;
        self.segment.size_on_disk()
    }

    fn tar(&mut self) -> Result<PathBuf> {
        crate::segment::archived_segment::write_tar(&self.segment)
    }

    fn zip(&mut self) -> Result<PathBuf> {
        crate::segment::archived_segment::write_zip(&self.segment)
    }

    fn compress(&mut self, group_size: usize) -> Result<PathBuf> {
        crate::segment::archived_segment::write_gz_groups(&self.segment, group_size)
    }

    fn remove(&mut self, with_data: bool) -> Result<u64> {
        let mut freed = 0u64;
        if with_data {
            freed += self.segment.size_on_disk().unwrap_or(0);
            let _ = fs::remove_file(self.segment.data_path());
        }
        let _ = fs::remove_file(self.segment.metadata_sidecar_path());
        let _ = fs::remove_file(self.segment.summary_sidecar_path());
        Ok(freed)
    }

    fn is_aligned(&self, rows: &[(u64, u64)]) -> Result<bool> {
        let actual = self.segment.size_on_disk().unwrap_or(0);
        Ok(rows.iter().all(|&(offset, size)| offset + size <= actual))
    }

    fn raw_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(self.segment.data_path())?)
    }

    fn overwrite_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let src_path = self.segment.data_path();
        let tmp_path = src_path.with_extension(format!("{}.repack", self.segment.format));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &src_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let segment = FileSegment::new(dir.path(), "2024/01", "grib");
        let mut writer = FileSegmentWriter::open(segment.clone()).unwrap();
        let (off1, len1) = writer.append(b"first-message").unwrap();
        let (off2, _len2) = writer.append(b"second").unwrap();
        writer.commit().unwrap();

        assert_eq!(off1, 0);
        assert_eq!(off2, len1);
        assert_eq!(segment.read(off1, len1).unwrap(), b"first-message");
        assert_eq!(segment.read(off2, 6).unwrap(), b"second");
    }

    #[test]
    fn rollback_truncates_uncommitted_appends() {
        let dir = tempfile::tempdir().unwrap();
        let segment = FileSegment::new(dir.path(), "2024/01", "grib");
        let mut writer = FileSegmentWriter::open(segment.clone()).unwrap();
        writer.append(b"committed").unwrap();
        writer.commit().unwrap();
        writer.append(b"uncommitted").unwrap();
        writer.rollback().unwrap();
        assert_eq!(segment.size_on_disk().unwrap(), 9);
    }
}
