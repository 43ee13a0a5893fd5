// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to the real source file.
//!
//! Nothing about the source is cached: every stat hits the filesystem and every
//! read opens its own handle, so concurrent requests never share a seek
//! position and the handle is closed on every exit path.

use std::io::{self, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::ConfigError;

/// Snapshot of the source metadata taken for one request.
#[derive(Debug, Clone, Copy)]
pub struct SourceStat {
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl From<&std::fs::Metadata> for SourceStat {
    fn from(m: &std::fs::Metadata) -> Self {
        SourceStat {
            size: m.len(),
            uid: m.uid(),
            gid: m.gid(),
            atime: unix_time(m.atime(), m.atime_nsec()),
            mtime: unix_time(m.mtime(), m.mtime_nsec()),
            ctime: unix_time(m.ctime(), m.ctime_nsec()),
        }
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

/// The single file all splits are cut from.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    base_name: String,
}

impl SourceFile {
    /// Resolve `path` to an absolute path and check it is a regular file.
    ///
    /// Called once at startup; any failure here is fatal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let unavailable = |source: io::Error| ConfigError::SourceUnavailable {
            path: path.as_ref().display().to_string(),
            source,
        };
        let path = std::fs::canonicalize(path.as_ref()).map_err(unavailable)?;
        let meta = std::fs::metadata(&path).map_err(unavailable)?;
        if !meta.is_file() {
            return Err(ConfigError::NotAFile(path.display().to_string()));
        }
        let base_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ConfigError::NotAFile(path.display().to_string()))?;
        Ok(Self { path, base_name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used to name the splits.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Fresh metadata of the source.
    pub async fn stat(&self) -> io::Result<SourceStat> {
        let meta = tokio::fs::metadata(&self.path).await?;
        Ok(SourceStat::from(&meta))
    }

    /// Read up to `len` bytes starting at absolute `offset`.
    ///
    /// Returns fewer bytes only when the end of the source is reached.
    pub async fn read_at(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC) as usize);
        file.take(len).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

// FUSE reads are at most a few hundred KiB; don't trust `len` blindly.
const MAX_PREALLOC: u64 = 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source_with(data: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_resolves_base_name() {
        let (dir, path) = source_with(b"abc");
        let src = SourceFile::open(&path).unwrap();
        assert_eq!(src.base_name(), "big.bin");
        assert!(src.path().is_absolute());
        drop(dir);
    }

    #[test]
    fn test_open_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        match SourceFile::open(dir.path().join("missing")) {
            Err(ConfigError::SourceUnavailable { source, .. }) => {
                assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            SourceFile::open(dir.path()),
            Err(ConfigError::NotAFile(_))
        ));
    }

    #[tokio::test]
    async fn test_stat_is_not_cached() {
        let (_dir, path) = source_with(&[7u8; 10]);
        let src = SourceFile::open(&path).unwrap();
        assert_eq!(src.stat().await.unwrap().size, 10);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[8u8; 5]).unwrap();
        assert_eq!(src.stat().await.unwrap().size, 15);
    }

    #[tokio::test]
    async fn test_read_at() {
        let data: Vec<u8> = (0..=255u8).collect();
        let (_dir, path) = source_with(&data);
        let src = SourceFile::open(&path).unwrap();

        let got = src.read_at(10, 20).await.unwrap();
        assert_eq!(&got[..], &data[10..30]);

        // short read at end of file
        let got = src.read_at(250, 100).await.unwrap();
        assert_eq!(&got[..], &data[250..]);

        // past end of file
        let got = src.read_at(1000, 10).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_read_at_missing_source() {
        let (dir, path) = source_with(b"abc");
        let src = SourceFile::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let err = src.read_at(0, 1).await.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        drop(dir);
    }
}
