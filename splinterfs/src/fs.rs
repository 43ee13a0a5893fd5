// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Path based split filesystem.
//!
//! [`SplitFs`] answers the four requests a client can make against the mount:
//! `getattr`, `readdir`, `open` and `read`, each keyed by a virtual path. The
//! FUSE adapter in [`crate::fuse`] turns inode requests into these calls.

use std::time::{Duration, SystemTime};

use bytes::Bytes;

use crate::error::{Result, SplitError};
use crate::mapper::{SplitLayout, VirtualPath, format_split_name};
use crate::source::{SourceFile, SourceStat};

pub const ROOT_MODE: u16 = 0o755;
pub const SPLIT_MODE: u16 = 0o444;

const DEFAULT_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Root,
    Split(u64),
}

#[derive(Debug, Clone, Copy)]
pub struct SplitAttr {
    pub kind: EntryKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

#[derive(Debug, Clone)]
pub struct SplitDirEntry {
    pub name: String,
    pub attr: SplitAttr,
}

/// A source file presented as a directory of splits.
///
/// Immutable after construction; share it freely between requests.
#[derive(Debug)]
pub struct SplitFs {
    source: SourceFile,
    layout: SplitLayout,
    ttl: Duration,
}

impl SplitFs {
    pub fn new(source: SourceFile, layout: SplitLayout) -> Self {
        Self {
            source,
            layout,
            ttl: DEFAULT_TTL,
        }
    }

    /// How long the kernel may cache entries and attributes.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn layout(&self) -> SplitLayout {
        self.layout
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn split_name(&self, index: u64) -> String {
        format_split_name(index, self.source.base_name())
    }

    pub fn split_path(&self, index: u64) -> String {
        format!("/{}", self.split_name(index))
    }

    pub async fn stat_source(&self) -> Result<SourceStat> {
        self.source.stat().await.map_err(|e| {
            warn!("stat {} failed: {e}", self.source.path().display());
            SplitError::Source(e)
        })
    }

    pub async fn getattr(&self, path: &str) -> Result<SplitAttr> {
        debug!("getattr {path}");
        let res = self.getattr_inner(path).await;
        match &res {
            Ok(attr) => debug!("getattr {path}: size {}", attr.size),
            Err(e) => debug!("getattr {path}: {e}"),
        }
        res
    }

    async fn getattr_inner(&self, path: &str) -> Result<SplitAttr> {
        let vpath = VirtualPath::parse(path).ok_or_else(|| SplitError::NotFound(path.into()))?;
        let stat = self.stat_source().await?;
        match vpath {
            VirtualPath::Root => Ok(self.root_attr(&stat)),
            VirtualPath::Split { index, .. } => self
                .split_attr(&stat, index)
                .ok_or_else(|| SplitError::NotFound(path.into())),
        }
    }

    /// List the root: `.`, `..` and every split in ascending index order.
    pub async fn readdir(&self, path: &str) -> Result<Vec<SplitDirEntry>> {
        debug!("readdir {path}");
        if VirtualPath::parse(path) != Some(VirtualPath::Root) {
            debug!("readdir {path}: not a directory of this filesystem");
            return Err(SplitError::NotFound(path.into()));
        }
        let stat = self.stat_source().await?;
        let count = self.layout.split_count(stat.size);
        debug!("readdir {path}: {count} splits for {} bytes", stat.size);

        let root = self.root_attr(&stat);
        let mut entries = Vec::with_capacity(count as usize + 2);
        entries.push(SplitDirEntry {
            name: ".".into(),
            attr: root,
        });
        entries.push(SplitDirEntry {
            name: "..".into(),
            attr: root,
        });
        for index in 0..count {
            let Some(attr) = self.split_attr(&stat, index) else {
                break;
            };
            entries.push(SplitDirEntry {
                name: self.split_name(index),
                attr,
            });
        }
        Ok(entries)
    }

    /// Grant read-only access to anything that looks like a split.
    ///
    /// The index is not checked against the current source size here; a
    /// stale index fails later in `getattr` or `read`.
    pub async fn open(&self, path: &str, flags: u32) -> Result<()> {
        debug!("open {path} flags {flags:#o}");
        let Some(VirtualPath::Split { .. }) = VirtualPath::parse(path) else {
            debug!("open {path}: no such split");
            return Err(SplitError::NotFound(path.into()));
        };
        let flags_i = flags as i32;
        if flags_i & libc::O_ACCMODE != libc::O_RDONLY || flags_i & libc::O_APPEND != 0 {
            debug!("open {path}: write access denied");
            return Err(SplitError::AccessDenied {
                path: path.into(),
                flags,
            });
        }
        debug!("open {path}: ok");
        Ok(())
    }

    /// Read `size` bytes at `offset` within the split named by `path`.
    ///
    /// The read is not fenced at the end of the split: it is served from the
    /// source starting at the translated offset, and only the end of the
    /// source shortens it.
    pub async fn read(&self, path: &str, offset: u64, size: u32) -> Result<Bytes> {
        debug!("read {path} offset {offset} size {size}");
        let Some(VirtualPath::Split { index, .. }) = VirtualPath::parse(path) else {
            debug!("read {path}: no such split");
            return Err(SplitError::NotFound(path.into()));
        };
        let stat = self.stat_source().await?;
        if !self.layout.contains(index, stat.size) {
            debug!("read {path}: split {index} out of range");
            return Err(SplitError::NotFound(path.into()));
        }
        let range = self
            .layout
            .translate_read(index, offset, u64::from(size))
            .ok_or(SplitError::InvalidOffset { index, offset })?;
        let data = self
            .source
            .read_at(range.offset, range.len)
            .await
            .map_err(|e| {
                warn!("read source at {} failed: {e}", range.offset);
                SplitError::Source(e)
            })?;
        debug!(
            "read {path}: {} bytes from source offset {}",
            data.len(),
            range.offset
        );
        Ok(data)
    }

    fn root_attr(&self, stat: &SourceStat) -> SplitAttr {
        SplitAttr {
            kind: EntryKind::Root,
            size: 0,
            perm: ROOT_MODE,
            nlink: 2,
            uid: stat.uid,
            gid: stat.gid,
            atime: stat.atime,
            mtime: stat.mtime,
            ctime: stat.ctime,
        }
    }

    fn split_attr(&self, stat: &SourceStat, index: u64) -> Option<SplitAttr> {
        if !self.layout.contains(index, stat.size) {
            return None;
        }
        Some(SplitAttr {
            kind: EntryKind::Split(index),
            size: self.layout.split_len(index, stat.size),
            perm: SPLIT_MODE,
            nlink: 1,
            uid: stat.uid,
            gid: stat.gid,
            atime: stat.atime,
            mtime: stat.mtime,
            ctime: stat.ctime,
        })
    }
}
