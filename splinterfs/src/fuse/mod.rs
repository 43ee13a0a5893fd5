// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FUSE adapter for [`SplitFs`].
//!
//! The kernel talks in inodes while [`SplitFs`] talks in virtual paths. The
//! root is inode 1 and split `i` is inode `i + 2`; the mapping depends only on
//! the index, so it survives size changes of the source. Each request is
//! translated into the canonical path of its inode and handed to the core.
//!
//! - `mount`: session setup.
//! - `options`: parsing of libfuse-style command line arguments.
pub mod mount;
pub mod options;

use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;

use futures_util::stream::{self, Stream};
use rfuse3::Result as FuseResult;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs,
};
use rfuse3::raw::{Filesystem, Request};
use rfuse3::{FileType, Timestamp};

use crate::fs::{EntryKind, SplitAttr, SplitFs};
use crate::mapper::parse_split_name;

pub const ROOT_INO: u64 = 1;
const FIRST_SPLIT_INO: u64 = 2;

const BLOCK_SIZE: u32 = 4096;
const MAX_WRITE: NonZeroU32 = NonZeroU32::new(128 * 1024).unwrap();

pub fn split_ino(index: u64) -> Option<u64> {
    index.checked_add(FIRST_SPLIT_INO)
}

pub fn ino_to_entry(ino: u64) -> Option<EntryKind> {
    match ino {
        ROOT_INO => Some(EntryKind::Root),
        0 => None,
        _ => ino.checked_sub(FIRST_SPLIT_INO).map(EntryKind::Split),
    }
}

impl SplitFs {
    /// Canonical virtual path of an inode.
    fn path_of(&self, ino: u64) -> Option<String> {
        match ino_to_entry(ino)? {
            EntryKind::Root => Some("/".to_string()),
            EntryKind::Split(index) => Some(self.split_path(index)),
        }
    }

    fn split_path_of(&self, ino: u64) -> FuseResult<String> {
        match ino_to_entry(ino) {
            Some(EntryKind::Split(index)) => Ok(self.split_path(index)),
            Some(EntryKind::Root) => Err(libc::EISDIR.into()),
            None => Err(libc::ENOENT.into()),
        }
    }
}

impl Filesystem for SplitFs {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        info!(
            "serving {} as splits of {} bytes",
            self.source().path().display(),
            self.layout().split_size()
        );
        Ok(ReplyInit {
            max_write: MAX_WRITE,
        })
    }

    async fn destroy(&self, _req: Request) {
        info!("filesystem destroyed");
    }

    async fn lookup(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        if parent != ROOT_INO {
            return Err(if ino_to_entry(parent).is_some() {
                libc::ENOTDIR.into()
            } else {
                libc::ENOENT.into()
            });
        }
        let name = name.to_string_lossy();
        debug!("lookup {name}");
        if parse_split_name(&name).is_none() {
            debug!("lookup {name}: not a split name");
            return Err(libc::ENOENT.into());
        }
        let attr = self.getattr(&format!("/{name}")).await?;
        let attr = to_fuse_attr(&attr)?;
        debug!("lookup {name}: ino {} size {}", attr.ino, attr.size);
        Ok(ReplyEntry {
            ttl: self.ttl(),
            attr,
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let attr = SplitFs::getattr(self, &path).await?;
        Ok(ReplyAttr {
            ttl: self.ttl(),
            attr: to_fuse_attr(&attr)?,
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        let path = self.split_path_of(ino)?;
        SplitFs::open(self, &path, flags).await?;
        // Stateless: every read reopens the source.
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let path = self.split_path_of(ino)?;
        let data = SplitFs::read(self, &path, offset, size).await?;
        Ok(ReplyData { data })
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn flush(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _lock_owner: u64,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        match ino_to_entry(ino) {
            Some(EntryKind::Root) => Ok(ReplyOpen { fh: 0, flags: 0 }),
            Some(EntryKind::Split(_)) => Err(libc::ENOTDIR.into()),
            None => Err(libc::ENOENT.into()),
        }
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        Ok(())
    }

    // offset is that of the last entry the kernel has seen
    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let entries = SplitFs::readdir(self, &path).await?;
        let mut out = Vec::with_capacity(entries.len());
        for (i, e) in entries.into_iter().enumerate() {
            let next = (i as i64) + 1;
            if next <= offset {
                continue;
            }
            out.push(DirectoryEntry {
                inode: entry_ino(&e.attr)?,
                kind: fuse_kind(e.attr.kind),
                name: OsString::from(e.name),
                offset: next,
            });
        }
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream::iter(out.into_iter().map(Ok)));
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let entries = SplitFs::readdir(self, &path).await?;
        let ttl = self.ttl();
        let mut out = Vec::with_capacity(entries.len());
        for (i, e) in entries.into_iter().enumerate() {
            let next = (i as u64) + 1;
            if next <= offset {
                continue;
            }
            out.push(DirectoryEntryPlus {
                inode: entry_ino(&e.attr)?,
                generation: 0,
                kind: fuse_kind(e.attr.kind),
                name: OsString::from(e.name),
                offset: next as i64,
                attr: to_fuse_attr(&e.attr)?,
                entry_ttl: ttl,
                attr_ttl: ttl,
            });
        }
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream::iter(out.into_iter().map(Ok)));
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn access(&self, _req: Request, inode: u64, mask: u32) -> FuseResult<()> {
        let Some(kind) = ino_to_entry(inode) else {
            return Err(libc::ENOENT.into());
        };
        if matches!(kind, EntryKind::Split(_)) && mask as i32 & libc::W_OK != 0 {
            return Err(libc::EACCES.into());
        }
        Ok(())
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        let stat = self.stat_source().await?;
        // splits plus the root directory
        let files = self.layout().split_count(stat.size) + 1;
        debug!("statfs: {} bytes, {files} files", stat.size);
        Ok(ReplyStatFs {
            blocks: stat.size.div_ceil(u64::from(BLOCK_SIZE)),
            bfree: 0,
            bavail: 0,
            files,
            ffree: 0,
            bsize: BLOCK_SIZE,
            namelen: 255,
            frsize: BLOCK_SIZE,
        })
    }

    async fn forget(&self, _req: Request, _inode: u64, _nlookup: u64) {}

    async fn batch_forget(&self, _req: Request, _inodes: &[(u64, u64)]) {}

    async fn interrupt(&self, _req: Request, _unique: u64) -> FuseResult<()> {
        Ok(())
    }
}

fn fuse_kind(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Root => FileType::Directory,
        EntryKind::Split(_) => FileType::RegularFile,
    }
}

fn entry_ino(attr: &SplitAttr) -> FuseResult<u64> {
    match attr.kind {
        EntryKind::Root => Ok(ROOT_INO),
        EntryKind::Split(index) => split_ino(index).ok_or_else(|| libc::EOVERFLOW.into()),
    }
}

fn to_fuse_attr(attr: &SplitAttr) -> FuseResult<FileAttr> {
    Ok(FileAttr {
        ino: entry_ino(attr)?,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: Timestamp::from(attr.atime),
        mtime: Timestamp::from(attr.mtime),
        ctime: Timestamp::from(attr.ctime),
        #[cfg(target_os = "macos")]
        crtime: Timestamp::from(attr.mtime),
        kind: fuse_kind(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: BLOCK_SIZE,
    })
}
