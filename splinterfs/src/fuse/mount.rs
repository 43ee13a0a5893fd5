// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mount helpers for starting/stopping FUSE
//!
//! Thin wrappers over the rfuse3 raw Session APIs. On Linux the default is an
//! unprivileged mount through fusermount3.

use std::path::Path;

use rfuse3::raw::{MountHandle, Session};

use crate::fs::SplitFs;
use crate::fuse::options::FuseArgs;

/// Mount `fs` on `mount_point`, which must already exist.
#[cfg(target_os = "linux")]
pub async fn mount_split_fs(
    fs: SplitFs,
    mount_point: impl AsRef<Path>,
    args: &FuseArgs,
    privileged: bool,
) -> std::io::Result<MountHandle> {
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    let session = Session::new(args.mount_options(uid, gid));
    let mount_point = mount_point.as_ref();
    if privileged {
        debug!("mounting {} (privileged)", mount_point.display());
        session.mount(fs, mount_point).await
    } else {
        debug!("mounting {} (unprivileged)", mount_point.display());
        session.mount_with_unprivileged(fs, mount_point).await
    }
}

#[cfg(not(target_os = "linux"))]
pub async fn mount_split_fs(
    _fs: SplitFs,
    _mount_point: impl AsRef<Path>,
    _args: &FuseArgs,
    _privileged: bool,
) -> std::io::Result<MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}
