// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;

use thiserror::Error;

/// Failure of a single filesystem request.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("no such split: {0}")]
    NotFound(String),

    #[error("access denied to {path} (flags {flags:#o})")]
    AccessDenied { path: String, flags: u32 },

    #[error("offset overflow reading split {index} at {offset}")]
    InvalidOffset { index: u64, offset: u64 },

    #[error(transparent)]
    Source(#[from] io::Error),
}

impl SplitError {
    /// The errno reported back to the kernel.
    ///
    /// Source failures forward the OS error untouched.
    pub fn errno(&self) -> i32 {
        match self {
            SplitError::NotFound(_) => libc::ENOENT,
            SplitError::AccessDenied { .. } => libc::EACCES,
            SplitError::InvalidOffset { .. } => libc::EINVAL,
            SplitError::Source(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<SplitError> for rfuse3::Errno {
    fn from(e: SplitError) -> Self {
        e.errno().into()
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;

/// Invalid startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("split size must be greater than zero")]
    ZeroSplitSize,

    #[error("max splits must be greater than zero")]
    ZeroMaxSplits,

    #[error("source {0} is not a regular file")]
    NotAFile(String),

    #[error("source {path}: {source}")]
    SourceUnavailable { path: String, source: io::Error },

    #[error("unsupported fuse argument: {0}")]
    UnknownFuseArg(String),

    #[error("fuse option {0} requires a value")]
    MissingOptionValue(String),
}
