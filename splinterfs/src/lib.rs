// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! splinterfs: a large file served as a read-only FUSE directory of
//! fixed-size split files, without copying any data.

#[macro_use]
extern crate log;

pub mod error;
pub mod fs;
pub mod fuse;
pub mod logging;
pub mod mapper;
pub mod source;

pub use error::{ConfigError, SplitError};
pub use fs::SplitFs;
pub use mapper::SplitLayout;
pub use source::SourceFile;
