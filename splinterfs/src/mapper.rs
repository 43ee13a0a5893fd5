// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Virtual-to-real mapping rules.
//!
//! Everything here is a pure function of plain values: the source size, the
//! layout and a split index or name. No I/O happens in this module.

use crate::error::ConfigError;

/// Default size of one split, in bytes.
pub const DEFAULT_SPLIT_SIZE: u64 = 100_048_576;
/// Default cap on the number of exposed splits.
pub const DEFAULT_MAX_SPLITS: u64 = 1000;

const PATH_SEPARATOR: char = '/';
const INDEX_DELIMITER: char = '_';

/// How the source file is cut into splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitLayout {
    split_size: u64,
    max_splits: u64,
}

impl Default for SplitLayout {
    fn default() -> Self {
        Self {
            split_size: DEFAULT_SPLIT_SIZE,
            max_splits: DEFAULT_MAX_SPLITS,
        }
    }
}

/// A read against the source file, in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRange {
    pub offset: u64,
    pub len: u64,
}

impl SplitLayout {
    pub fn new(split_size: u64, max_splits: u64) -> Result<Self, ConfigError> {
        if split_size == 0 {
            return Err(ConfigError::ZeroSplitSize);
        }
        if max_splits == 0 {
            return Err(ConfigError::ZeroMaxSplits);
        }
        Ok(Self {
            split_size,
            max_splits,
        })
    }

    pub fn split_size(&self) -> u64 {
        self.split_size
    }

    pub fn max_splits(&self) -> u64 {
        self.max_splits
    }

    /// Number of splits exposed for a source of `source_size` bytes.
    ///
    /// Anything past `max_splits * split_size` is not reachable.
    pub fn split_count(&self, source_size: u64) -> u64 {
        source_size.div_ceil(self.split_size).min(self.max_splits)
    }

    /// Whether `index` names a split of a source of `source_size` bytes.
    pub fn contains(&self, index: u64, source_size: u64) -> bool {
        index < self.split_count(source_size)
    }

    /// Byte length of split `index`.
    ///
    /// Only meaningful for an index accepted by [`SplitLayout::contains`];
    /// out-of-range indices yield 0.
    pub fn split_len(&self, index: u64, source_size: u64) -> u64 {
        let start = index.saturating_mul(self.split_size);
        source_size.saturating_sub(start).min(self.split_size)
    }

    /// Absolute source offset of the first byte of split `index`.
    pub fn split_start(&self, index: u64) -> Option<u64> {
        index.checked_mul(self.split_size)
    }

    /// Translate a read of split `index` into a read of the source.
    ///
    /// The length is not clamped to the split: a read running past the end of
    /// the split continues into the bytes of the next one, and only the end of
    /// the source shortens it. Returns `None` if the offset overflows.
    pub fn translate_read(&self, index: u64, local_offset: u64, len: u64) -> Option<ReadRange> {
        let offset = self.split_start(index)?.checked_add(local_offset)?;
        Some(ReadRange { offset, len })
    }
}

/// A parsed virtual path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualPath<'a> {
    Root,
    Split { index: u64, suffix: &'a str },
}

impl<'a> VirtualPath<'a> {
    /// Parse `/` or `/<index>_<suffix>`.
    pub fn parse(path: &'a str) -> Option<Self> {
        if path == "/" {
            return Some(VirtualPath::Root);
        }
        let (index, suffix) = parse_split_path(path)?;
        Some(VirtualPath::Split { index, suffix })
    }
}

/// Parse a split path of the form `/<index>_<suffix>`.
pub fn parse_split_path(path: &str) -> Option<(u64, &str)> {
    parse_split_name(path.strip_prefix(PATH_SEPARATOR)?)
}

/// Parse a bare split name of the form `<index>_<suffix>`.
///
/// The first underscore delimits the index, so the suffix may itself contain
/// underscores. The index is plain ASCII decimal: no sign, no whitespace.
pub fn parse_split_name(name: &str) -> Option<(u64, &str)> {
    let (digits, suffix) = name.split_once(INDEX_DELIMITER)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if suffix.is_empty() || suffix.contains(PATH_SEPARATOR) {
        return None;
    }
    let index = digits.parse::<u64>().ok()?;
    Some((index, suffix))
}

/// Canonical listing name of split `index`.
pub fn format_split_name(index: u64, base_name: &str) -> String {
    format!("{index}{INDEX_DELIMITER}{base_name}")
}
