// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use env_logger::{Builder, Env, Target};

/// Install the process-wide logger.
///
/// `RUST_LOG` wins over `debug`. With `log_file` set, records are appended to
/// that file instead of stderr.
pub fn init_logging(debug: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.try_init().context("install logger")?;
    Ok(())
}
