// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Mount a large file as a read-only directory of fixed-size splits.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use splinterfs::fuse::mount::mount_split_fs;
use splinterfs::fuse::options::FuseArgs;
use splinterfs::logging::init_logging;
use splinterfs::mapper::{DEFAULT_MAX_SPLITS, DEFAULT_SPLIT_SIZE};
use splinterfs::{SourceFile, SplitFs, SplitLayout};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Expose a large file as a read-only directory of fixed-size splits"
)]
struct Args {
    /// File to expose as splits
    source: PathBuf,
    /// Mount point, created if absent
    mountpoint: PathBuf,
    /// Size of each split in bytes
    #[arg(long, default_value_t = DEFAULT_SPLIT_SIZE)]
    split_size: u64,
    /// Maximum number of splits; bytes past the last one are not exposed
    #[arg(long, default_value_t = DEFAULT_MAX_SPLITS)]
    max_splits: u64,
    /// Entry and attribute cache timeout in seconds
    #[arg(long, default_value_t = 1)]
    attr_ttl: u64,
    /// Use privileged mount instead of fusermount3
    #[arg(long, default_value_t = false)]
    privileged: bool,
    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Append log records to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// FUSE options: -o opt[,opt...], -f, -s, -d
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    fuse_args: Vec<String>,
}

async fn run(args: Args) -> anyhow::Result<()> {
    let fuse_args = FuseArgs::parse(&args.fuse_args)?;
    init_logging(args.debug || fuse_args.debug, args.log_file.as_deref())?;

    let layout = SplitLayout::new(args.split_size, args.max_splits)?;
    let source = SourceFile::open(&args.source)?;
    std::fs::create_dir_all(&args.mountpoint)
        .with_context(|| format!("create mount point {}", args.mountpoint.display()))?;

    info!("source: {}", source.path().display());
    info!("mount point: {}", args.mountpoint.display());
    info!(
        "split size {} bytes, at most {} splits",
        layout.split_size(),
        layout.max_splits()
    );

    let fs = SplitFs::new(source, layout).with_ttl(Duration::from_secs(args.attr_ttl));
    let mut mount_handle = mount_split_fs(fs, &args.mountpoint, &fuse_args, args.privileged)
        .await
        .with_context(|| format!("mount {}", args.mountpoint.display()))?;
    info!("mounted, press Ctrl+C to unmount");

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => {
            res.context("fuse session")?;
            info!("filesystem exited");
            return Ok(());
        }
        _ = signal::ctrl_c() => {
            info!("received exit signal, unmounting");
        }
    }

    if let Err(e) = mount_handle.unmount().await {
        warn!("unmount failed: {e}");
        return Err(e.into());
    }
    info!("unmounted, good bye");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{e:#}");
        eprintln!("splinterfs: {e:#}");
        std::process::exit(1);
    }
}
