// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! libfuse-style trailing arguments (`-o opt,opt`, `-f`, `-s`, `-d`).

use std::ffi::OsString;

use rfuse3::MountOptions;

use crate::error::ConfigError;

const DEFAULT_FS_NAME: &str = "splinterfs";

/// Mount settings gathered from the FUSE part of the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuseArgs {
    pub allow_other: bool,
    pub allow_root: bool,
    pub default_permissions: bool,
    pub fs_name: Option<String>,
    pub debug: bool,
    /// `-o` options with no dedicated setting, passed to the mount as is.
    pub custom: Vec<String>,
}

impl FuseArgs {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        let mut out = FuseArgs::default();
        let mut iter = args.iter().map(AsRef::as_ref);
        while let Some(arg) = iter.next() {
            match arg {
                "-o" => {
                    let opts = iter
                        .next()
                        .ok_or_else(|| ConfigError::MissingOptionValue("-o".into()))?;
                    out.push_options(opts)?;
                }
                // always foreground, requests are served concurrently anyway
                "-f" | "-s" => {}
                "-d" => out.debug = true,
                _ => match arg.strip_prefix("-o") {
                    Some(opts) => out.push_options(opts)?,
                    None => return Err(ConfigError::UnknownFuseArg(arg.into())),
                },
            }
        }
        Ok(out)
    }

    fn push_options(&mut self, opts: &str) -> Result<(), ConfigError> {
        for opt in opts.split(',').filter(|o| !o.is_empty()) {
            match opt {
                "allow_other" => self.allow_other = true,
                "allow_root" => self.allow_root = true,
                "default_permissions" => self.default_permissions = true,
                "debug" => self.debug = true,
                _ => match opt.strip_prefix("fsname=") {
                    Some("") => return Err(ConfigError::MissingOptionValue("fsname".into())),
                    Some(name) => self.fs_name = Some(name.into()),
                    None => self.custom.push(opt.into()),
                },
            }
        }
        Ok(())
    }

    /// Build the rfuse3 mount options, owned by `uid`/`gid`.
    pub fn mount_options(&self, uid: u32, gid: u32) -> MountOptions {
        let mut mo = MountOptions::default();
        mo.fs_name(self.fs_name.as_deref().unwrap_or(DEFAULT_FS_NAME))
            .uid(uid)
            .gid(gid)
            .allow_other(self.allow_other)
            .allow_root(self.allow_root)
            .default_permissions(self.default_permissions);
        if !self.custom.is_empty() {
            mo.custom_options(OsString::from(self.custom.join(",")));
        }
        mo
    }
}
