//! Command implementations.

pub mod app;
pub mod shared_lib;
pub mod static_lib;

use std::env;

use anyhow::{anyhow, bail, Result};

use caravel::builder::toolchain::{detect_host_toolchain, detect_named_toolchain, Profile};
use caravel::builder::Toolchain;
use caravel::ops::{BuildRequest, LinkRequest};
use caravel::util::fs::glob_files;

use crate::cli::{LinkArgs, TargetArgs};

/// Turn CLI target arguments into a build request, expanding source globs
/// relative to the current directory.
pub fn build_request(args: &TargetArgs) -> Result<BuildRequest> {
    let profile = args
        .profile
        .parse::<Profile>()
        .map_err(|e| anyhow!("{}", e))?;

    let cwd = env::current_dir()?;
    let sources = glob_files(&cwd, &args.sources)?;
    if sources.is_empty() {
        bail!("no source files matched: {}", args.sources.join(", "));
    }

    Ok(BuildRequest {
        name: args.name.clone(),
        output_dir: args.out_dir.clone(),
        profile,
        sources,
        include_dirs: args.include_dirs.clone(),
        defines: args.defines.clone(),
    })
}

/// Pick the requested toolchain, or auto-detect when none was named.
pub fn select_toolchain(args: &TargetArgs) -> Result<Box<dyn Toolchain>> {
    match &args.toolchain {
        Some(name) => detect_named_toolchain(name),
        None => detect_host_toolchain(),
    }
}

pub fn link_request(args: &LinkArgs) -> LinkRequest {
    LinkRequest {
        lib_dirs: args.lib_dirs.clone(),
        libs: args.libs.clone(),
    }
}
