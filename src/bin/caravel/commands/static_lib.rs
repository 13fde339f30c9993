//! `caravel static-lib` command

use anyhow::Result;

use caravel::ops::build_static_lib;

use crate::cli::TargetArgs;

pub fn execute(args: TargetArgs) -> Result<()> {
    // Expand sources before touching the toolchain so argument errors
    // surface even on machines with no compiler installed.
    let request = super::build_request(&args)?;
    let toolchain = super::select_toolchain(&args)?;
    build_static_lib(toolchain.as_ref(), &request)?;
    Ok(())
}
