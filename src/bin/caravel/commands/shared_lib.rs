//! `caravel shared-lib` command

use anyhow::Result;

use caravel::ops::build_shared_lib;

use crate::cli::LinkArgs;

pub fn execute(args: LinkArgs) -> Result<()> {
    let request = super::build_request(&args.target)?;
    let link = super::link_request(&args);
    let toolchain = super::select_toolchain(&args.target)?;
    build_shared_lib(toolchain.as_ref(), &request, &link)?;
    Ok(())
}
