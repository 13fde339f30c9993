//! `caravel app` command

use anyhow::Result;

use caravel::ops::build_application;

use crate::cli::LinkArgs;

pub fn execute(args: LinkArgs) -> Result<()> {
    let request = super::build_request(&args.target)?;
    let link = super::link_request(&args);
    let toolchain = super::select_toolchain(&args.target)?;
    build_application(toolchain.as_ref(), &request, &link)?;
    Ok(())
}
