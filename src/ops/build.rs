//! Build orchestration.
//!
//! Each operation runs the same two-step sequence: compile whatever is
//! stale, then produce the link output. The link step is forced whenever
//! anything was compiled in this invocation and may otherwise be skipped
//! by the backend's own freshness rules.

use std::path::PathBuf;

use anyhow::Result;

use crate::builder::layout::{ArtifactLayout, SourceUnit};
use crate::builder::log::BuildLog;
use crate::builder::rebuild::plan_rebuilds;
use crate::builder::toolchain::{CompileBatch, ModuleKind, Profile, Toolchain};
use crate::util::fs::ensure_dir;

/// Inputs common to every build operation.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub name: String,
    pub output_dir: PathBuf,
    pub profile: Profile,
    pub sources: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<String>,
}

/// External libraries for link outputs that take them.
#[derive(Debug, Clone, Default)]
pub struct LinkRequest {
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
}

/// Build a static library, returning the archive path.
pub fn build_static_lib(toolchain: &dyn Toolchain, request: &BuildRequest) -> Result<PathBuf> {
    run_logged(request, |log| {
        let did_compile = compile_stale_sources(toolchain, request, log)?;
        toolchain.link_static_lib(
            &request.name,
            &request.output_dir,
            request.profile,
            did_compile,
            log,
        )?;
        Ok(request
            .output_dir
            .join(toolchain.library_file_name(&request.name)))
    })
}

/// Build a shared library, returning the linked output path.
pub fn build_shared_lib(
    toolchain: &dyn Toolchain,
    request: &BuildRequest,
    link: &LinkRequest,
) -> Result<PathBuf> {
    build_module(toolchain, request, link, ModuleKind::SharedLib)
}

/// Build an application, returning the linked output path.
pub fn build_application(
    toolchain: &dyn Toolchain,
    request: &BuildRequest,
    link: &LinkRequest,
) -> Result<PathBuf> {
    build_module(toolchain, request, link, ModuleKind::Application)
}

fn build_module(
    toolchain: &dyn Toolchain,
    request: &BuildRequest,
    link: &LinkRequest,
    kind: ModuleKind,
) -> Result<PathBuf> {
    run_logged(request, |log| {
        let did_compile = compile_stale_sources(toolchain, request, log)?;
        toolchain.link_module(
            &request.name,
            &request.output_dir,
            request.profile,
            did_compile,
            kind,
            &link.lib_dirs,
            &link.libs,
            log,
        )?;
        Ok(request
            .output_dir
            .join(toolchain.module_file_name(&request.name, kind)))
    })
}

/// Open the build log, announce the target, run the steps, and make sure
/// any failure reaches both the console and the log exactly once.
fn run_logged<F>(request: &BuildRequest, steps: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BuildLog) -> Result<PathBuf>,
{
    ensure_dir(&request.output_dir)?;
    let mut log = BuildLog::create(&request.output_dir, &request.name)?;
    log.status(&format!(
        "-- Building {} ({}) --",
        request.name, request.profile
    ));

    match steps(&mut log) {
        Ok(path) => {
            tracing::info!("built {}", path.display());
            Ok(path)
        }
        Err(err) => {
            log.error(&format!("build failed: {:#}", err));
            Err(err)
        }
    }
}

/// Compile every stale source of the target. Returns whether anything was
/// compiled, which the caller feeds into the link step's skip logic.
fn compile_stale_sources(
    toolchain: &dyn Toolchain,
    request: &BuildRequest,
    log: &mut BuildLog,
) -> Result<bool> {
    let layout = ArtifactLayout::new(&request.output_dir, &request.name);
    layout.ensure()?;

    let sources: Vec<SourceUnit> = request
        .sources
        .iter()
        .map(|path| SourceUnit::new(path))
        .collect::<Result<_>>()?;

    let rebuilds = plan_rebuilds(toolchain, &layout, &sources)?;
    if rebuilds.is_empty() {
        log.record("no source files have been updated; skipping compilation");
        return Ok(false);
    }

    tracing::debug!("{} of {} sources are stale", rebuilds.len(), sources.len());
    toolchain.compile(
        CompileBatch {
            target_name: &request.name,
            profile: request.profile,
            output_dir: &request.output_dir,
            rebuilds,
            include_dirs: &request.include_dirs,
            defines: &request.defines,
        },
        log,
    )?;
    Ok(true)
}
