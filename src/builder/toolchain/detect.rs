//! Host toolchain detection.
//!
//! Finds installed compilers by environment variable and PATH lookup, never
//! by running them. Detection happens once per invocation; the resulting
//! tool descriptor is immutable.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::util::process::find_executable;

use super::{GccTarget, GccToolchain, GccTools, MsvcArch, MsvcToolchain, MsvcTools, Toolchain};

/// Toolchain names accepted by [`detect_named_toolchain`].
pub const SUPPORTED_TOOLCHAINS: &[&str] =
    &["gcc-x86", "gcc-x64", "mingw-x86", "msvc-x86", "msvc-x64"];

/// Locate a working toolchain on this machine.
///
/// On Windows, Visual C++ is preferred over MinGW. On other hosts the
/// GCC-family tools are resolved from `CC`/`CXX`/`AR` overrides first,
/// then from PATH.
pub fn detect_host_toolchain() -> Result<Box<dyn Toolchain>> {
    if cfg!(windows) {
        if let Some(toolchain) = detect_msvc(host_msvc_arch()) {
            tracing::debug!("detected Visual C++ toolchain");
            return Ok(Box::new(toolchain));
        }
        if let Some(toolchain) = detect_mingw() {
            tracing::debug!("detected MinGW toolchain");
            return Ok(Box::new(toolchain));
        }
        bail!(
            "no C/C++ toolchain found; install Visual Studio (VS120COMNTOOLS must be set) \
             or MinGW"
        );
    }

    if let Some(toolchain) = detect_gcc_unix(gcc_host_target()) {
        tracing::debug!("detected GCC toolchain");
        return Ok(Box::new(toolchain));
    }
    bail!("no C/C++ toolchain found; install gcc/g++ or set CC, CXX, and AR")
}

/// Locate a specific toolchain by name instead of auto-detecting.
pub fn detect_named_toolchain(name: &str) -> Result<Box<dyn Toolchain>> {
    let found: Option<Box<dyn Toolchain>> = match name {
        "gcc-x86" => detect_gcc_unix(GccTarget::LinuxX86).map(boxed),
        "gcc-x64" => detect_gcc_unix(GccTarget::LinuxX64).map(boxed),
        "mingw-x86" => detect_mingw().map(boxed),
        "msvc-x86" => detect_msvc(MsvcArch::X86).map(boxed),
        "msvc-x64" => detect_msvc(MsvcArch::X64).map(boxed),
        other => bail!(
            "unknown toolchain '{}'; supported: {}",
            other,
            SUPPORTED_TOOLCHAINS.join(", ")
        ),
    };
    found.ok_or_else(|| anyhow::anyhow!("toolchain '{}' is not installed", name))
}

fn boxed(toolchain: impl Toolchain + 'static) -> Box<dyn Toolchain> {
    Box::new(toolchain)
}

fn host_msvc_arch() -> MsvcArch {
    if cfg!(target_pointer_width = "64") {
        MsvcArch::X64
    } else {
        MsvcArch::X86
    }
}

fn gcc_host_target() -> GccTarget {
    if cfg!(target_pointer_width = "64") {
        GccTarget::LinuxX64
    } else {
        GccTarget::LinuxX86
    }
}

/// Resolve one tool: a non-empty environment override wins, then PATH.
fn tool(env_var: &str, name: &str) -> Option<PathBuf> {
    if let Ok(value) = env::var(env_var) {
        if !value.is_empty() {
            return Some(PathBuf::from(value));
        }
    }
    find_executable(name)
}

fn detect_gcc_unix(target: GccTarget) -> Option<GccToolchain> {
    let tools = GccTools {
        cc: tool("CC", "gcc")?,
        cxx: tool("CXX", "g++")?,
        ar: tool("AR", "ar")?,
        strip: find_executable("strip")?,
        windres: None,
        // The native driver already knows its system paths.
        builtin_include_dirs: Vec::new(),
        builtin_lib_dirs: Vec::new(),
    };
    Some(GccToolchain::new(tools, target))
}

fn detect_mingw() -> Option<GccToolchain> {
    let gcc = find_mingw_gcc()?;
    let bin_dir = gcc.parent()?.to_path_buf();
    let root = bin_dir.parent()?.to_path_buf();

    let tools = GccTools {
        cxx: bin_dir.join("mingw32-g++.exe"),
        ar: bin_dir.join("ar.exe"),
        strip: bin_dir.join("strip.exe"),
        windres: Some(bin_dir.join("windres.exe")),
        builtin_include_dirs: vec![root.join("include")],
        builtin_lib_dirs: vec![root.join("lib")],
        cc: gcc,
    };
    Some(GccToolchain::new(tools, GccTarget::MingwX86))
}

fn find_mingw_gcc() -> Option<PathBuf> {
    if let Some(path) = find_executable("mingw32-gcc") {
        return Some(path);
    }
    // Default installer location when the bin directory is not on PATH.
    let fallback = PathBuf::from(r"c:\mingw\bin\mingw32-gcc.exe");
    fallback.is_file().then_some(fallback)
}

/// Derive the VC directory from a `VS*COMNTOOLS` value, which points at
/// `<vs>\Common7\Tools\`.
fn vc_root_from_common_tools(common_tools: &str) -> Option<PathBuf> {
    let tools_dir = PathBuf::from(common_tools);
    Some(tools_dir.parent()?.parent()?.join("VC"))
}

fn detect_msvc(arch: MsvcArch) -> Option<MsvcToolchain> {
    // Newest installed Visual Studio wins.
    let common_tools = ["VS120COMNTOOLS", "VS100COMNTOOLS", "VS90COMNTOOLS"]
        .iter()
        .find_map(|var| env::var(var).ok().filter(|v| !v.is_empty()))?;
    let vc_dir = vc_root_from_common_tools(&common_tools)?;
    let sdk_dir = PathBuf::from(env::var("WindowsSdkDir").ok().filter(|v| !v.is_empty())?);

    let host_bin = vc_dir.join("bin");
    let (tool_bin, vc_lib, rc) = match arch {
        MsvcArch::X86 => (
            host_bin.clone(),
            vc_dir.join("lib"),
            sdk_dir.join("bin").join("rc.exe"),
        ),
        MsvcArch::X64 => (
            host_bin.join("x86_amd64"),
            vc_dir.join("lib").join("amd64"),
            sdk_dir.join("bin").join("x64").join("rc.exe"),
        ),
    };

    let cl = tool_bin.join("cl.exe");
    if !cl.is_file() {
        return None;
    }

    let sdk_lib = match arch {
        MsvcArch::X86 => sdk_dir.join("Lib"),
        MsvcArch::X64 => sdk_dir.join("Lib").join("x64"),
    };

    // cl.exe and link.exe load DLLs from the host bin and IDE directories.
    let ide_dir = vc_dir.parent()?.join("Common7").join("IDE");
    let mut path_value = format!("{};{}", host_bin.display(), ide_dir.display());
    if let Ok(existing) = env::var("PATH") {
        path_value.push(';');
        path_value.push_str(&existing);
    }

    let tools = MsvcTools {
        cl,
        link: tool_bin.join("link.exe"),
        lib: tool_bin.join("lib.exe"),
        rc,
        builtin_include_dirs: vec![vc_dir.join("include"), sdk_dir.join("Include")],
        builtin_lib_dirs: vec![vc_lib, sdk_lib],
        env: vec![("PATH".to_string(), path_value)],
    };
    Some(MsvcToolchain::new(tools, arch))
}
