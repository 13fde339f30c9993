//! Toolchain abstraction for C/C++ compilers.
//!
//! This module provides a unified compile/link/archive contract across
//! toolchain backends (GCC-family and Visual C++), each further specialized
//! by target architecture. Backends translate a build profile into concrete
//! command lines; everything they learn about installed tools is captured
//! at detection time in an immutable tool descriptor and never mutated.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use regex::Regex;
use walkdir::WalkDir;

use crate::builder::errors::BuildError;
use crate::builder::log::BuildLog;
use crate::builder::rebuild::RebuildRecord;
use crate::util::fs::read_to_string;
use crate::util::process::ProcessBuilder;

mod detect;
mod gcc;
mod msvc;

pub use detect::{detect_host_toolchain, detect_named_toolchain, SUPPORTED_TOOLCHAINS};
pub use gcc::{GccTarget, GccToolchain, GccTools};
pub use msvc::{MsvcArch, MsvcToolchain, MsvcTools};

/// Optimization profile. Changes compiler and linker flags only; staleness
/// decisions never depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Debug,
    Release,
    Ship,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Debug => "debug",
            Profile::Release => "release",
            Profile::Ship => "ship",
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, Profile::Debug)
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Profile::Debug),
            "release" => Ok(Profile::Release),
            "ship" => Ok(Profile::Ship),
            _ => Err(format!(
                "invalid profile '{}'; expected 'debug', 'release', or 'ship'",
                s
            )),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of link output produced by the link step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    SharedLib,
    Application,
}

/// What the backend knows about object code for a source file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDetails {
    /// Object file extension, without the leading dot.
    pub extension: &'static str,
    /// Whether compiling this source kind produces a dependency list.
    pub needs_deps: bool,
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to run (e.g., "gcc", "cl.exe")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Render the command line for logging and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured result of one external tool invocation: exit status plus the
/// combined stdout and stderr text. This is the sole channel for detecting
/// tool failure.
#[derive(Debug)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub output: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Invoke one external tool synchronously, blocking until it exits.
///
/// The command line is recorded in the build log before the tool runs.
pub fn run_tool(spec: &CommandSpec, log: &mut BuildLog) -> Result<ToolOutput> {
    let command_line = spec.display();
    log.record(&command_line);
    tracing::debug!("{}", command_line);

    let mut builder = ProcessBuilder::new(&spec.program).args(&spec.args);
    for (key, value) in &spec.env {
        builder = builder.env(key, value);
    }

    let output = builder.exec()?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ToolOutput {
        code: output.status.code(),
        output: combined,
    })
}

/// Raise [`BuildError::ToolInvocationFailed`] for a failed invocation,
/// surfacing the captured output verbatim.
pub fn expect_success(spec: &CommandSpec, out: &ToolOutput) -> Result<()> {
    if out.success() {
        return Ok(());
    }
    Err(BuildError::ToolInvocationFailed {
        command: spec.display(),
        code: out.code,
        output: out.output.clone(),
    }
    .into())
}

/// One compile step: every stale source of a target, plus the inputs shared
/// by all of them.
#[derive(Debug)]
pub struct CompileBatch<'a> {
    pub target_name: &'a str,
    pub profile: Profile,
    pub output_dir: &'a Path,
    pub rebuilds: Vec<RebuildRecord>,
    pub include_dirs: &'a [PathBuf],
    pub defines: &'a [String],
}

/// A compile batch split by special-case handling. The precompiled header,
/// if present, must be processed before any other source so the mutated
/// compile template applies to the remainder; the resource source is
/// compiled by a dedicated tool.
#[derive(Debug)]
pub struct BatchPlan {
    pub precompiled_header: Option<RebuildRecord>,
    pub resource: Option<RebuildRecord>,
    pub rest: Vec<RebuildRecord>,
}

/// Split a rebuild list into the pch unit, the resource unit, and ordinary
/// translation units. At most one of each special kind is permitted per
/// batch.
pub fn partition_batch(rebuilds: Vec<RebuildRecord>) -> Result<BatchPlan> {
    let mut precompiled_header = None;
    let mut resource = None;
    let mut rest = Vec::new();

    for record in rebuilds {
        if record.source.is_precompiled_header() {
            if precompiled_header.is_some() {
                return Err(BuildError::MalformedPrecompiledHeaderSource {
                    reason: "found multiple precompiled header source files in one batch"
                        .to_string(),
                }
                .into());
            }
            precompiled_header = Some(record);
        } else if record.source.is_resource() {
            if resource.is_some() {
                // The underlying linkers accept only one resource object.
                return Err(BuildError::MultipleResourceSources.into());
            }
            resource = Some(record);
        } else {
            rest.push(record);
        }
    }

    Ok(BatchPlan {
        precompiled_header,
        resource,
        rest,
    })
}

/// Extract the single `#include` target from a precompiled-header source.
///
/// The scan is textual and assumes the source includes exactly one file;
/// zero or multiple includes is a hard error.
pub fn pch_include_target(source: &Path) -> Result<String> {
    let text = read_to_string(source)?;
    let pattern = Regex::new(r#"#include\s*[<"]([^>"]+)[>"]"#)
        .context("invalid include pattern")?;

    let mut includes = pattern.captures_iter(&text);
    let first = includes.next();
    let second = includes.next();

    match (first, second) {
        (Some(cap), None) => Ok(cap[1].to_string()),
        (None, _) => Err(BuildError::MalformedPrecompiledHeaderSource {
            reason: format!("no #include directive in {}", source.display()),
        }
        .into()),
        (Some(_), Some(_)) => Err(BuildError::MalformedPrecompiledHeaderSource {
            reason: format!(
                "more than one #include directive in {}",
                source.display()
            ),
        }
        .into()),
    }
}

/// Collect every non-empty object file under the target's object directory,
/// in a stable order.
pub fn nonempty_objects(object_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut objects = Vec::new();

    for entry in WalkDir::new(object_dir) {
        let entry = entry
            .with_context(|| format!("failed to walk: {}", object_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry
            .metadata()
            .with_context(|| format!("failed to stat: {}", entry.path().display()))?;
        if meta.len() > 0 {
            objects.push(entry.path().to_path_buf());
        }
    }

    objects.sort();
    Ok(objects)
}

/// The capability set every toolchain backend implements.
///
/// Backends are selected once at configuration time; there is no runtime
/// mutation of behavior beyond that selection.
pub trait Toolchain: fmt::Debug {
    /// Name of the platform the tools run on.
    fn host(&self) -> &'static str;

    /// Name of the platform family the tools target.
    fn target_family(&self) -> &'static str;

    /// Name of the target CPU architecture.
    fn target_arch(&self) -> &'static str;

    /// Object-code details for a source file extension (lower-case, without
    /// the leading dot). Unknown extensions are an error.
    fn object_details(&self, extension: &str) -> Result<ObjectDetails>;

    /// Convert a library name to its platform file name.
    fn library_file_name(&self, name: &str) -> String;

    /// Convert a target name to the link output file name for a module kind.
    fn module_file_name(&self, name: &str, kind: ModuleKind) -> String;

    /// Compile every source in the batch, strictly sequentially. Any
    /// non-zero tool exit aborts the whole step.
    fn compile(&self, batch: CompileBatch<'_>, log: &mut BuildLog) -> Result<()>;

    /// Archive the target's object files into a static library. Skipped
    /// when nothing was compiled and the archive already exists.
    fn link_static_lib(
        &self,
        target_name: &str,
        output_dir: &Path,
        profile: Profile,
        did_compile: bool,
        log: &mut BuildLog,
    ) -> Result<()>;

    /// Link the target's object files and libraries into a shared library
    /// or application. Skipped when nothing was compiled and the link
    /// freshness check finds the output current.
    #[allow(clippy::too_many_arguments)]
    fn link_module(
        &self,
        target_name: &str,
        output_dir: &Path,
        profile: Profile,
        did_compile: bool,
        kind: ModuleKind,
        lib_dirs: &[PathBuf],
        libs: &[String],
        log: &mut BuildLog,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::layout::SourceUnit;
    use tempfile::TempDir;

    fn record(path: &str) -> RebuildRecord {
        let source = SourceUnit::new(Path::new(path)).unwrap();
        RebuildRecord {
            object: PathBuf::from("/out/obj").join(format!("{}.o", source.base_name)),
            depfile: PathBuf::from("/out/dep").join(format!("{}.dep", source.base_name)),
            source,
        }
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!("debug".parse::<Profile>().unwrap(), Profile::Debug);
        assert_eq!("Release".parse::<Profile>().unwrap(), Profile::Release);
        assert_eq!("ship".parse::<Profile>().unwrap(), Profile::Ship);
        assert!("fast".parse::<Profile>().is_err());
    }

    #[test]
    fn test_partition_orders_specials_first() {
        let plan = partition_batch(vec![
            record("/src/a.cpp"),
            record("/src/precomp.cpp"),
            record("/src/app.rc"),
            record("/src/b.cpp"),
        ])
        .unwrap();

        assert_eq!(
            plan.precompiled_header.unwrap().source.base_name,
            "precomp"
        );
        assert_eq!(plan.resource.unwrap().source.base_name, "app");
        let rest: Vec<_> = plan.rest.iter().map(|r| r.source.base_name.clone()).collect();
        assert_eq!(rest, vec!["a", "b"]);
    }

    #[test]
    fn test_partition_rejects_multiple_pch_sources() {
        let err = partition_batch(vec![
            record("/src/precomp.cpp"),
            record("/x/Precomp.c"),
        ])
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MalformedPrecompiledHeaderSource { .. })
        ));
    }

    #[test]
    fn test_partition_rejects_multiple_resources() {
        let err = partition_batch(vec![record("/src/a.rc"), record("/src/b.rc")]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MultipleResourceSources)
        ));
    }

    #[test]
    fn test_pch_include_target_single() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("precomp.cpp");
        std::fs::write(&src, "// common headers\n#include \"precomp.h\"\n").unwrap();
        assert_eq!(pch_include_target(&src).unwrap(), "precomp.h");
    }

    #[test]
    fn test_pch_include_target_angle_brackets() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("precomp.cpp");
        std::fs::write(&src, "#include <common/all.h>\n").unwrap();
        assert_eq!(pch_include_target(&src).unwrap(), "common/all.h");
    }

    #[test]
    fn test_pch_include_target_zero_or_many_is_error() {
        let tmp = TempDir::new().unwrap();

        let empty = tmp.path().join("empty.cpp");
        std::fs::write(&empty, "int x;\n").unwrap();
        assert!(pch_include_target(&empty).is_err());

        let double = tmp.path().join("double.cpp");
        std::fs::write(&double, "#include \"a.h\"\n#include \"b.h\"\n").unwrap();
        assert!(pch_include_target(&double).is_err());
    }

    #[test]
    fn test_nonempty_objects_skips_zero_byte_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.o"), "code").unwrap();
        std::fs::write(tmp.path().join("precomp.o"), "").unwrap();
        std::fs::write(tmp.path().join("b.o"), "code").unwrap();

        let objects = nonempty_objects(tmp.path()).unwrap();
        let names: Vec<_> = objects
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.o", "b.o"]);
    }
}
