//! Visual C++ toolchain backend.
//!
//! Drives cl.exe, link.exe, lib.exe, and rc.exe. Header dependencies come
//! from cl's `/showIncludes` listing, which is interleaved with ordinary
//! compiler output on stdout; every compile demultiplexes the stream into
//! diagnostic text and a header list before deciding success.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::depfile;
use crate::builder::errors::BuildError;
use crate::builder::layout::ArtifactLayout;
use crate::builder::linkcheck;
use crate::builder::log::BuildLog;
use crate::builder::rebuild::RebuildRecord;

use super::{
    expect_success, nonempty_objects, partition_batch, pch_include_target, run_tool,
    CommandSpec, CompileBatch, ModuleKind, ObjectDetails, Profile, Toolchain,
};

/// Target architectures served by Visual C++.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsvcArch {
    X86,
    X64,
}

/// Resolved tool paths, built-in search paths, and the environment the
/// tools need (cl.exe loads DLLs from directories that must be on PATH).
#[derive(Debug, Clone)]
pub struct MsvcTools {
    pub cl: PathBuf,
    pub link: PathBuf,
    pub lib: PathBuf,
    pub rc: PathBuf,
    pub builtin_include_dirs: Vec<PathBuf>,
    pub builtin_lib_dirs: Vec<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Visual C++ toolchain.
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    tools: MsvcTools,
    arch: MsvcArch,
}

impl MsvcToolchain {
    pub fn new(tools: MsvcTools, arch: MsvcArch) -> Self {
        MsvcToolchain { tools, arch }
    }

    pub fn arch(&self) -> MsvcArch {
        self.arch
    }

    /// Start a command with the toolchain environment applied.
    fn command(&self, program: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(program);
        for (key, value) in &self.tools.env {
            spec = spec.env(key.clone(), value.clone());
        }
        spec
    }

    /// The cl.exe arguments shared by every translation unit in a batch.
    fn compile_template(&self, batch: &CompileBatch<'_>) -> Vec<String> {
        // /X drops the inherited include environment; every include path is
        // passed explicitly so builds do not depend on the caller's shell.
        let mut flags: Vec<String> = [
            "/nologo", "/c", "/W4", "/WX", "/Zi", "/EHsc", "/fp:fast", "/showIncludes",
            "/TP", "/X",
        ]
        .iter()
        .map(|f| f.to_string())
        .collect();

        if self.arch == MsvcArch::X86 {
            flags.push("/arch:SSE2".to_string());
        }

        if batch.profile.is_debug() {
            flags.extend(["/Od", "/MTd", "/RTCscu"].iter().map(|f| f.to_string()));
        } else {
            flags.extend(["/MT", "/GL", "/O1", "/GS-"].iter().map(|f| f.to_string()));
        }

        for define in batch.defines {
            flags.push(format!("/D{}", define));
        }
        for dir in batch.include_dirs {
            flags.push(format!("/I{}", dir.display()));
        }
        for dir in &self.tools.builtin_include_dirs {
            flags.push(format!("/I{}", dir.display()));
        }

        flags.push(format!(
            "/Fd{}",
            batch
                .output_dir
                .join(format!("{}.pdb", batch.target_name))
                .display()
        ));

        flags
    }

    /// Run cl.exe on one unit, demultiplex `/showIncludes`, and write the
    /// dependency list on success.
    fn compile_unit(
        &self,
        record: &RebuildRecord,
        template: &[String],
        extra: &[String],
        log: &mut BuildLog,
    ) -> Result<()> {
        let spec = self
            .command(&self.tools.cl)
            .args(template.iter().cloned())
            .args(extra.iter().cloned())
            .arg(format!("/Fo{}", record.object.display()))
            .arg(record.source.path.display().to_string());

        let out = run_tool(&spec, log)?;
        let (text, headers) = depfile::split_cl_output(&out.output);
        if !text.trim().is_empty() {
            log.record(&text);
        }

        if !out.success() {
            // Surface the diagnostics, not the thousands of include notes.
            return Err(BuildError::ToolInvocationFailed {
                command: spec.display(),
                code: out.code,
                output: text,
            }
            .into());
        }

        depfile::write(&record.depfile, &headers)
    }

    /// Create the precompiled header and mutate the template so subsequent
    /// units in the batch consume it.
    fn compile_pch(
        &self,
        record: &RebuildRecord,
        template: &mut Vec<String>,
        batch: &CompileBatch<'_>,
        log: &mut BuildLog,
    ) -> Result<()> {
        let header = pch_include_target(&record.source.path)?;

        let binary = ArtifactLayout::new(batch.output_dir, batch.target_name)
            .intermediates_dir()
            .join(format!("{}.pch", record.source.base_name));

        log.status("building precompiled header");
        let create = vec![
            format!("/Yc{}", header),
            format!("/Fp{}", binary.display()),
        ];
        self.compile_unit(record, template, &create, log)?;

        template.push(format!("/Yu{}", header));
        template.push(format!("/Fp{}", binary.display()));
        Ok(())
    }

    /// Compile a resource script with rc.exe. rc has no `/showIncludes`;
    /// its output is checked raw.
    fn compile_resource(
        &self,
        record: &RebuildRecord,
        batch: &CompileBatch<'_>,
        log: &mut BuildLog,
    ) -> Result<()> {
        let mut spec = self.command(&self.tools.rc).arg("/nologo").arg("/X");
        for define in batch.defines {
            spec = spec.arg(format!("/D{}", define));
        }
        for dir in batch.include_dirs {
            spec = spec.arg(format!("/I{}", dir.display()));
        }
        for dir in &self.tools.builtin_include_dirs {
            spec = spec.arg(format!("/I{}", dir.display()));
        }
        spec = spec
            .arg(format!("/fo{}", record.object.display()))
            .arg(record.source.path.display().to_string());

        log.status(&format!("resource compile {}", record.source.file_name()));
        let out = run_tool(&spec, log)?;
        expect_success(&spec, &out)
    }

    fn machine_flag(&self) -> &'static str {
        match self.arch {
            MsvcArch::X86 => "/MACHINE:X86",
            MsvcArch::X64 => "/MACHINE:X64",
        }
    }

    /// Static runtime libraries matching the /MT or /MTd choice made at
    /// compile time.
    fn runtime_libs(&self, profile: Profile) -> [&'static str; 2] {
        if profile.is_debug() {
            ["libcpmtd.lib", "libcmtd.lib"]
        } else {
            ["libcpmt.lib", "libcmt.lib"]
        }
    }
}

impl Toolchain for MsvcToolchain {
    fn host(&self) -> &'static str {
        "Windows"
    }

    fn target_family(&self) -> &'static str {
        "windows"
    }

    fn target_arch(&self) -> &'static str {
        match self.arch {
            MsvcArch::X86 => "x86",
            MsvcArch::X64 => "x64",
        }
    }

    fn object_details(&self, extension: &str) -> Result<ObjectDetails> {
        match extension {
            "c" | "cpp" => Ok(ObjectDetails {
                extension: "obj",
                needs_deps: true,
            }),
            "rc" => Ok(ObjectDetails {
                extension: "res",
                needs_deps: false,
            }),
            other => Err(BuildError::UnsupportedSourceExtension {
                extension: other.to_string(),
            }
            .into()),
        }
    }

    fn library_file_name(&self, name: &str) -> String {
        format!("{}.lib", name)
    }

    fn module_file_name(&self, name: &str, kind: ModuleKind) -> String {
        match kind {
            ModuleKind::SharedLib => format!("{}.dll", name),
            ModuleKind::Application => format!("{}.exe", name),
        }
    }

    fn compile(&self, mut batch: CompileBatch<'_>, log: &mut BuildLog) -> Result<()> {
        let mut template = self.compile_template(&batch);
        let plan = partition_batch(std::mem::take(&mut batch.rebuilds))?;

        if let Some(resource) = &plan.resource {
            self.compile_resource(resource, &batch, log)?;
        }

        if let Some(pch) = &plan.precompiled_header {
            self.compile_pch(pch, &mut template, &batch, log)?;
        }

        for record in &plan.rest {
            log.status(&format!("compiling {}", record.source.file_name()));
            self.compile_unit(record, &template, &[], log)?;
        }

        Ok(())
    }

    fn link_static_lib(
        &self,
        target_name: &str,
        output_dir: &Path,
        _profile: Profile,
        did_compile: bool,
        log: &mut BuildLog,
    ) -> Result<()> {
        let lib_name = self.library_file_name(target_name);
        let lib_path = output_dir.join(&lib_name);

        if !did_compile && lib_path.is_file() {
            log.status(&format!("{} is up to date", lib_name));
            return Ok(());
        }

        let layout = ArtifactLayout::new(output_dir, target_name);

        let mut spec = self
            .command(&self.tools.lib)
            .arg("/nologo")
            .arg(format!("/OUT:{}", lib_path.display()));
        for object in nonempty_objects(layout.object_dir())? {
            spec = spec.arg(object.display().to_string());
        }

        log.status(&format!("linking {}", lib_name));
        let out = run_tool(&spec, log)?;
        expect_success(&spec, &out)
    }

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
    ) -> Result<()> {
        let link_name = self.module_file_name(target_name, kind);
        let link_path = output_dir.join(&link_name);

        let mut search_dirs = lib_dirs.to_vec();
        search_dirs.extend(self.tools.builtin_lib_dirs.iter().cloned());

        if !did_compile
            && !linkcheck::needs_relink(&link_path, &search_dirs, libs, |n| {
                self.library_file_name(n)
            })?
        {
            log.status(&format!("{} is up to date", link_name));
            return Ok(());
        }

        let layout = ArtifactLayout::new(output_dir, target_name);

        let mut spec = self
            .command(&self.tools.link)
            .args(
                [
                    "/NOLOGO",
                    "/WX",
                    "/INCREMENTAL:NO",
                    "/MAP",
                    "/DEBUG",
                    "/NODEFAULTLIB",
                    "/SWAPRUN:NET",
                    "/SWAPRUN:CD",
                    "/DYNAMICBASE",
                    "/NXCOMPAT",
                    "/MANIFEST",
                ]
                .iter()
                .map(|f| f.to_string()),
            )
            .arg(self.machine_flag());

        match kind {
            ModuleKind::SharedLib => spec = spec.arg("/DLL"),
            ModuleKind::Application => spec = spec.arg("/SUBSYSTEM:CONSOLE"),
        }

        if !profile.is_debug() {
            // Fold identical functions and drop unreferenced sections; /GL
            // objects require /LTCG here.
            spec = spec.args(["/OPT:REF", "/OPT:ICF", "/LTCG"].iter().map(|f| f.to_string()));
        }
        if profile == Profile::Ship {
            spec = spec.arg("/RELEASE");
        }

        for dir in &search_dirs {
            spec = spec.arg(format!("/LIBPATH:{}", dir.display()));
        }
        spec = spec.arg(format!("/OUT:{}", link_path.display()));
        for object in nonempty_objects(layout.object_dir())? {
            spec = spec.arg(object.display().to_string());
        }
        for lib in libs {
            spec = spec.arg(self.library_file_name(lib));
        }
        for runtime in self.runtime_libs(profile) {
            spec = spec.arg(runtime);
        }

        log.status(&format!("linking {}", link_name));
        let out = run_tool(&spec, log)?;
        expect_success(&spec, &out)
    }
}
