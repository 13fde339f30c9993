//! GCC-family toolchain backend.
//!
//! Covers native Linux gcc/g++ (x86 and x64) and MinGW targeting Windows.
//! Dependency lists come from the compiler itself via `-MD`/`-MF`; the raw
//! Makefile fragment is rewritten into the normalized depfile format after
//! every successful compile.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::depfile;
use crate::builder::errors::BuildError;
use crate::builder::layout::ArtifactLayout;
use crate::builder::linkcheck;
use crate::builder::log::BuildLog;
use crate::builder::rebuild::RebuildRecord;
use crate::util::fs::{ensure_dir, read_to_string, touch};

use super::{
    expect_success, nonempty_objects, partition_batch, pch_include_target, run_tool,
    CommandSpec, CompileBatch, ModuleKind, ObjectDetails, Profile, Toolchain,
};

/// Target platform/architecture variants served by the GCC family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GccTarget {
    LinuxX86,
    LinuxX64,
    MingwX86,
}

/// Resolved tool paths and built-in search paths for a GCC installation.
/// Constructed once at detection time, never mutated.
#[derive(Debug, Clone)]
pub struct GccTools {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
    pub strip: PathBuf,
    /// Resource compiler; present only for MinGW installations.
    pub windres: Option<PathBuf>,
    pub builtin_include_dirs: Vec<PathBuf>,
    pub builtin_lib_dirs: Vec<PathBuf>,
}

/// GCC-family toolchain.
#[derive(Debug, Clone)]
pub struct GccToolchain {
    tools: GccTools,
    target: GccTarget,
}

impl GccToolchain {
    pub fn new(tools: GccTools, target: GccTarget) -> Self {
        GccToolchain { tools, target }
    }

    pub fn target(&self) -> GccTarget {
        self.target
    }

    fn target_compile_flags(&self) -> Vec<&'static str> {
        match self.target {
            GccTarget::LinuxX86 => {
                vec!["-m32", "-march=core2", "-msse2", "-msse3", "-mfpmath=sse", "-fpic"]
            }
            GccTarget::LinuxX64 => {
                vec!["-m64", "-mtune=generic", "-msse2", "-msse3", "-mfpmath=sse", "-fpic"]
            }
            GccTarget::MingwX86 => vec![
                "-march=core2",
                "-msse2",
                "-msse3",
                "-mfpmath=sse",
                "-D__MSVCRT_VERSION__=0x0700",
            ],
        }
    }

    fn target_link_flags(&self, kind: ModuleKind) -> Vec<&'static str> {
        match self.target {
            GccTarget::LinuxX86 => match kind {
                ModuleKind::SharedLib => vec!["-m32", "-shared"],
                ModuleKind::Application => vec!["-m32"],
            },
            GccTarget::LinuxX64 => match kind {
                ModuleKind::SharedLib => vec!["-m64", "-shared"],
                ModuleKind::Application => vec!["-m64"],
            },
            GccTarget::MingwX86 => {
                // ASLR and DEP for all Windows images.
                let mut flags = vec!["-Wl,--dynamicbase", "-Wl,--nxcompat"];
                match kind {
                    ModuleKind::SharedLib => flags.extend(["-shared", "-Wl,--dll"]),
                    ModuleKind::Application => flags.push("-Wl,--subsystem=console"),
                }
                flags
            }
        }
    }

    /// The compiler arguments shared by every translation unit in a batch.
    fn compile_template(
        &self,
        profile: Profile,
        include_dirs: &[PathBuf],
        defines: &[String],
    ) -> Vec<String> {
        let mut flags: Vec<String> = vec![
            "-c".to_string(),
            "-Werror".to_string(),
            "-Wall".to_string(),
            "-Wno-long-long".to_string(),
            "-g".to_string(),
        ];
        flags.extend(self.target_compile_flags().iter().map(|f| f.to_string()));

        if profile.is_debug() {
            flags.push("-O0".to_string());
        } else {
            flags.push("-Ofast".to_string());
        }

        for define in defines {
            flags.push(format!("-D{}", define));
        }
        for dir in include_dirs {
            flags.push(format!("-I{}", dir.display()));
        }
        for dir in &self.tools.builtin_include_dirs {
            flags.push(format!("-I{}", dir.display()));
        }

        flags
    }

    /// Pick the driver and language-standard flag for a source extension.
    fn driver(&self, extension: &str) -> Result<(&Path, &'static str)> {
        match extension {
            "c" => Ok((&self.tools.cc, "-std=gnu89")),
            "cpp" => Ok((&self.tools.cxx, "-std=gnu++0x")),
            other => Err(BuildError::UnsupportedSourceExtension {
                extension: other.to_string(),
            }
            .into()),
        }
    }

    /// Compile one translation unit into `object`, then rewrite its raw
    /// `-MD` fragment into the normalized dependency list.
    fn compile_unit(
        &self,
        record: &RebuildRecord,
        template: &[String],
        object: &Path,
        log: &mut BuildLog,
    ) -> Result<()> {
        let (driver, std_flag) = self.driver(&record.source.extension)?;
        let dep_tmp = temp_depfile(&record.depfile);

        let spec = CommandSpec::new(driver)
            .arg(std_flag)
            .args(template.iter().cloned())
            .arg("-o")
            .arg(object.display().to_string())
            .arg("-MD")
            .arg("-MF")
            .arg(dep_tmp.display().to_string())
            .arg(record.source.path.display().to_string());

        let out = run_tool(&spec, log)?;
        expect_success(&spec, &out)?;

        let fragment = read_to_string(&dep_tmp)?;
        let headers = depfile::parse_gcc_fragment(&fragment)?;
        depfile::write(&record.depfile, &headers)?;
        let _ = std::fs::remove_file(&dep_tmp);

        Ok(())
    }

    /// Build the precompiled header and mutate the template so subsequent
    /// units in the batch compile against it.
    fn compile_pch(
        &self,
        record: &RebuildRecord,
        template: &mut Vec<String>,
        batch: &CompileBatch<'_>,
        log: &mut BuildLog,
    ) -> Result<()> {
        let header = pch_include_target(&record.source.path)?;

        let gch_dir = ArtifactLayout::new(batch.output_dir, batch.target_name)
            .intermediates_dir()
            .join("gch");
        // GCC picks up `<header>.gch` wherever it would find the header
        // itself, so mirror the include target's relative path.
        let binary = gch_dir.join(format!("{}.gch", header));
        if let Some(parent) = binary.parent() {
            ensure_dir(parent)?;
        }

        log.status("building precompiled header");
        self.compile_unit(record, template, &binary, log)?;

        // GCC emits no object for a precompiled header; touch a zero-byte
        // one so the rebuild engine still has a timestamp to compare.
        touch(&record.object)?;

        template.push(format!("-I{}", gch_dir.display()));
        Ok(())
    }

    /// Compile a Windows resource script with windres.
    fn compile_resource(
        &self,
        record: &RebuildRecord,
        batch: &CompileBatch<'_>,
        log: &mut BuildLog,
    ) -> Result<()> {
        let Some(windres) = &self.tools.windres else {
            return Err(BuildError::UnsupportedSourceExtension {
                extension: record.source.extension.clone(),
            }
            .into());
        };

        let mut spec = CommandSpec::new(windres);
        for define in batch.defines {
            spec = spec.arg(format!("-D{}", define));
        }
        for dir in batch.include_dirs {
            spec = spec.arg(format!("-I{}", dir.display()));
        }
        for dir in &self.tools.builtin_include_dirs {
            spec = spec.arg(format!("-I{}", dir.display()));
        }
        spec = spec
            .arg("-o")
            .arg(record.object.display().to_string())
            .arg("-i")
            .arg(record.source.path.display().to_string());

        log.status(&format!("resource compile {}", record.source.file_name()));
        let out = run_tool(&spec, log)?;
        expect_success(&spec, &out)
    }
}

/// Side file the compiler writes the raw dependency fragment into.
fn temp_depfile(dep: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", dep.display()))
}

impl Toolchain for GccToolchain {
    fn host(&self) -> &'static str {
        match self.target {
            GccTarget::MingwX86 => "Windows",
            _ => "Linux",
        }
    }

    fn target_family(&self) -> &'static str {
        match self.target {
            GccTarget::MingwX86 => "windows",
            _ => "posix",
        }
    }

    fn target_arch(&self) -> &'static str {
        match self.target {
            GccTarget::LinuxX64 => "x64",
            _ => "x86",
        }
    }

    fn object_details(&self, extension: &str) -> Result<ObjectDetails> {
        match extension {
            "c" | "cpp" => Ok(ObjectDetails {
                extension: "o",
                needs_deps: true,
            }),
            "rc" if self.target == GccTarget::MingwX86 => Ok(ObjectDetails {
                extension: "o",
                needs_deps: false,
            }),
            other => Err(BuildError::UnsupportedSourceExtension {
                extension: other.to_string(),
            }
            .into()),
        }
    }

    fn library_file_name(&self, name: &str) -> String {
        format!("lib{}.a", name)
    }

    fn module_file_name(&self, name: &str, kind: ModuleKind) -> String {
        match (self.target, kind) {
            (GccTarget::MingwX86, ModuleKind::SharedLib) => format!("lib{}.dll", name),
            (GccTarget::MingwX86, ModuleKind::Application) => format!("{}.exe", name),
            (_, ModuleKind::SharedLib) => format!("lib{}.so", name),
            (_, ModuleKind::Application) => name.to_string(),
        }
    }

    fn compile(&self, mut batch: CompileBatch<'_>, log: &mut BuildLog) -> Result<()> {
        let mut template =
            self.compile_template(batch.profile, batch.include_dirs, batch.defines);
        let plan = partition_batch(std::mem::take(&mut batch.rebuilds))?;

        if let Some(resource) = &plan.resource {
            self.compile_resource(resource, &batch, log)?;
        }

        if let Some(pch) = &plan.precompiled_header {
            self.compile_pch(pch, &mut template, &batch, log)?;
        }

        for record in &plan.rest {
            log.status(&format!("compiling {}", record.source.file_name()));
            self.compile_unit(record, &template, &record.object, log)?;
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

        // r = replace or insert, c = create quietly, s = write an index
        let mut spec = CommandSpec::new(&self.tools.ar)
            .arg("-rcs")
            .arg(lib_path.display().to_string());
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
        _profile: Profile,
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

        // g++ drives the link so the C++ runtime is pulled in.
        let mut spec = CommandSpec::new(&self.tools.cxx);
        spec = spec.args(self.target_link_flags(kind).iter().map(|f| f.to_string()));
        for dir in &search_dirs {
            spec = spec.arg(format!("-L{}", dir.display()));
        }
        spec = spec.arg("-o").arg(link_path.display().to_string());
        for object in nonempty_objects(layout.object_dir())? {
            spec = spec.arg(object.display().to_string());
        }
        for lib in libs {
            spec = spec.arg(format!("-l{}", lib));
        }

        log.status(&format!("linking {}", link_name));
        let out = run_tool(&spec, log)?;
        expect_success(&spec, &out)?;

        // Best-effort stripped sibling; a strip failure never fails the build.
        let stem = link_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(target_name);
        let stripped_name = match link_path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}_stripped.{}", stem, ext),
            None => format!("{}_stripped", stem),
        };
        let strip_spec = CommandSpec::new(&self.tools.strip)
            .arg("-o")
            .arg(output_dir.join(stripped_name).display().to_string())
            .arg(link_path.display().to_string());
        match run_tool(&strip_spec, log) {
            Ok(out) if out.success() => {}
            _ => log.record("note: strip step failed; keeping unstripped output only"),
        }

        Ok(())
    }
}
