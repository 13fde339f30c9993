//! Shared helpers for unit tests.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::Result;

use crate::builder::depfile;
use crate::builder::errors::BuildError;
use crate::builder::linkcheck;
use crate::builder::log::BuildLog;
use crate::builder::toolchain::{CompileBatch, ModuleKind, ObjectDetails, Profile, Toolchain};

/// Rewrite a file's modification time without touching its contents.
pub fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .append(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// Write an executable shell script for standing in as a compiler or
/// linker in backend tests.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A scripted toolchain that fabricates artifacts instead of running
/// compilers, while honoring the same skip rules as the real backends.
/// Every invocation is recorded for assertions.
#[derive(Debug, Default)]
pub struct MockToolchain {
    /// Headers to record in the dependency list, keyed by source base name.
    pub deps: HashMap<String, Vec<PathBuf>>,
    pub compiled: Mutex<Vec<String>>,
    pub linked: Mutex<Vec<String>>,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deps(deps: HashMap<String, Vec<PathBuf>>) -> Self {
        MockToolchain {
            deps,
            ..Self::default()
        }
    }

    pub fn compiled_names(&self) -> Vec<String> {
        self.compiled.lock().unwrap().clone()
    }

    pub fn linked_names(&self) -> Vec<String> {
        self.linked.lock().unwrap().clone()
    }
}

impl Toolchain for MockToolchain {
    fn host(&self) -> &'static str {
        "Test"
    }

    fn target_family(&self) -> &'static str {
        "posix"
    }

    fn target_arch(&self) -> &'static str {
        "x64"
    }

    fn object_details(&self, extension: &str) -> Result<ObjectDetails> {
        match extension {
            "c" | "cpp" => Ok(ObjectDetails {
                extension: "o",
                needs_deps: true,
            }),
            "rc" => Ok(ObjectDetails {
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
        match kind {
            ModuleKind::SharedLib => format!("lib{}.so", name),
            ModuleKind::Application => name.to_string(),
        }
    }

    fn compile(&self, batch: CompileBatch<'_>, _log: &mut BuildLog) -> Result<()> {
        for record in &batch.rebuilds {
            self.compiled
                .lock()
                .unwrap()
                .push(record.source.file_name());

            std::fs::write(&record.object, "obj")?;
            if self.object_details(&record.source.extension)?.needs_deps {
                let headers = self
                    .deps
                    .get(&record.source.base_name)
                    .cloned()
                    .unwrap_or_default();
                depfile::write(&record.depfile, &headers)?;
            }
        }
        Ok(())
    }

    fn link_static_lib(
        &self,
        target_name: &str,
        output_dir: &Path,
        _profile: Profile,
        did_compile: bool,
        _log: &mut BuildLog,
    ) -> Result<()> {
        let lib_name = self.library_file_name(target_name);
        let lib_path = output_dir.join(&lib_name);
        if !did_compile && lib_path.is_file() {
            return Ok(());
        }
        std::fs::write(&lib_path, "ar")?;
        self.linked.lock().unwrap().push(lib_name);
        Ok(())
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
        _log: &mut BuildLog,
    ) -> Result<()> {
        let link_name = self.module_file_name(target_name, kind);
        let link_path = output_dir.join(&link_name);
        if !did_compile
            && !linkcheck::needs_relink(&link_path, lib_dirs, libs, |n| {
                self.library_file_name(n)
            })?
        {
            return Ok(());
        }
        std::fs::write(&link_path, "elf")?;
        self.linked.lock().unwrap().push(link_name);
        Ok(())
    }
}
