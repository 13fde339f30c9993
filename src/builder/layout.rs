//! Source units and the on-disk layout of build intermediates.
//!
//! Object files live under `<out>/<name>.intermediates/obj`, dependency
//! lists under `<out>/<name>.intermediates/dep`. Both directories are
//! created lazily and idempotently.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::util::fs::{absolutize, ensure_dir};

/// One source file to be compiled into one object file.
///
/// The path is absolute; base name and extension are split once so backends
/// never re-parse file names. The extension is stored lower-cased and
/// without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub base_name: String,
    pub extension: String,
}

impl SourceUnit {
    /// Create a source unit from a caller-supplied path.
    pub fn new(path: &Path) -> Result<Self> {
        let path = absolutize(path);

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            bail!("source path has no file name: {}", path.display());
        };
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            bail!("source path has no extension: {}", path.display());
        };

        Ok(SourceUnit {
            base_name: stem.to_string(),
            extension: ext.to_ascii_lowercase(),
            path,
        })
    }

    /// The file name portion of the source path, for status lines.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Whether this source follows the reserved precompiled-header naming
    /// convention.
    pub fn is_precompiled_header(&self) -> bool {
        self.base_name.eq_ignore_ascii_case("precomp")
    }

    /// Whether this source is a platform resource-description file.
    pub fn is_resource(&self) -> bool {
        self.extension == "rc"
    }
}

/// Deterministic mapping from a target name and output root to the
/// directories holding build intermediates.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    intermediates_dir: PathBuf,
    obj_dir: PathBuf,
    dep_dir: PathBuf,
}

impl ArtifactLayout {
    /// Compute the layout. No directories are created here.
    pub fn new(output_dir: &Path, target_name: &str) -> Self {
        let intermediates_dir = output_dir.join(format!("{}.intermediates", target_name));
        let obj_dir = intermediates_dir.join("obj");
        let dep_dir = intermediates_dir.join("dep");
        ArtifactLayout {
            intermediates_dir,
            obj_dir,
            dep_dir,
        }
    }

    /// Create the object and dependency directories if needed.
    pub fn ensure(&self) -> Result<()> {
        ensure_dir(&self.obj_dir)?;
        ensure_dir(&self.dep_dir)?;
        Ok(())
    }

    /// The `<out>/<name>.intermediates` directory.
    pub fn intermediates_dir(&self) -> &Path {
        &self.intermediates_dir
    }

    /// The directory holding object files.
    pub fn object_dir(&self) -> &Path {
        &self.obj_dir
    }

    /// The object file path for a source unit, given the backend's object
    /// extension (without the leading dot).
    pub fn object_path(&self, unit: &SourceUnit, object_extension: &str) -> PathBuf {
        self.obj_dir
            .join(format!("{}.{}", unit.base_name, object_extension))
    }

    /// The dependency list path for a source unit.
    pub fn depfile_path(&self, unit: &SourceUnit) -> PathBuf {
        self.dep_dir.join(format!("{}.dep", unit.base_name))
    }
}
