//! Per-target build log.
//!
//! One append-only text file per build target, under the output directory,
//! recording every command line issued and human-readable status lines.
//! The log is the only scoped resource the build holds; dropping it closes
//! the file on every exit path, including error unwinds.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Scoped handle on the `<out>/<name>.log` file.
#[derive(Debug)]
pub struct BuildLog {
    file: File,
    path: PathBuf,
}

impl BuildLog {
    /// Create (truncating) the log for one build target.
    pub fn create(output_dir: &Path, target_name: &str) -> Result<Self> {
        let path = output_dir.join(format!("{}.log", target_name));
        let file = File::create(&path)
            .with_context(|| format!("failed to create build log: {}", path.display()))?;
        Ok(BuildLog { file, path })
    }

    /// Where the log lives on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a line in the log file only. Command lines go here.
    pub fn record(&mut self, line: &str) {
        // A failed log write must never fail the build.
        let _ = writeln!(self.file, "{}", line);
    }

    /// Record a status line and echo it to the console.
    pub fn status(&mut self, line: &str) {
        println!("{}", line);
        self.record(line);
    }

    /// Report an error to both console and log. The caller still raises it.
    pub fn error(&mut self, line: &str) {
        eprintln!("{}", line);
        self.record(line);
    }
}
