//! Build error types.

use std::path::PathBuf;

use thiserror::Error;

/// Error during compilation or linking.
///
/// `MissingDependencyList` is the only recoverable variant: callers treat it
/// as "must rebuild" and never surface it to the user. Everything else aborts
/// the current build workflow.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("dependency list not found: {path}")]
    MissingDependencyList { path: PathBuf },

    #[error("`{command}` failed with exit code {code:?}\n{output}")]
    ToolInvocationFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("could not locate library `{name}` in any library search path")]
    UnresolvableLibrary { name: String },

    #[error("invalid precompiled header source: {reason}")]
    MalformedPrecompiledHeaderSource { reason: String },

    #[error("found multiple resource source files in one compile batch")]
    MultipleResourceSources,

    #[error("unsupported source extension `.{extension}`")]
    UnsupportedSourceExtension { extension: String },
}

impl BuildError {
    /// Whether the error signals a stale input rather than a real failure.
    pub fn is_stale_input(&self) -> bool {
        matches!(self, BuildError::MissingDependencyList { .. })
    }
}
