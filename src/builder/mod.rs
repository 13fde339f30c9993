//! Incremental build machinery.
//!
//! The submodules split the build into small, separately testable pieces:
//! source/artifact layout, dependency-list persistence, the rebuild
//! decision engine, the link freshness check, the per-target build log,
//! and the toolchain backends that turn all of it into command lines.

pub mod depfile;
pub mod errors;
pub mod layout;
pub mod linkcheck;
pub mod log;
pub mod rebuild;
pub mod toolchain;

pub use errors::BuildError;
pub use layout::{ArtifactLayout, SourceUnit};
pub use log::BuildLog;
pub use rebuild::{plan_rebuilds, Freshness, RebuildRecord};
pub use toolchain::{
    detect_host_toolchain, detect_named_toolchain, ModuleKind, Profile, Toolchain,
};
