//! Incremental build driver for C and C++ projects.
//!
//! Orchestrates compilation and linking over GCC-family and Visual C++
//! toolchains, recompiling only sources whose object files are out of date
//! with respect to the source itself or any header it includes. Header
//! dependencies are captured from the compiler during every compile and
//! persisted as per-source dependency lists next to the objects.

pub mod builder;
pub mod ops;
pub mod util;

#[cfg(test)]
pub mod test_support;

pub use builder::{detect_host_toolchain, BuildError, Profile, Toolchain};
pub use ops::{build_application, build_shared_lib, build_static_lib, BuildRequest, LinkRequest};
