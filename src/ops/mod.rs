//! High-level build operations, one per link output kind.

pub mod build;

pub use build::{build_application, build_shared_lib, build_static_lib, BuildRequest, LinkRequest};
