//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Caravel - an incremental build driver for C and C++
#[derive(Parser)]
#[command(name = "caravel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a static library
    StaticLib(TargetArgs),

    /// Build a shared library
    SharedLib(LinkArgs),

    /// Build a console application
    App(LinkArgs),
}

#[derive(Args)]
pub struct TargetArgs {
    /// Target name; output file names derive from it
    pub name: String,

    /// Source files or glob patterns (e.g. src/**/*.cpp)
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Output directory
    #[arg(short, long, default_value = "build")]
    pub out_dir: PathBuf,

    /// Build profile: debug, release, or ship
    #[arg(short, long, default_value = "debug")]
    pub profile: String,

    /// Toolchain to use (e.g. gcc-x86, msvc-x64); auto-detected by default
    #[arg(short, long)]
    pub toolchain: Option<String>,

    /// Add an include search directory
    #[arg(short = 'I', long = "include")]
    pub include_dirs: Vec<PathBuf>,

    /// Add a preprocessor define
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,
}

#[derive(Args)]
pub struct LinkArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Add a library search directory
    #[arg(short = 'L', long = "lib-dir")]
    pub lib_dirs: Vec<PathBuf>,

    /// Link against a library
    #[arg(short = 'l', long = "lib")]
    pub libs: Vec<String>,
}
