//! Command-line surface, grounded in the `clap` derive idiom used by
//! `tools/gen-elf` in the teacher repository.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ldsim", about = "Simulate a Unix dynamic loader's dependency resolution and symbol binding")]
pub struct Args {
    /// ELF executables or shared objects to analyze.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Colon- or semicolon-separated list of directories prepended to the
    /// default library search sequence.
    #[arg(long = "library-path", value_name = "PATHS")]
    pub library_path: Option<String>,

    /// Sysroot prefix; all resolved paths are rooted here.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Treat positional and resolved NEEDED paths as already sysroot-relative.
    #[arg(long = "target-paths")]
    pub target_paths: bool,

    /// Colon-separated list of libraries synthetically prepended to the
    /// root executable's NEEDED list.
    #[arg(long = "ld-preload", value_name = "PATHS")]
    pub ld_preload: Option<String>,
}
