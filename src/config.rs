//! Run configuration: the explicit context object threaded through every
//! component in place of the reference loader's global error sinks and
//! debug-mask globals.

use bitflags::bitflags;
use std::path::PathBuf;

bitflags! {
    /// `RTLD_DEBUG` channels. Matches the real loader's `files, symbols,
    /// versions, bindings, scopes, all` set; nothing beyond it is modeled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugMask: u32 {
        const FILES    = 1 << 0;
        const SYMBOLS  = 1 << 1;
        const VERSIONS = 1 << 2;
        const BINDINGS = 1 << 3;
        const SCOPES   = 1 << 4;
    }
}

impl DebugMask {
    pub fn parse(spec: &str) -> Self {
        let mut mask = DebugMask::empty();
        for tok in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match tok {
                "files" => mask |= DebugMask::FILES,
                "symbols" => mask |= DebugMask::SYMBOLS,
                "versions" => mask |= DebugMask::VERSIONS,
                "bindings" => mask |= DebugMask::BINDINGS,
                "scopes" => mask |= DebugMask::SCOPES,
                "all" => mask = DebugMask::all(),
                _ => log::warn!("unknown RTLD_DEBUG channel: {tok}"),
            }
        }
        mask
    }
}

/// Explicit configuration context, replacing the reference loader's
/// `dso_open_error`/`_dl_debug_mask` process globals (§9 "Global error
/// sinks").
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Sysroot prefix for the VFS wrapper; `None` means calls pass through.
    pub sysroot: Option<PathBuf>,
    /// `--library-path` / `LD_LIBRARY_PATH`-equivalent search directories,
    /// prepended ahead of the default search sequence.
    pub library_paths: Vec<PathBuf>,
    /// Treat positional and resolved NEEDED paths as already sysroot-relative.
    pub target_paths: bool,
    /// `--ld-preload`: SONAMEs synthetically prepended to the root's NEEDED list.
    pub ld_preload: Vec<String>,
    /// `RTLD_DEBUG` channel set.
    pub debug_mask: DebugMask,
    /// `LD_DYNAMIC_WEAK=1`: first weak binding wins instead of the last.
    pub dynamic_weak: bool,
    /// In trace mode, promote a missing-library error to fatal.
    pub ld_warn: bool,
    /// `RTLD_TRACE_PRELINKING=<name>`: enables trace mode, restricting the
    /// lookup/conflict-line filter to the object named here.
    pub trace_prelinking: Option<String>,
}

impl Config {
    /// Builds configuration from parsed CLI arguments, then layers in
    /// environment variables and `/etc/ld.so.conf` for anything the CLI left
    /// unset. CLI > environment > defaults.
    pub fn from_env_and_args(args: &crate::cli::Args) -> crate::error::Result<Self> {
        let sysroot = args
            .root
            .clone()
            .or_else(|| std::env::var_os("PRELINK_SYSROOT").map(PathBuf::from));

        let library_paths = args
            .library_path
            .as_deref()
            .map(split_path_list)
            .unwrap_or_default();

        let trace_prelinking = std::env::var("RTLD_TRACE_PRELINKING").ok();
        let ld_warn = std::env::var_os("RTLD_WARN").is_some();
        let dynamic_weak = std::env::var("LD_DYNAMIC_WEAK").as_deref() == Ok("1");
        let debug_mask = std::env::var("RTLD_DEBUG")
            .map(|v| DebugMask::parse(&v))
            .unwrap_or_else(|_| DebugMask::empty());

        let ld_preload = args
            .ld_preload
            .as_deref()
            .map(|s| s.split(':').map(String::from).collect())
            .unwrap_or_default();

        Ok(Config {
            sysroot,
            library_paths,
            target_paths: args.target_paths,
            ld_preload,
            debug_mask,
            dynamic_weak,
            ld_warn,
            trace_prelinking,
        })
    }
}

fn split_path_list(s: &str) -> Vec<PathBuf> {
    let sep = if s.contains(';') { ';' } else { ':' };
    s.split(sep).filter(|p| !p.is_empty()).map(PathBuf::from).collect()
}
