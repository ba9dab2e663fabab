//! `/etc/ld.so.conf` loading (§6): one directory per line, `#` comments and
//! blank lines ignored. This codebase's `/etc/ld.so.conf` carries no
//! `include` directive support — the original source this was distilled
//! from predates that glibc extension, so a bare directory list is all
//! that's modeled.

use crate::resolve::sysroot::Sysroot;
use std::path::PathBuf;

pub const DEFAULT_PATH: &str = "/etc/ld.so.conf";

/// Reads and parses `conf_path` (already sysroot-relative from the
/// caller's point of view). Missing file is not an error — just no extra
/// search directories.
pub fn load(conf_path: &str, sysroot: &Sysroot) -> Vec<PathBuf> {
    let host_path = sysroot.host_path(std::path::Path::new(conf_path));
    let Ok(contents) = std::fs::read_to_string(&host_path) else {
        return Vec::new();
    };
    parse(&contents)
}

fn parse(contents: &str) -> Vec<PathBuf> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = "/lib\n# a comment\n\n/usr/lib\n";
        assert_eq!(parse(text), vec![PathBuf::from("/lib"), PathBuf::from("/usr/lib")]);
    }
}
