//! Dynamic string token substitution: `$ORIGIN`, `$PLATFORM`, `$LIB` and
//! their braced forms, per §4.1 and §9's "Dynamic string tokens" redesign
//! note.

use crate::machine::Machine;
use std::path::Path;

/// Repeatedly substitutes `$ORIGIN`/`${ORIGIN}`, `$PLATFORM`/`${PLATFORM}`,
/// and `$LIB`/`${LIB}` in `input` until no token remains or a fixed-point
/// is reached (guards against a token expanding to itself).
pub fn expand(input: &str, origin: &Path, machine: Machine) -> String {
    let lib = machine.lib_token();
    let origin_str = origin.to_string_lossy();
    let mut s = input.to_string();
    loop {
        let next = substitute_once(&s, &origin_str, "", lib);
        if next == s {
            return next;
        }
        s = next;
    }
}

fn substitute_once(s: &str, origin: &str, platform: &str, lib: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            if let Some((name, consumed)) = token_at(&s[i..]) {
                let replacement = match name {
                    "ORIGIN" => origin,
                    "PLATFORM" => platform,
                    "LIB" => lib,
                    _ => {
                        out.push_str(&s[i..i + consumed]);
                        i += consumed;
                        continue;
                    }
                };
                out.push_str(replacement);
                i += consumed;
                continue;
            }
        }
        // Push one UTF-8 scalar's worth of bytes; paths are treated as
        // opaque byte sequences in the original loader, but search-path
        // strings in practice are ASCII, so char-at-a-time is adequate.
        let ch_len = s[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&s[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Recognizes `$NAME` or `${NAME}` starting at `s[0] == '$'`. Returns the
/// token name and the number of bytes it consumes.
fn token_at(s: &str) -> Option<(&str, usize)> {
    debug_assert!(s.starts_with('$'));
    if let Some(rest) = s.strip_prefix("${") {
        let end = rest.find('}')?;
        Some((&rest[..end], end + 3))
    } else {
        let rest = &s[1..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if end == 0 {
            None
        } else {
            Some((&rest[..end], end + 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn expands_origin_and_lib() {
        let origin = PathBuf::from("/opt/app/bin");
        let out = expand("$ORIGIN/../lib:${LIB}/extra", &origin, Machine::X86_64);
        assert_eq!(out, "/opt/app/bin/../lib:lib64/extra");
    }

    #[test]
    fn platform_expands_empty() {
        let origin = PathBuf::from("/x");
        let out = expand("$PLATFORM-stuff", &origin, Machine::I386);
        assert_eq!(out, "-stuff");
    }

    #[test]
    fn unknown_token_left_untouched() {
        let origin = PathBuf::from("/x");
        let out = expand("$NOTATOKEN/lib", &origin, Machine::I386);
        assert_eq!(out, "$NOTATOKEN/lib");
    }
}
