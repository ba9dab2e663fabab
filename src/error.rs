use std::borrow::Cow;
use std::fmt::Display;

/// Error types produced while simulating a run of the dynamic linker.
///
/// These mirror the error kinds a real `ld.so` can hit while resolving
/// dependencies and binding symbols, minus anything that would require
/// actually mapping or executing code.
#[derive(Debug)]
pub enum Error {
    /// A required shared object could not be located on the search path.
    ///
    /// Recorded per object; in `ldd` mode this becomes a `not found` line,
    /// fatal only when trace mode combines with `RTLD_WARN`.
    NotFound {
        /// A descriptive message naming the SONAME and referencing object.
        msg: Cow<'static, str>,
    },

    /// The ELF file is structurally broken: a missing required section,
    /// inconsistent sizes, or a truncated hash table.
    MalformedElf {
        /// A descriptive message about the malformed-ELF condition.
        msg: Cow<'static, str>,
    },

    /// A required symbol version was absent from a dependency's Verdef.
    VersionMismatch {
        /// A descriptive message naming the symbol and missing version.
        msg: Cow<'static, str>,
    },

    /// TLS layout was requested for a machine outside the known ABI table,
    /// and some loaded object actually carries a PT_TLS segment.
    UnsupportedArch {
        /// A descriptive message naming the offending machine.
        msg: Cow<'static, str>,
    },

    /// Invalid command-line arguments or configuration file contents.
    Config {
        /// A descriptive message about the configuration error.
        msg: Cow<'static, str>,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound { msg } => write!(f, "not found: {msg}"),
            Error::MalformedElf { msg } => write!(f, "malformed ELF: {msg}"),
            Error::VersionMismatch { msg } => write!(f, "version mismatch: {msg}"),
            Error::UnsupportedArch { msg } => write!(f, "unsupported architecture: {msg}"),
            Error::Config { msg } => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Creates a `NotFound` error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn not_found(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::NotFound { msg: msg.into() }
}

/// Creates a `MalformedElf` error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn malformed_elf(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::MalformedElf { msg: msg.into() }
}

/// Creates a `VersionMismatch` error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn version_mismatch(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::VersionMismatch { msg: msg.into() }
}

/// Creates an `UnsupportedArch` error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn unsupported_arch(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::UnsupportedArch { msg: msg.into() }
}

/// Creates a `Config` error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn config_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Config { msg: msg.into() }
}

pub type Result<T> = std::result::Result<T, Error>;
