//! Path resolution (§4.1): turns a DT_NEEDED SONAME (or PT_INTERP string)
//! into a concrete file, honoring the reference loader's search-path
//! precedence and the sysroot/token-substitution machinery.

pub mod ldsoconf;
pub mod path;
pub mod sysroot;
pub mod tokens;

pub use path::resolve;
pub use sysroot::Sysroot;
