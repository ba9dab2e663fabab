//! Symbol hash-table abstraction: dispatches to whichever of GNU-hash or
//! SysV-hash an object actually carries, per the enum-dispatch pattern in
//! the teacher's `src/hash/mod.rs`.

pub mod gnu;
pub mod sysv;

pub use gnu::{BloomWidth, GnuHash};
pub use sysv::SysvHash;

/// Either hash-table format an object may carry. An object lacking both
/// (a relocatable `.o`, or a malformed DSO) has no `HashTable`; the lookup
/// engine then falls back to a linear symbol-table scan.
#[derive(Debug, Clone)]
pub enum HashTable {
    Gnu(GnuHash),
    Sysv(SysvHash),
}

impl HashTable {
    pub fn count_syms(&self) -> usize {
        match self {
            HashTable::Gnu(h) => h.count_syms(),
            HashTable::Sysv(h) => h.count_syms(),
        }
    }

    /// Looks up `name`'s dynsym index set via this table's native hash,
    /// calling `matcher` with each hash-colliding candidate index and
    /// stopping at the first accepted candidate.
    pub fn lookup<T>(
        &self,
        name: &[u8],
        matcher: impl FnMut(usize) -> Option<T>,
    ) -> Option<T> {
        match self {
            HashTable::Gnu(h) => {
                let hash = GnuHash::hash(name);
                if h.bloom_miss(hash) {
                    return None;
                }
                h.lookup(hash, matcher)
            }
            HashTable::Sysv(h) => {
                let hash = SysvHash::hash(name);
                h.lookup(hash, matcher)
            }
        }
    }
}
