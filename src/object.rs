//! The core data model (§3): loaded objects, their symbols, version table,
//! and TLS parameters. Grounded in the teacher's `src/symbol.rs`
//! (`SymbolTable`/`SymbolInfo` shape) and `src/object.rs` (per-object
//! identity), adapted from borrowed-over-mmap references to owned, parsed
//! data — the simulator never keeps the backing file mapped, so a
//! self-referential borrow isn't available without `unsafe`.

use crate::hash::HashTable;
use crate::machine::Machine;
use std::path::PathBuf;

/// Dense index into [`crate::graph::Simulation::objects`]. Replaces the
/// reference loader's `loader`/`needed`/`local_scope` back-pointers (§9
/// "Cyclic references and back-pointers").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

impl ElfClass {
    pub fn is_64(self) -> bool {
        matches!(self, ElfClass::Elf64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// The root object, or a transitively needed object that is itself an
    /// `ET_EXEC`/`ET_DYN` executable (rare, but legal).
    Executable,
    /// A shared object pulled in via DT_NEEDED.
    Library,
    /// Synthetically prepended via `--ld-preload`.
    RuntimeLoaded,
}

/// A single dynamic or static symbol-table entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: u64,
    pub size: u64,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
}

impl Symbol {
    pub fn bind(&self) -> u8 {
        self.info >> 4
    }
    pub fn sym_type(&self) -> u8 {
        self.info & 0xf
    }
    pub fn visibility(&self) -> u8 {
        self.other & 0x3
    }
    pub fn is_undef(&self) -> bool {
        self.shndx == 0 // SHN_UNDEF
    }
}

/// A single entry of the per-object version table (§3 "Version entry"),
/// indexed 1..N by the Verdef/Verneed `ndx` field.
#[derive(Debug, Clone)]
pub struct VersionEntry {
    pub name: String,
    pub hash: u32,
    /// `None` for versions defined by this object itself; `Some(dep)` for
    /// versions required from a dependency (the dependency's filename, as
    /// it appears in the Verneed `vn_file` string).
    pub filename: Option<String>,
    pub hidden: bool,
    /// `VER_FLG_WEAK`: a missing match is tolerated rather than fatal.
    pub weak: bool,
}

/// PT_TLS parameters (§3), populated once by the link-map factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsParams {
    pub blocksize: u64,
    pub align: u64,
    pub firstbyte_offset: u64,
}

/// A single relocation entry extracted from DT_REL/DT_RELA/DT_JMPREL
/// (or, for MIPS, synthesized over the global GOT), as consumed by the
/// relocation walker (§4.9).
#[derive(Debug, Clone, Copy)]
pub struct RelEntry {
    pub symidx: u32,
    pub r_type: u32,
    pub is_plt: bool,
}

/// A loaded shared object or executable (§3 "Object"). Placeholder objects
/// (a NEEDED entry that failed to resolve) carry `is_placeholder = true`
/// and have empty symbol/hash/version data.
#[derive(Debug, Clone)]
pub struct Object {
    pub id: ObjectId,
    pub path: PathBuf,
    pub soname: Option<String>,
    /// DT_NEEDED SONAMEs in declaration order, before resolution.
    pub needed: Vec<String>,
    pub class: ElfClass,
    pub machine: Machine,
    pub little_endian: bool,
    pub kind: ObjectKind,
    pub is_placeholder: bool,
    /// Set when this object could not be resolved/opened.
    pub err_no: Option<String>,

    pub symbols: Vec<Symbol>,
    pub hashtab: Option<HashTable>,
    /// Dense version table, indexed by `ndx` (slot 0 and 1 reserved/unused
    /// per the Verdef/Verneed convention).
    pub versions: Vec<Option<VersionEntry>>,
    /// Per-symbol version index, parallel to `symbols` (empty if the
    /// object carries no `.gnu.version`).
    pub versym: Vec<u16>,

    pub tls: Option<TlsParams>,
    pub tls_modid: Option<u32>,
    pub tls_offset: Option<i64>,

    /// The simulated load address (§3 "l_map_start").
    pub map_start: u64,
    pub map_size: u64,

    pub rpath: Option<String>,
    pub runpath: Option<String>,

    /// Relocations to walk in trace-prelink mode.
    pub relocs: Vec<RelEntry>,

    /// Objects this one depends on (DT_NEEDED, resolved, in declaration
    /// order; de-duplicated against the global loaded-object list).
    pub needed_resolved: Vec<ObjectId>,
    /// Precomputed transitive closure of `needed_resolved`, used as this
    /// object's local scope (§3 invariants).
    pub local_scope: Vec<ObjectId>,
}

impl Object {
    pub fn display_name(&self) -> &str {
        self.soname
            .as_deref()
            .unwrap_or_else(|| self.path.to_str().unwrap_or("?"))
    }
}
