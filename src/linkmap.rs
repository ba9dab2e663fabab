//! Link-map factory (§4.4): for each non-placeholder object, populate a
//! [`Object`] with its symbol table, hash tables, version table, TLS
//! parameters, relocation list, and a simulated load address.
//!
//! Grounded in the teacher's `src/dynamic.rs` (DT_* driven discovery of
//! these tables) and `src/hash/gnu.rs`/`src/hash/sysv.rs` (hash-table
//! parsing), retargeted at file-offset reads instead of a mapped image.

use crate::elfobj::RawElf;
use crate::error::{malformed_elf, Result};
use crate::hash::{BloomWidth, GnuHash, HashTable, SysvHash};
use crate::machine::Machine;
use crate::object::{ElfClass, Object, ObjectId, ObjectKind, RelEntry, Symbol, TlsParams};
use crate::version;
use elf::endian::AnyEndian;
use elf::ElfBytes;
use std::path::PathBuf;

/// A fixed sentinel the simulated address space starts from, matching the
/// convention used by real prelinkers for "no real mapping happened here".
pub const MAP_START_SENTINEL: u64 = 0xDEAD_0000;
const PAGE_SIZE: u64 = 0x1000;

/// Builds a fully-populated [`Object`] for a successfully resolved,
/// successfully parsed ELF file.
pub fn build(
    id: ObjectId,
    path: PathBuf,
    kind: ObjectKind,
    raw: &RawElf,
    map_cursor: &mut u64,
) -> Result<Object> {
    let class = if raw.class64 {
        ElfClass::Elf64
    } else {
        ElfClass::Elf32
    };

    let file = ElfBytes::<AnyEndian>::minimal_parse(&raw.data)
        .map_err(|e| malformed_elf(format!("{e}")))?;

    let mut symbols = Vec::new();
    if let Some((symtab, strtab)) = file
        .dynamic_symbol_table()
        .map_err(|e| malformed_elf(format!("{e}")))?
    {
        for sym in symtab.iter() {
            let name = strtab
                .get(sym.st_name as usize)
                .unwrap_or_default()
                .to_string();
            symbols.push(Symbol {
                name,
                value: sym.st_value,
                size: sym.st_size,
                info: sym.st_symtype() | (sym.st_bind() << 4),
                other: sym.st_other(),
                shndx: sym.st_shndx,
            });
        }
    }

    let hashtab = build_hash_table(raw)?;

    let (versions, versym) = version::build_version_table(raw, symbols.len())?;

    let tls = raw.tls.map(|(_, memsz, align, firstbyte_offset)| TlsParams {
        blocksize: memsz,
        align,
        firstbyte_offset,
    });

    let relocs = build_relocs(raw, symbols.len());

    let map_size = page_round(estimate_size(raw));
    let map_start = *map_cursor;
    *map_cursor += map_size;

    Ok(Object {
        id,
        path,
        soname: raw.dynamic.soname.clone(),
        needed: raw.dynamic.needed.clone(),
        class,
        machine: raw.machine,
        little_endian: raw.little_endian,
        kind,
        is_placeholder: false,
        err_no: None,
        symbols,
        hashtab,
        versions,
        versym,
        tls,
        tls_modid: None,
        tls_offset: None,
        map_start,
        map_size,
        rpath: raw.dynamic.rpath.clone(),
        runpath: raw.dynamic.runpath.clone(),
        relocs,
        needed_resolved: Vec::new(),
        local_scope: Vec::new(),
    })
}

/// Builds a placeholder object for a NEEDED entry that failed to resolve
/// (§4.3 "Failure mode").
pub fn placeholder(id: ObjectId, soname: String, err: String) -> Object {
    Object {
        id,
        path: PathBuf::from(&soname),
        soname: Some(soname),
        needed: Vec::new(),
        class: ElfClass::Elf64,
        machine: Machine::X86_64,
        little_endian: true,
        kind: ObjectKind::Library,
        is_placeholder: true,
        err_no: Some(err),
        symbols: Vec::new(),
        hashtab: None,
        versions: Vec::new(),
        versym: Vec::new(),
        tls: None,
        tls_modid: None,
        tls_offset: None,
        map_start: 0,
        map_size: 0,
        rpath: None,
        runpath: None,
        relocs: Vec::new(),
        needed_resolved: Vec::new(),
        local_scope: Vec::new(),
    }
}

fn page_round(size: u64) -> u64 {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// A rough in-memory footprint: highest `vaddr + memsz` across PT_LOAD
/// segments would be ideal; lacking direct phdr access here we fall back
/// to file size, which is a monotonic enough proxy for a simulator that
/// never actually maps anything.
fn estimate_size(raw: &RawElf) -> u64 {
    (raw.data.len() as u64).max(PAGE_SIZE)
}

fn build_hash_table(raw: &RawElf) -> Result<Option<HashTable>> {
    if let Some(addr) = raw.dynamic.gnu_hash_addr {
        let off = raw
            .vaddr_to_offset(addr)
            .ok_or_else(|| malformed_elf("DT_GNU_HASH address not mapped"))? as usize;
        let width = if raw.class64 {
            BloomWidth::W64
        } else {
            BloomWidth::W32
        };
        let slice = raw
            .data
            .get(off..)
            .ok_or_else(|| malformed_elf("DT_GNU_HASH out of range"))?;
        return Ok(Some(HashTable::Gnu(GnuHash::parse(
            slice,
            width,
            raw.little_endian,
        )?)));
    }
    if let Some(addr) = raw.dynamic.hash_addr {
        let off = raw
            .vaddr_to_offset(addr)
            .ok_or_else(|| malformed_elf("DT_HASH address not mapped"))? as usize;
        let slice = raw
            .data
            .get(off..)
            .ok_or_else(|| malformed_elf("DT_HASH out of range"))?;
        return Ok(Some(HashTable::Sysv(SysvHash::parse(
            slice,
            raw.little_endian,
        )?)));
    }
    Ok(None)
}

fn build_relocs(raw: &RawElf, nsyms: usize) -> Vec<RelEntry> {
    let mut out = Vec::new();
    let le = raw.little_endian;
    let class64 = raw.class64;

    let mut push_table = |table: Option<crate::elfobj::RelTable>, is_rela: bool, is_plt: bool| {
        let Some(t) = table else { return };
        let Some(off) = raw.vaddr_to_offset(t.offset) else {
            return;
        };
        let entsize = if t.entsize > 0 {
            t.entsize
        } else if is_rela {
            if class64 { 24 } else { 12 }
        } else if class64 {
            16
        } else {
            8
        } as u64;
        let count = if entsize > 0 { t.size / entsize } else { 0 };
        for i in 0..count {
            let entry_off = (off + i * entsize) as usize;
            let Some(bytes) = raw.data.get(entry_off..entry_off + entsize as usize) else {
                break;
            };
            let (symidx, r_type) = if class64 {
                let info = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
                let info = if le { info } else { info.swap_bytes() };
                ((info >> 32) as u32, (info & 0xffff_ffff) as u32)
            } else {
                let info = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
                let info = if le { info } else { info.swap_bytes() };
                (info >> 8, info & 0xff)
            };
            if symidx == 0 {
                continue;
            }
            out.push(RelEntry {
                symidx,
                r_type,
                is_plt,
            });
        }
    };

    push_table(raw.dynamic.rel, false, false);
    push_table(raw.dynamic.rela, true, false);
    push_table(
        raw.dynamic.jmprel,
        raw.dynamic.pltrel_is_rela.unwrap_or(true),
        true,
    );

    if let (Some(gotsym), Some(symtabno)) = (raw.dynamic.mips_gotsym, raw.dynamic.mips_symtabno) {
        const R_MIPS_REL32: u32 = 3;
        let end = symtabno.min(nsyms as u64);
        for symidx in gotsym..end {
            out.push(RelEntry {
                symidx: symidx as u32,
                r_type: R_MIPS_REL32,
                is_plt: false,
            });
        }
    }

    out
}
