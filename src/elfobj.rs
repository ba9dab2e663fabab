//! Raw ELF structure extraction: headers, program headers, and the dynamic
//! section's tags. This is the external-collaborator boundary named in the
//! purpose/scope section — everything here is "providing structured
//! inputs"; the algorithms that consume them (hash tables, version tables,
//! TLS layout, symbol lookup) live in their own modules.
//!
//! Grounded in the teacher's `src/dynamic.rs` (single-pass DT_* tag scan)
//! and `src/ehdr.rs`/`src/segment.rs`, adapted from raw-pointer-over-mmap
//! reads to the `elf` crate's byte-slice API, since the simulator never
//! maps the files it analyzes — it reads them once with `std::fs::read`.

use crate::error::{malformed_elf, Result};
use crate::machine::Machine;
use elf::endian::AnyEndian;
use elf::ElfBytes;
use std::path::Path;

/// A resolved `DT_REL`/`DT_RELA`/`DT_JMPREL` table descriptor: file offset,
/// byte size, and per-entry size.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelTable {
    pub offset: u64,
    pub size: u64,
    pub entsize: u64,
}

/// Every dynamic tag the simulator's components consume (§6 "ELF surfaces
/// consumed"). Addresses (`*_addr` fields) are virtual addresses exactly as
/// they appear in the dynamic section; callers translate them to file
/// offsets via [`RawElf::vaddr_to_offset`].
#[derive(Debug, Clone, Default)]
pub struct DynInfo {
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub rpath: Option<String>,
    pub runpath: Option<String>,
    pub symtab_addr: Option<u64>,
    pub strtab_addr: Option<u64>,
    pub strtab_size: Option<u64>,
    pub syment: Option<u64>,
    pub hash_addr: Option<u64>,
    pub gnu_hash_addr: Option<u64>,
    pub versym_addr: Option<u64>,
    pub verneed_addr: Option<u64>,
    pub verneed_num: Option<u64>,
    pub verdef_addr: Option<u64>,
    pub verdef_num: Option<u64>,
    pub rel: Option<RelTable>,
    pub rela: Option<RelTable>,
    pub jmprel: Option<RelTable>,
    /// `DT_PLTREL`: `DT_REL` or `DT_RELA`, tells us how to interpret `jmprel`.
    pub pltrel_is_rela: Option<bool>,
    pub mips_local_gotno: Option<u64>,
    pub mips_gotsym: Option<u64>,
    pub mips_symtabno: Option<u64>,
}

/// The result of parsing one ELF file: enough structure for the graph
/// builder, link-map factory, version resolver, and relocation walker to
/// each do their part without re-parsing.
#[derive(Debug, Clone)]
pub struct RawElf {
    pub class64: bool,
    pub little_endian: bool,
    pub machine: Machine,
    pub e_type: u16,
    pub interp: Option<String>,
    /// `(vaddr, memsz, align, firstbyte_offset)` from PT_TLS, if present.
    pub tls: Option<(u64, u64, u64, u64)>,
    pub dynamic: DynInfo,
    phdrs: Vec<(u32, u64, u64, u64)>, // (p_type, p_offset, p_vaddr, p_filesz)
    pub data: Vec<u8>,
}

impl RawElf {
    /// Translates a virtual address to a file offset via the PT_LOAD
    /// segment that contains it, mirroring how a real loader's mapped
    /// image makes `vaddr` and file content coincide modulo page alignment.
    pub fn vaddr_to_offset(&self, vaddr: u64) -> Option<u64> {
        const PT_LOAD: u32 = 1;
        for &(p_type, p_offset, p_vaddr, p_filesz) in &self.phdrs {
            if p_type == PT_LOAD && vaddr >= p_vaddr && vaddr < p_vaddr + p_filesz {
                return Some(p_offset + (vaddr - p_vaddr));
            }
        }
        None
    }

    pub fn bytes_at(&self, vaddr: u64, len: usize) -> Option<&[u8]> {
        let off = self.vaddr_to_offset(vaddr)? as usize;
        self.data.get(off..off + len)
    }
}

/// Parses the file at `path` into a [`RawElf`]. Reads the whole file into
/// memory once; nothing is mapped or executed.
pub fn parse(path: &Path) -> Result<RawElf> {
    let data =
        std::fs::read(path).map_err(|e| malformed_elf(format!("{}: {e}", path.display())))?;
    parse_bytes(data)
}

pub fn parse_bytes(data: Vec<u8>) -> Result<RawElf> {
    if data.len() < 20 || &data[0..4] != b"\x7fELF" {
        return Err(malformed_elf("missing ELF magic"));
    }
    let class64 = match data[4] {
        1 => false,
        2 => true,
        other => return Err(malformed_elf(format!("unknown EI_CLASS {other}"))),
    };
    let little_endian = match data[5] {
        1 => true,
        2 => false,
        other => return Err(malformed_elf(format!("unknown EI_DATA {other}"))),
    };

    let file = ElfBytes::<AnyEndian>::minimal_parse(&data)
        .map_err(|e| malformed_elf(format!("{e}")))?;

    let e_machine = file.ehdr.e_machine;
    let machine = Machine::from_elf(e_machine)
        .ok_or_else(|| malformed_elf(format!("unsupported e_machine {e_machine}")))?;
    let e_type = file.ehdr.e_type;

    let mut interp = None;
    let mut tls = None;
    let mut phdrs = Vec::new();
    if let Some(segs) = file.segments() {
        for seg in segs.iter() {
            phdrs.push((seg.p_type, seg.p_offset, seg.p_vaddr, seg.p_filesz));
            const PT_INTERP: u32 = 3;
            const PT_TLS: u32 = 7;
            if seg.p_type == PT_INTERP {
                let start = seg.p_offset as usize;
                let end = (seg.p_offset + seg.p_filesz) as usize;
                if let Some(bytes) = data.get(start..end) {
                    let s = bytes
                        .split(|&b| b == 0)
                        .next()
                        .unwrap_or(bytes);
                    interp = Some(String::from_utf8_lossy(s).into_owned());
                }
            } else if seg.p_type == PT_TLS && seg.p_memsz > 0 {
                let align = seg.p_align.max(1);
                let firstbyte_offset = seg.p_vaddr & (align - 1);
                tls = Some((seg.p_vaddr, seg.p_memsz, align, firstbyte_offset));
            }
        }
    }

    let raw_tmp = RawElf {
        class64,
        little_endian,
        machine,
        e_type,
        interp,
        tls,
        dynamic: DynInfo::default(),
        phdrs: phdrs.clone(),
        data: Vec::new(),
    };

    let dynamic = parse_dynamic(&file, &data, &raw_tmp)?;

    Ok(RawElf {
        dynamic,
        data,
        ..raw_tmp
    })
}

fn parse_dynamic(
    file: &ElfBytes<AnyEndian>,
    data: &[u8],
    raw: &RawElf,
) -> Result<DynInfo> {
    use elf::abi::*;

    let mut info = DynInfo::default();
    let Some(dynamic) = file
        .dynamic()
        .map_err(|e| malformed_elf(format!("{e}")))?
    else {
        return Ok(info);
    };

    // DT_STRTAB must be resolved before DT_NEEDED/DT_SONAME/DT_RPATH/
    // DT_RUNPATH can be turned into strings, so collect raw tags first.
    let mut strtab_addr = None;
    let mut needed_offs = Vec::new();
    let mut soname_off = None;
    let mut rpath_off = None;
    let mut runpath_off = None;
    let mut rel = RelTable::default();
    let mut rela = RelTable::default();
    let mut jmprel = RelTable::default();
    let mut have_rel = false;
    let mut have_rela = false;
    let mut have_jmprel = false;

    for d in dynamic.iter() {
        let tag = d.d_tag;
        let val = d.d_val;
        match tag as i64 {
            x if x == DT_NEEDED as i64 => needed_offs.push(val),
            x if x == DT_SONAME as i64 => soname_off = Some(val),
            x if x == DT_RPATH as i64 => rpath_off = Some(val),
            x if x == DT_RUNPATH as i64 => runpath_off = Some(val),
            x if x == DT_STRTAB as i64 => strtab_addr = Some(val),
            x if x == DT_STRSZ as i64 => info.strtab_size = Some(val),
            x if x == DT_SYMTAB as i64 => info.symtab_addr = Some(val),
            x if x == DT_SYMENT as i64 => info.syment = Some(val),
            x if x == DT_HASH as i64 => info.hash_addr = Some(val),
            x if x == DT_GNU_HASH as i64 => info.gnu_hash_addr = Some(val),
            x if x == DT_VERSYM as i64 => info.versym_addr = Some(val),
            x if x == DT_VERNEED as i64 => info.verneed_addr = Some(val),
            x if x == DT_VERNEEDNUM as i64 => info.verneed_num = Some(val),
            x if x == DT_VERDEF as i64 => info.verdef_addr = Some(val),
            x if x == DT_VERDEFNUM as i64 => info.verdef_num = Some(val),
            x if x == DT_REL as i64 => {
                rel.offset = val;
                have_rel = true;
            }
            x if x == DT_RELSZ as i64 => rel.size = val,
            x if x == DT_RELENT as i64 => rel.entsize = val,
            x if x == DT_RELA as i64 => {
                rela.offset = val;
                have_rela = true;
            }
            x if x == DT_RELASZ as i64 => rela.size = val,
            x if x == DT_RELAENT as i64 => rela.entsize = val,
            x if x == DT_JMPREL as i64 => {
                jmprel.offset = val;
                have_jmprel = true;
            }
            x if x == DT_PLTRELSZ as i64 => jmprel.size = val,
            x if x == DT_PLTREL as i64 => info.pltrel_is_rela = Some(val == DT_RELA as u64),
            // MIPS-specific tags; values documented in the psABI but not
            // named constants in every `elf` crate version, so match the
            // raw numeric tag.
            0x7000_0002 => info.mips_local_gotno = Some(val), // DT_MIPS_LOCAL_GOTNO
            0x7000_0013 => info.mips_gotsym = Some(val),      // DT_MIPS_GOTSYM
            0x7000_0011 => info.mips_symtabno = Some(val),    // DT_MIPS_SYMTABNO
            _ => {}
        }
    }

    if have_rel {
        info.rel = Some(rel);
    }
    if have_rela {
        info.rela = Some(rela);
    }
    if have_jmprel {
        // DT_JMPREL's per-entry size is implied by DT_PLTREL; set it
        // explicitly since DT_RELENT/DT_RELAENT describe DT_REL/DT_RELA,
        // not DT_JMPREL.
        jmprel.entsize = if info.pltrel_is_rela.unwrap_or(true) {
            if raw.class64 { 24 } else { 12 }
        } else if raw.class64 {
            16
        } else {
            8
        };
        info.jmprel = Some(jmprel);
    }

    info.strtab_addr = strtab_addr;
    if let (Some(strtab), Some(strsz)) = (strtab_addr, info.strtab_size) {
        let read_str = |off: u64| -> Option<String> {
            let vaddr = strtab + off;
            let rel_off = raw.vaddr_to_offset(vaddr)?;
            let limit = raw.vaddr_to_offset(strtab)? + strsz;
            let start = rel_off as usize;
            let max_end = limit.min(data.len() as u64) as usize;
            let bytes = data.get(start..max_end)?;
            let s = bytes.split(|&b| b == 0).next().unwrap_or(&[]);
            Some(String::from_utf8_lossy(s).into_owned())
        };
        info.needed = needed_offs.into_iter().filter_map(read_str).collect();
        info.soname = soname_off.and_then(read_str);
        info.rpath = rpath_off.and_then(read_str);
        info.runpath = runpath_off.and_then(read_str);
    }

    Ok(info)
}
