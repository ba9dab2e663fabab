//! Version resolver (§4.5): builds each object's indexed version table
//! from Verneed/Verdef, and validates required versions against the
//! dependencies that are supposed to provide them.
//!
//! Verneed/Verdef/Vernaux/Verdaux layouts are fixed-size 16/32-bit-field
//! records independent of ELF class, so this module needs no 32/64
//! branching — one of the simplifications the class-witness abstraction in
//! §9 is meant to buy.

use crate::elfobj::RawElf;
use crate::error::{malformed_elf, version_mismatch, Result};
use crate::object::{Object, VersionEntry};

const VER_FLG_WEAK: u16 = 0x2;
const VERSYM_HIDDEN: u16 = 0x8000;
const VERSYM_INDEX_MASK: u16 = 0x7fff;

fn rd_u16(b: &[u8], off: usize, le: bool) -> u16 {
    let s: [u8; 2] = b[off..off + 2].try_into().unwrap();
    if le {
        u16::from_le_bytes(s)
    } else {
        u16::from_be_bytes(s)
    }
}
fn rd_u32(b: &[u8], off: usize, le: bool) -> u32 {
    let s: [u8; 4] = b[off..off + 4].try_into().unwrap();
    if le {
        u32::from_le_bytes(s)
    } else {
        u32::from_be_bytes(s)
    }
}

fn read_str(raw: &RawElf, strtab_addr: u64, str_off: u32) -> String {
    raw.bytes_at(strtab_addr + str_off as u64, 256)
        .map(|b| {
            let s = b.split(|&c| c == 0).next().unwrap_or(b);
            String::from_utf8_lossy(s).into_owned()
        })
        .unwrap_or_default()
}

/// Builds `(versions, versym)` for one object, per §4.5 paragraph 1.
pub fn build_version_table(raw: &RawElf, nsyms: usize) -> Result<(Vec<Option<VersionEntry>>, Vec<u16>)> {
    let le = raw.little_endian;
    let Some(strtab_addr) = raw.dynamic.strtab_addr else {
        return Ok((Vec::new(), Vec::new()));
    };

    let mut ndx_high = 1usize;
    let mut slots: Vec<(usize, VersionEntry)> = Vec::new();

    if let (Some(addr), Some(num)) = (raw.dynamic.verneed_addr, raw.dynamic.verneed_num) {
        let mut entry_addr = addr;
        for _ in 0..num {
            let hdr = raw
                .bytes_at(entry_addr, 16)
                .ok_or_else(|| malformed_elf("truncated Verneed entry"))?;
            let vn_cnt = rd_u16(hdr, 2, le);
            let vn_file = rd_u32(hdr, 4, le);
            let vn_aux = rd_u32(hdr, 8, le);
            let vn_next = rd_u32(hdr, 12, le);
            let filename = read_str(raw, strtab_addr, vn_file);

            let mut aux_addr = entry_addr + vn_aux as u64;
            for _ in 0..vn_cnt {
                let aux = raw
                    .bytes_at(aux_addr, 16)
                    .ok_or_else(|| malformed_elf("truncated Vernaux entry"))?;
                let vna_hash = rd_u32(aux, 0, le);
                let vna_flags = rd_u16(aux, 4, le);
                let vna_other = rd_u16(aux, 6, le);
                let vna_name = rd_u32(aux, 8, le);
                let vna_next = rd_u32(aux, 12, le);

                let ndx = (vna_other & VERSYM_INDEX_MASK) as usize;
                ndx_high = ndx_high.max(ndx);
                slots.push((
                    ndx,
                    VersionEntry {
                        name: read_str(raw, strtab_addr, vna_name),
                        hash: vna_hash,
                        filename: Some(filename.clone()),
                        hidden: (vna_other & VERSYM_HIDDEN) != 0,
                        weak: vna_flags & VER_FLG_WEAK != 0,
                    },
                ));
                if vna_next == 0 {
                    break;
                }
                aux_addr += vna_next as u64;
            }
            if vn_next == 0 {
                break;
            }
            entry_addr += vn_next as u64;
        }
    }

    if let (Some(addr), Some(num)) = (raw.dynamic.verdef_addr, raw.dynamic.verdef_num) {
        const VER_FLG_BASE: u16 = 0x1;
        let mut entry_addr = addr;
        for _ in 0..num {
            let hdr = raw
                .bytes_at(entry_addr, 20)
                .ok_or_else(|| malformed_elf("truncated Verdef entry"))?;
            let vd_flags = rd_u16(hdr, 2, le);
            let vd_ndx = rd_u16(hdr, 4, le);
            let vd_cnt = rd_u16(hdr, 6, le);
            let vd_hash = rd_u32(hdr, 8, le);
            let vd_aux = rd_u32(hdr, 12, le);
            let vd_next = rd_u32(hdr, 16, le);

            if vd_flags & VER_FLG_BASE == 0 && vd_cnt > 0 {
                let aux = raw
                    .bytes_at(entry_addr + vd_aux as u64, 8)
                    .ok_or_else(|| malformed_elf("truncated Verdaux entry"))?;
                let vda_name = rd_u32(aux, 0, le);
                let ndx = (vd_ndx & VERSYM_INDEX_MASK) as usize;
                ndx_high = ndx_high.max(ndx);
                slots.push((
                    ndx,
                    VersionEntry {
                        name: read_str(raw, strtab_addr, vda_name),
                        hash: vd_hash,
                        filename: None,
                        hidden: false,
                        weak: false,
                    },
                ));
            }
            if vd_next == 0 {
                break;
            }
            entry_addr += vd_next as u64;
        }
    }

    let mut versions: Vec<Option<VersionEntry>> = (0..=ndx_high).map(|_| None).collect();
    for (ndx, entry) in slots {
        if ndx < versions.len() {
            versions[ndx] = Some(entry);
        }
    }

    let mut versym = Vec::new();
    if let Some(addr) = raw.dynamic.versym_addr {
        for i in 0..nsyms {
            let v = raw
                .bytes_at(addr + (i as u64) * 2, 2)
                .map(|b| rd_u16(b, 0, le))
                .unwrap_or(0);
            versym.push(v);
        }
    }

    Ok((versions, versym))
}

/// Validates every object's required versions against the Verdef of the
/// dependency that's supposed to provide them (§4.5 paragraph 2). Returns
/// the first violation found, unless `trace_only` is set (in which case
/// violations are tolerated, matching a trace-mode run of the real loader).
pub fn validate(objects: &[Object], trace_only: bool) -> Result<()> {
    for obj in objects {
        for slot in obj.versions.iter().flatten() {
            let Some(dep_name) = &slot.filename else {
                continue;
            };
            let provider = objects
                .iter()
                .find(|o| o.display_name() == dep_name.as_str());
            let found = provider.is_some_and(|p| {
                p.versions
                    .iter()
                    .flatten()
                    .any(|v| v.filename.is_none() && v.hash == slot.hash && v.name == slot.name)
            });
            if !found && !slot.weak && !trace_only {
                return Err(version_mismatch(format!(
                    "{}: version `{}' required by {} not found",
                    dep_name,
                    slot.name,
                    obj.display_name()
                )));
            }
        }
    }
    Ok(())
}
