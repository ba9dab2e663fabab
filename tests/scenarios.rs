//! End-to-end scenario tests driving [`ldsim::run`] against hand-built
//! minimal ELF64 files (§8 "End-to-end scenarios" A and C). Everything
//! else named in §8 (B's BFS/dedup shape, D's TLS layout, E's versioned
//! lookup, F's conflict detection) is exercised closer to the unit under
//! test, inline in `src/tls.rs`, `src/lookup.rs`, and `src/walk.rs`.

use ldsim::{Config, ExitCode};
use std::io::Write;
use std::path::PathBuf;

const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;

fn elf64_header(e_phoff: u64, e_phnum: u16) -> Vec<u8> {
    let mut h = Vec::with_capacity(64);
    h.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
    h.push(2); // EI_CLASS = ELFCLASS64
    h.push(1); // EI_DATA = ELFDATA2LSB
    h.push(1); // EI_VERSION
    h.push(0); // EI_OSABI
    h.extend_from_slice(&[0u8; 8]); // EI_ABIVERSION + padding
    h.extend_from_slice(&ET_EXEC.to_le_bytes());
    h.extend_from_slice(&EM_X86_64.to_le_bytes());
    h.extend_from_slice(&1u32.to_le_bytes()); // e_version
    h.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    h.extend_from_slice(&e_phoff.to_le_bytes());
    h.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    h.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    h.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    h.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    h.extend_from_slice(&e_phnum.to_le_bytes());
    h.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    h.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    h.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    assert_eq!(h.len(), 64);
    h
}

fn phdr(p_type: u32, p_flags: u32, p_offset: u64, p_vaddr: u64, p_filesz: u64, p_memsz: u64, p_align: u64) -> Vec<u8> {
    let mut p = Vec::with_capacity(56);
    p.extend_from_slice(&p_type.to_le_bytes());
    p.extend_from_slice(&p_flags.to_le_bytes());
    p.extend_from_slice(&p_offset.to_le_bytes());
    p.extend_from_slice(&p_vaddr.to_le_bytes());
    p.extend_from_slice(&p_vaddr.to_le_bytes()); // p_paddr, unused
    p.extend_from_slice(&p_filesz.to_le_bytes());
    p.extend_from_slice(&p_memsz.to_le_bytes());
    p.extend_from_slice(&p_align.to_le_bytes());
    assert_eq!(p.len(), 56);
    p
}

/// A static executable: no program headers at all, so there's neither a
/// `PT_INTERP` nor a `DT_SYMTAB` to find. §4.3 "Static detection".
fn write_static_exe(path: &std::path::Path) {
    let bytes = elf64_header(0, 0);
    std::fs::write(path, bytes).unwrap();
}

/// A dynamic executable with `PT_INTERP` (so it isn't mistaken for static)
/// and a `PT_DYNAMIC` segment carrying exactly one `DT_NEEDED` entry that
/// will never resolve. A single `PT_LOAD` spanning the whole file keeps
/// every virtual address numerically equal to its file offset, so
/// `vaddr_to_offset` is the identity function here.
fn write_dynamic_exe_with_missing_needed(path: &std::path::Path, needed_name: &str) {
    const PHDRS_OFFSET: u64 = 64;
    const PHDR_SIZE: u64 = 56;
    const N_PHDRS: u64 = 3; // INTERP, LOAD, DYNAMIC
    let data_offset = PHDRS_OFFSET + N_PHDRS * PHDR_SIZE;

    let interp = b"/lib64/ld-linux-x86-64.so.2\0";
    let interp_offset = data_offset;
    let interp_len = interp.len() as u64;

    let dynstr_offset = interp_offset + interp_len;
    let mut dynstr = vec![0u8]; // index 0: empty string
    let needed_off_in_strtab = dynstr.len() as u64;
    dynstr.extend_from_slice(needed_name.as_bytes());
    dynstr.push(0);
    let dynstr_len = dynstr.len() as u64;

    let dynamic_offset = dynstr_offset + dynstr_len;
    const DT_NEEDED: u64 = 1;
    const DT_STRTAB: u64 = 5;
    const DT_STRSZ: u64 = 10;
    const DT_NULL: u64 = 0;
    let mut dynamic = Vec::new();
    for (tag, val) in [
        (DT_NEEDED, needed_off_in_strtab),
        (DT_STRTAB, dynstr_offset),
        (DT_STRSZ, dynstr_len),
        (DT_NULL, 0),
    ] {
        dynamic.extend_from_slice(&tag.to_le_bytes());
        dynamic.extend_from_slice(&val.to_le_bytes());
    }
    let dynamic_len = dynamic.len() as u64;

    let total_len = dynamic_offset + dynamic_len;

    let mut file = elf64_header(PHDRS_OFFSET, N_PHDRS as u16);
    file.extend(phdr(3 /* PT_INTERP */, 4, interp_offset, interp_offset, interp_len, interp_len, 1));
    file.extend(phdr(1 /* PT_LOAD */, 5, 0, 0, total_len, total_len, 0x1000));
    file.extend(phdr(2 /* PT_DYNAMIC */, 6, dynamic_offset, dynamic_offset, dynamic_len, dynamic_len, 8));
    file.extend_from_slice(interp);
    file.extend_from_slice(&dynstr);
    file.extend_from_slice(&dynamic);
    assert_eq!(file.len() as u64, total_len);

    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&file).unwrap();
}

fn temp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("ldsim-test-{}-{}", std::process::id(), name));
    p
}

#[test]
fn scenario_a_static_executable() {
    let path = temp_path("static-exe");
    write_static_exe(&path);

    let config = Config::default();
    let (text, code) = ldsim::run(&[path.clone()], &config).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(text, "\tstatically linked\n");
    assert_eq!(code, ExitCode::Ok);
}

#[test]
fn scenario_c_missing_library() {
    let path = temp_path("missing-needed");
    write_dynamic_exe_with_missing_needed(&path, "libmissing.so");

    let config = Config::default();
    let (text, code) = ldsim::run(&[path.clone()], &config).unwrap();
    std::fs::remove_file(&path).ok();

    assert!(
        text.contains("libmissing.so => not found"),
        "unexpected output: {text}"
    );
    assert_eq!(code, ExitCode::NotFound);
}
