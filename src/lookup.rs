//! The symbol lookup engine (§4.8): `lookup_symbol_x` walks a scope (an
//! ordered list of objects) looking for the best binding of a name,
//! applying version filtering, bind disambiguation, `STB_GNU_UNIQUE`
//! interning, and a protected-visibility re-lookup.
//!
//! Grounded in `original_source/src/rtld/dl-lookup.c`'s `do_lookup_x` /
//! `check_match` / `lookup_symbol_x`.

use crate::config::Config;
use crate::hash::GnuHash;
use crate::object::{Object, ObjectId};
use crate::unique::UniqueTable;

const STB_LOCAL: u8 = 0;
const STB_GLOBAL: u8 = 1;
const STB_WEAK: u8 = 2;
const STB_GNU_UNIQUE: u8 = 10;
const STV_PROTECTED: u8 = 3;

const VERSYM_HIDDEN: u16 = 0x8000;
const VERSYM_INDEX_MASK: u16 = 0x7fff;

/// A resolved binding: the object that provides the definition, and the
/// index of its symbol-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub object: ObjectId,
    pub sym_index: usize,
}

/// Looks up `name` (optionally constrained to `version_want`, an explicit
/// version name from a versioned relocation) across `scope`, in order.
///
/// `copy_reloc_names` lists symbol names for which the root executable
/// carries a `COPY` relocation; a definition found in any other object for
/// one of those names is skipped, since the executable's copy is the real
/// storage location post-relocation (§4.8 "copy-reloc exclusion").
pub fn lookup_symbol_x(
    objects: &[Object],
    unique: &mut UniqueTable,
    config: &Config,
    scope: &[ObjectId],
    undef_map: ObjectId,
    name: &str,
    version_want: Option<&str>,
    copy_reloc_names: &[String],
) -> Option<MatchResult> {
    let mut weak_candidate: Option<MatchResult> = None;

    for &oid in scope {
        let Some((idx, bind)) = do_lookup_x(objects, oid, name, version_want) else {
            continue;
        };

        if oid != undef_map && copy_reloc_names.iter().any(|n| n == name) {
            continue;
        }

        match bind {
            STB_GLOBAL => {
                let result = MatchResult {
                    object: oid,
                    sym_index: idx,
                };
                return Some(resolve_protected(
                    objects,
                    undef_map,
                    result,
                    name,
                    version_want,
                ));
            }
            STB_GNU_UNIQUE => {
                let hash = GnuHash::hash(name.as_bytes());
                let entry = unique.intern(hash, name, oid, idx);
                return Some(MatchResult {
                    object: entry.owner,
                    sym_index: entry.sym_index,
                });
            }
            STB_WEAK => {
                if config.dynamic_weak {
                    return Some(MatchResult {
                        object: oid,
                        sym_index: idx,
                    });
                }
                if weak_candidate.is_none() {
                    weak_candidate = Some(MatchResult {
                        object: oid,
                        sym_index: idx,
                    });
                }
            }
            _ => {}
        }
    }

    weak_candidate
}

/// Per-object lookup: walks the hash-colliding chain (or, lacking a hash
/// table, the symbol table in order) and applies `check_match` to every
/// name match in turn — rejecting undefined/local entries and version
/// mismatches — continuing the walk past a rejected candidate instead of
/// stopping at the first name match (§4.8 `check_match` runs *inside* the
/// chain walk, since one object can define several versions of the same
/// name and the first in hash-chain order need not be the one that
/// satisfies the request).
fn do_lookup_x(
    objects: &[Object],
    oid: ObjectId,
    name: &str,
    version_want: Option<&str>,
) -> Option<(usize, u8)> {
    let obj = objects.get(oid.0 as usize)?;
    let name_bytes = name.as_bytes();

    let check_match = |i: usize| -> Option<(usize, u8)> {
        let sym = obj.symbols.get(i)?;
        if sym.name != name {
            return None;
        }
        if sym.is_undef() {
            return None;
        }
        let bind = sym.bind();
        if bind == STB_LOCAL {
            return None;
        }
        if !version_matches(obj, i, version_want) {
            return None;
        }
        Some((i, bind))
    };

    match &obj.hashtab {
        Some(table) => table.lookup(name_bytes, check_match),
        None => (0..obj.symbols.len()).find_map(check_match),
    }
}

/// §4.8 "version check": an explicit version request must match the
/// symbol's version slot exactly (hidden versions are only reachable this
/// way). An unversioned reference accepts the base/no-version slots
/// (`ndx < 2`), or the object's default (non-hidden) version.
fn version_matches(obj: &Object, sym_idx: usize, version_want: Option<&str>) -> bool {
    let versym = obj.versym.get(sym_idx).copied().unwrap_or(0);
    let ndx = (versym & VERSYM_INDEX_MASK) as usize;
    let hidden = versym & VERSYM_HIDDEN != 0;

    match version_want {
        Some(want) => obj
            .versions
            .get(ndx)
            .and_then(|slot| slot.as_ref())
            .is_some_and(|v| v.name == want),
        None => ndx < 2 || !hidden,
    }
}

/// §4.8 "protected-visibility re-lookup": if the accepted definition has
/// `STV_PROTECTED` visibility and lives in a different object than the
/// reference, the reference's own object is searched again in isolation;
/// if it also defines the symbol, that local copy wins instead.
fn resolve_protected(
    objects: &[Object],
    undef_map: ObjectId,
    result: MatchResult,
    name: &str,
    version_want: Option<&str>,
) -> MatchResult {
    let Some(owner) = objects.get(result.object.0 as usize) else {
        return result;
    };
    let Some(sym) = owner.symbols.get(result.sym_index) else {
        return result;
    };
    if sym.visibility() != STV_PROTECTED || result.object == undef_map {
        return result;
    }
    match do_lookup_x(objects, undef_map, name, version_want) {
        Some((idx, _)) => MatchResult {
            object: undef_map,
            sym_index: idx,
        },
        None => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::object::{ElfClass, ObjectKind, Symbol, VersionEntry};
    use std::path::PathBuf;

    fn sym(name: &str, bind: u8) -> Symbol {
        Symbol {
            name: name.to_string(),
            value: 0,
            size: 0,
            info: bind << 4 | 1, // STT_OBJECT
            other: 0,
            shndx: 1,
        }
    }

    fn base_obj(id: u32) -> Object {
        Object {
            id: ObjectId(id),
            path: PathBuf::from(format!("obj{id}")),
            soname: None,
            needed: Vec::new(),
            class: ElfClass::Elf64,
            machine: Machine::X86_64,
            little_endian: true,
            kind: ObjectKind::Library,
            is_placeholder: false,
            err_no: None,
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

    #[test]
    fn global_beats_weak_found_first() {
        let mut l1 = base_obj(0);
        l1.symbols.push(sym("bar", STB_WEAK));
        let mut l2 = base_obj(1);
        l2.symbols.push(sym("bar", STB_GLOBAL));
        let objects = vec![l1, l2];
        let scope = vec![ObjectId(0), ObjectId(1)];
        let mut unique = UniqueTable::new();
        let config = Config::default();
        let result =
            lookup_symbol_x(&objects, &mut unique, &config, &scope, ObjectId(2), "bar", None, &[]);
        assert_eq!(result, Some(MatchResult { object: ObjectId(1), sym_index: 0 }));
    }

    #[test]
    fn weak_only_returns_first_weak() {
        let mut l1 = base_obj(0);
        l1.symbols.push(sym("bar", STB_WEAK));
        let mut l2 = base_obj(1);
        l2.symbols.push(sym("bar", STB_WEAK));
        let objects = vec![l1, l2];
        let scope = vec![ObjectId(0), ObjectId(1)];
        let mut unique = UniqueTable::new();
        let config = Config::default();
        let result =
            lookup_symbol_x(&objects, &mut unique, &config, &scope, ObjectId(2), "bar", None, &[]);
        assert_eq!(result, Some(MatchResult { object: ObjectId(0), sym_index: 0 }));
    }

    #[test]
    fn scenario_e_versioned_lookup() {
        let mut lib = base_obj(0);
        lib.symbols.push(sym("foo", STB_GLOBAL));
        lib.symbols.push(sym("foo", STB_GLOBAL));
        lib.versym = vec![2, 3];
        lib.versions = vec![
            None,
            None,
            Some(VersionEntry {
                name: "GLIBC_2.0".to_string(),
                hash: 0,
                filename: None,
                hidden: true,
                weak: false,
            }),
            Some(VersionEntry {
                name: "GLIBC_2.3".to_string(),
                hash: 0,
                filename: None,
                hidden: false,
                weak: false,
            }),
        ];
        let objects = vec![lib];
        let scope = vec![ObjectId(0)];
        let mut unique = UniqueTable::new();
        let config = Config::default();

        let unversioned =
            lookup_symbol_x(&objects, &mut unique, &config, &scope, ObjectId(1), "foo", None, &[])
                .unwrap();
        assert_eq!(unversioned.sym_index, 1); // the 2.3, non-hidden default

        let explicit = lookup_symbol_x(
            &objects,
            &mut unique,
            &config,
            &scope,
            ObjectId(1),
            "foo",
            Some("GLIBC_2.0"),
            &[],
        )
        .unwrap();
        assert_eq!(explicit.sym_index, 0);
    }
}
