//! The relocation walker and conflict detector (§4.9): for every
//! relocation against a global symbol in every loaded object, resolves the
//! symbol through the root's global scope and (when the object's own local
//! scope differs from the root's) through its local scope, flagging a
//! `conflict` whenever the two disagree.
//!
//! Grounded in `original_source/src/rtld/dl-lookup.c`'s `_dl_debug_bindings`
//! and `original_source/src/rtld/rtld.c`'s relocation-order loop (objects
//! processed in reverse load order, with the dynamic linker's own object
//! always relocated last).

use crate::config::Config;
use crate::lookup::{self, MatchResult};
use crate::machine::{DisplayClass, TypeClass};
use crate::object::{Object, ObjectId};
use crate::unique::UniqueTable;
use std::collections::HashMap;

/// One line of trace-prelink output: either a plain `lookup` line or,
/// when the root's global scope and an object's own local scope disagree
/// on a binding, a `conflict` line.
#[derive(Debug, Clone)]
pub struct TraceLine {
    pub conflict: bool,
    pub using_addr: u64,
    pub search_value: u64,
    pub matched_addr: u64,
    pub resolved_value: u64,
    pub conflict_pair: Option<(u64, u64)>,
    pub display_class: DisplayClass,
    pub name: String,
    pub is_64: bool,
}

impl TraceLine {
    pub fn format(&self) -> String {
        let w = if self.is_64 { 16 } else { 8 };
        let mut s = String::new();
        if self.conflict {
            s.push_str("conflict ");
        }
        s.push_str(&format!(
            "lookup 0x{:0w$x} 0x{:0w$x} -> 0x{:0w$x} 0x{:0w$x}",
            self.using_addr, self.search_value, self.matched_addr, self.resolved_value, w = w
        ));
        if let Some((m2, v2)) = self.conflict_pair {
            s.push_str(&format!(" x 0x{:0w$x} 0x{:0w$x}", m2, v2, w = w));
        }
        s.push_str(&format!(" /{} {}", self.display_class.bits(), self.name));
        s
    }
}

/// Walks every relocation in every loaded object (reverse of `load_order`,
/// which the caller must already have the dynamic linker's own object
/// deferred to the end of), resolving and, where applicable, flagging
/// conflicts. `config.trace_prelinking`, when set, restricts output to
/// relocations belonging to the named object, except relocations whose
/// class is `>= 4` (`PROTECTED_DATA`/TLS), which are always shown.
pub fn walk(
    objects: &[Object],
    root: ObjectId,
    unique: &mut UniqueTable,
    config: &Config,
    load_order: &[ObjectId],
) -> Vec<TraceLine> {
    let mut lines = Vec::new();
    let Some(root_obj) = objects.get(root.0 as usize) else {
        return lines;
    };
    let root_scope = root_obj.local_scope.clone();
    let copy_reloc_names = collect_copy_reloc_names(objects, root);

    for &oid in load_order.iter().rev() {
        let Some(obj) = objects.get(oid.0 as usize) else {
            continue;
        };
        if obj.is_placeholder {
            continue;
        }

        // One cache per object, as §9's design note requires: a reloc
        // walker cache must be reset at every object boundary.
        let mut cache: HashMap<(String, Option<String>), Option<MatchResult>> = HashMap::new();

        for reloc in &obj.relocs {
            let Some(sym) = obj.symbols.get(reloc.symidx as usize) else {
                continue;
            };
            if sym.bind() == 0 {
                continue; // STB_LOCAL
            }
            if sym.name.is_empty() {
                continue;
            }

            let class = obj.machine.class_of(reloc.r_type);
            let mut display = DisplayClass::from_bits_truncate(class.bits());
            const STT_GNU_IFUNC: u8 = 10;
            if sym.sym_type() == STT_GNU_IFUNC {
                display |= DisplayClass::VALID;
            }

            let show = match &config.trace_prelinking {
                None => true,
                Some(target) => obj.display_name() == target.as_str() || class.bits() >= 4,
            };
            if !show {
                continue;
            }

            let version_want = version_requirement(obj, reloc.symidx);
            let key = (sym.name.clone(), version_want.clone());

            let global_result = match cache.get(&key) {
                Some(cached) => *cached,
                None => {
                    let r = lookup::lookup_symbol_x(
                        objects,
                        unique,
                        config,
                        &root_scope,
                        oid,
                        &sym.name,
                        version_want.as_deref(),
                        &copy_reloc_names,
                    );
                    cache.insert(key, r);
                    r
                }
            };

            let Some(global) = global_result else {
                continue; // undefined: diagnostic only, per §7
            };

            let local_result = if obj.local_scope != root_scope {
                lookup::lookup_symbol_x(
                    objects,
                    unique,
                    config,
                    &obj.local_scope,
                    oid,
                    &sym.name,
                    version_want.as_deref(),
                    &copy_reloc_names,
                )
            } else {
                None
            };

            let conflict = matches!(local_result, Some(local) if local != global);

            let matched_obj = &objects[global.object.0 as usize];
            let matched_sym = &matched_obj.symbols[global.sym_index];

            let conflict_pair = if conflict {
                local_result.map(|local| {
                    let lobj = &objects[local.object.0 as usize];
                    let lsym = &lobj.symbols[local.sym_index];
                    (lobj.map_start, lobj.map_start.wrapping_add(lsym.value))
                })
            } else {
                None
            };

            lines.push(TraceLine {
                conflict,
                using_addr: obj.map_start,
                search_value: sym.value,
                matched_addr: matched_obj.map_start,
                resolved_value: matched_obj.map_start.wrapping_add(matched_sym.value),
                conflict_pair,
                display_class: display,
                name: sym.name.clone(),
                is_64: obj.class.is_64(),
            });
        }
    }

    lines
}

/// The version name required from the dependency that's supposed to
/// provide `symidx`, if the referencing object carries version info for it.
fn version_requirement(obj: &Object, symidx: u32) -> Option<String> {
    const VERSYM_INDEX_MASK: u16 = 0x7fff;
    let ndx = (*obj.versym.get(symidx as usize)? & VERSYM_INDEX_MASK) as usize;
    obj.versions.get(ndx)?.as_ref().map(|v| v.name.clone())
}

fn collect_copy_reloc_names(objects: &[Object], root: ObjectId) -> Vec<String> {
    let Some(obj) = objects.get(root.0 as usize) else {
        return Vec::new();
    };
    obj.relocs
        .iter()
        .filter(|r| obj.machine.class_of(r.r_type).contains(TypeClass::COPY))
        .filter_map(|r| obj.symbols.get(r.symidx as usize).map(|s| s.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::object::{ElfClass, ObjectKind, RelEntry, Symbol};
    use std::path::PathBuf;

    fn bare(id: u32) -> Object {
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
    fn scenario_f_conflict_detected() {
        // E (root) needs L1 then L2; both L1 and L2 define `bar`. The
        // root's global scope is [E, L1, L2], so a global lookup of `bar`
        // finds L1 first. L2 carries a relocation against its own `bar`
        // definition; since L2's local scope is just itself (it doesn't
        // see L1), the local-scope lookup resolves to L2's own copy
        // instead, and the two resolutions disagree.
        let e = bare(0);

        let mut l1 = bare(1);
        l1.map_start = 0x2000;
        l1.symbols.push(Symbol {
            name: "bar".into(),
            value: 0x10,
            size: 0,
            info: 0x11, // STB_GLOBAL << 4 | STT_OBJECT
            other: 0,
            shndx: 1,
        });

        let mut l2 = bare(2);
        l2.map_start = 0x3000;
        l2.symbols.push(Symbol {
            name: "bar".into(),
            value: 0x20,
            size: 0,
            info: 0x11,
            other: 0,
            shndx: 1,
        });
        l2.relocs.push(RelEntry {
            symidx: 0,
            r_type: 0,
            is_plt: false,
        });
        l2.local_scope = vec![ObjectId(2)];

        let mut objects = vec![e, l1, l2];
        objects[0].local_scope = vec![ObjectId(0), ObjectId(1), ObjectId(2)];

        let root = ObjectId(0);
        let mut unique = UniqueTable::new();
        let config = Config::default();
        let load_order = vec![ObjectId(0), ObjectId(1), ObjectId(2)];

        let lines = walk(&objects, root, &mut unique, &config, &load_order);
        assert_eq!(lines.iter().filter(|l| l.conflict).count(), 1);
        let conflict_line = lines.iter().find(|l| l.conflict).unwrap();
        assert_eq!(conflict_line.name, "bar");
        assert_eq!(conflict_line.matched_addr, 0x2000); // global: L1
        assert_eq!(conflict_line.conflict_pair.unwrap().0, 0x3000); // local: L2
    }

    #[test]
    fn format_widths_by_class() {
        let line = TraceLine {
            conflict: false,
            using_addr: 0x1000,
            search_value: 0,
            matched_addr: 0x2000,
            resolved_value: 0x2010,
            conflict_pair: None,
            display_class: DisplayClass::PLT,
            name: "foo".to_string(),
            is_64: true,
        };
        assert_eq!(
            line.format(),
            "lookup 0x0000000000001000 0x0000000000000000 -> 0x0000000000002000 0x0000000000002010 /1 foo"
        );
    }
}
