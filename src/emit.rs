//! The emitter (§4.10): renders a built [`Simulation`] as `ldd`-style or
//! `LD_TRACE_PRELINKING`-style text, and computes the process exit code.
//!
//! Grounded in the teacher's CLI output conventions (`tools/gen-elf`'s
//! plain stdout reporting) and `original_source/src/ldd.sh`/`prelink`'s
//! trace format for the two output modes.

use crate::config::Config;
use crate::graph::Simulation;
use crate::object::{Object, ObjectId};
use crate::walk::TraceLine;

/// Process exit code, mirroring a real `ldd`/`prelink --verify` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    Error = 1,
    NotFound = 127,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Renders the `ldd`-style report: one line per dependency, `statically
/// linked` for a static root, `not found` for an unresolved dependency.
pub fn emit_ldd(sim: &Simulation) -> (String, ExitCode) {
    let mut out = String::new();
    let mut code = ExitCode::Ok;

    if sim.all_static {
        out.push_str("\tstatically linked\n");
        return (out, code);
    }

    for &root in &sim.roots {
        let Some(root_obj) = sim.objects.get(root.0 as usize) else {
            continue;
        };
        for &dep in &root_obj.local_scope {
            if dep == root {
                continue;
            }
            let Some(obj) = sim.objects.get(dep.0 as usize) else {
                continue;
            };
            if obj.is_placeholder {
                out.push_str(&format!("\t{} => not found\n", obj.display_name()));
                code = ExitCode::NotFound;
            } else {
                out.push_str(&format!(
                    "\t{} => {} (0x{:08x})\n",
                    obj.display_name(),
                    obj.path.display(),
                    obj.map_start
                ));
            }
        }
    }

    (out, code)
}

/// Renders the `RTLD_TRACE_PRELINKING`-style report: every loaded object
/// (including the root), widened with map/TLS info, followed by the
/// relocation walker's lines.
pub fn emit_trace_prelink(
    sim: &Simulation,
    config: &Config,
    trace_lines: &[TraceLine],
) -> (String, ExitCode) {
    let mut out = String::new();
    let code = if sim
        .objects
        .iter()
        .any(|o| o.is_placeholder)
    {
        if config.ld_warn {
            ExitCode::NotFound
        } else {
            ExitCode::Ok
        }
    } else {
        ExitCode::Ok
    };

    for (i, obj) in sim.objects.iter().enumerate() {
        let id = ObjectId(i as u32);
        if !is_reachable(sim, id) {
            continue;
        }
        out.push_str(&format_object_line(obj));
    }

    for line in trace_lines {
        out.push_str(&line.format());
        out.push('\n');
    }

    (out, code)
}

fn is_reachable(sim: &Simulation, id: ObjectId) -> bool {
    sim.roots.iter().any(|&r| {
        sim.objects
            .get(r.0 as usize)
            .is_some_and(|root| root.local_scope.contains(&id))
    })
}

fn format_object_line(obj: &Object) -> String {
    if obj.is_placeholder {
        return format!("\t{} => not found\n", obj.display_name());
    }
    let width = if obj.class.is_64() { 16 } else { 8 };
    let mut line = format!(
        "\t{} => {} (0x{:0w$x},0x{:0w$x})",
        obj.display_name(),
        obj.path.display(),
        obj.map_start,
        obj.map_size,
        w = width
    );
    if let (Some(modid), Some(offset)) = (obj.tls_modid, obj.tls_offset) {
        line.push_str(&format!(" TLS(0x{modid:x},0x{offset:x})", offset = offset as u64));
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::object::{ElfClass, ObjectKind};
    use std::path::PathBuf;

    fn obj(id: u32, soname: &str, placeholder: bool) -> Object {
        Object {
            id: ObjectId(id),
            path: PathBuf::from(format!("/lib/{soname}")),
            soname: Some(soname.to_string()),
            needed: Vec::new(),
            class: ElfClass::Elf64,
            machine: Machine::X86_64,
            little_endian: true,
            kind: ObjectKind::Library,
            is_placeholder: placeholder,
            err_no: None,
            symbols: Vec::new(),
            hashtab: None,
            versions: Vec::new(),
            versym: Vec::new(),
            tls: None,
            tls_modid: None,
            tls_offset: None,
            map_start: 0x1000,
            map_size: 0x1000,
            rpath: None,
            runpath: None,
            relocs: Vec::new(),
            needed_resolved: Vec::new(),
            local_scope: Vec::new(),
        }
    }

    #[test]
    fn static_root_reports_statically_linked() {
        let sim = Simulation {
            objects: Vec::new(),
            roots: Vec::new(),
            all_static: true,
            interpreter: None,
        };
        let (text, code) = emit_ldd(&sim);
        assert_eq!(text, "\tstatically linked\n");
        assert_eq!(code, ExitCode::Ok);
    }

    #[test]
    fn missing_dependency_is_not_found_with_exit_127() {
        let mut root = obj(0, "app", false);
        root.local_scope = vec![ObjectId(0), ObjectId(1)];
        let missing = obj(1, "libmissing.so", true);

        let sim = Simulation {
            objects: vec![root, missing],
            roots: vec![ObjectId(0)],
            all_static: false,
            interpreter: None,
        };
        let (text, code) = emit_ldd(&sim);
        assert!(text.contains("libmissing.so => not found"));
        assert_eq!(code, ExitCode::NotFound);
    }
}
