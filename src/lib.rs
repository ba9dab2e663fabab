//! `ldsim`: a user-space simulator of a Unix runtime linker.
//!
//! Given a set of ELF paths, `ldsim` resolves `DT_NEEDED` dependencies the
//! way `ld.so` would (RPATH/RUNPATH/`LD_LIBRARY_PATH`/`ld.so.conf` search
//! order, `$ORIGIN`-style token expansion), assigns each loaded object a
//! simulated load address and TLS module id/offset, optionally walks every
//! relocation to report symbol bindings and `prelink`-style conflicts, and
//! renders the result as `ldd`-style or `LD_TRACE_PRELINKING`-style text.
//! Nothing is ever mapped into memory or executed.

pub mod cli;
pub mod config;
pub mod elfobj;
pub mod emit;
pub mod error;
pub mod graph;
pub mod hash;
pub mod linkmap;
pub mod lookup;
pub mod machine;
pub mod object;
pub mod resolve;
pub mod tls;
pub mod unique;
pub mod version;
pub mod walk;

pub use config::Config;
pub use emit::ExitCode;
pub use error::{Error, Result};
pub use graph::Simulation;

use object::ObjectId;
use std::path::PathBuf;

/// Runs a full simulated link: builds the object graph, assigns TLS layout,
/// validates symbol versions, optionally walks relocations, and renders the
/// chosen textual report.
pub fn run(paths: &[PathBuf], config: &Config) -> Result<(String, ExitCode)> {
    let mut sim = graph::build(paths, config)?;

    if sim.all_static {
        return Ok(emit::emit_ldd(&sim));
    }

    let machine = sim
        .objects
        .first()
        .map(|o| o.machine)
        .unwrap_or(machine::Machine::X86_64);
    tls::assign(&mut sim.objects, machine)?;
    version::validate(&sim.objects, config.trace_prelinking.is_some())?;

    if config.trace_prelinking.is_some() {
        let Some(root) = sim.roots.first().copied() else {
            return Ok(emit::emit_ldd(&sim));
        };
        let mut unique = unique::UniqueTable::new();
        // `walk` processes `load_order` in reverse, so the dynamic linker
        // (if loaded) goes first here to come out last there.
        let mut load_order: Vec<ObjectId> = Vec::with_capacity(sim.objects.len());
        load_order.extend(sim.interpreter);
        load_order.extend(
            (0..sim.objects.len() as u32)
                .map(ObjectId)
                .filter(|&oid| Some(oid) != sim.interpreter),
        );
        let lines = walk::walk(&sim.objects, root, &mut unique, config, &load_order);
        return Ok(emit::emit_trace_prelink(&sim, config, &lines));
    }

    Ok(emit::emit_ldd(&sim))
}
