//! The standard library (spec.md §4.5): opcode handler families layered on top of the core
//! interpreter, one module per family, each exposing an `install(&mut OpcodeRegistry)` entry
//! point mirroring the teacher's per-family `builtins/bf_*.rs` modules
//! (`crates/kernel/src/builtins/mod.rs`).

pub mod arithmetic;
pub mod capability;
pub mod comparison;
pub mod entity;
pub mod json;
pub mod list;
pub mod logic;
pub mod math;
pub mod meta;
pub mod object;
pub mod random;
pub mod shared;
pub mod string;
pub mod time;

#[cfg(test)]
pub mod test_support;

use loom_interpreter::OpcodeRegistry;

/// Registers every standard-library family into `registry`, in a fixed, deterministic order
/// (alphabetical by family, spec.md §4.3 "registered in a deterministic order"). Callers
/// typically register the interpreter's own core opcodes (`loom_interpreter::
/// register_core_opcodes`) first, then call this.
pub fn install_all(registry: &mut OpcodeRegistry) {
    arithmetic::install(registry);
    capability::install(registry);
    comparison::install(registry);
    entity::install(registry);
    json::install(registry);
    list::install(registry);
    logic::install(registry);
    math::install(registry);
    meta::install(registry);
    object::install(registry);
    random::install(registry);
    string::install(registry);
    time::install(registry);
}
