//! The opcode registry (spec.md §4.3): a mapping from opcode name to handler record, each
//! carrying editor/tooling metadata, an arity contract, and a `lazy` flag.
//!
//! Grounded on the teacher's `BuiltinFunction`/`BfCallState` dispatch-by-name table
//! (`crates/kernel/src/builtins/mod.rs`, `crates/kernel/src/vm/builtin.rs`), generalized from
//! a single fixed `VM`/`WorldState` context to a registry generic over whatever execution
//! context and error type the interpreter crate defines (`Registry<Ctx, Err>`) — this is what
//! lets `loom-opcodes` sit *below* `loom-interpreter` in the dependency graph (spec.md §2)
//! without the registry needing to know about `ExecutionContext` or `ScriptError` at all.

use ahash::AHashMap;
use loom_values::Var;
use std::fmt;

/// Declared argument arity for an opcode (spec.md §4.5 "fixed arity... fails with
/// ArityError when violated").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == *k,
            Arity::AtLeast(k) => n >= *k,
            Arity::Range(lo, hi) => n >= *lo && n <= *hi,
        }
    }
}

/// A parameter or return type hint surfaced to structured editors (spec.md §4.3 "slot
/// descriptors"). The core interpreter does not enforce these — only arity is enforced
/// (spec.md §4.5) — but a registry that carries no type metadata at all would be a dead
/// feature of the contract, so handlers still declare it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SlotType {
    Any,
    Number,
    String,
    Bool,
    List,
    Object,
    Entity,
    Capability,
    Lambda,
}

/// Human-facing metadata for one opcode (spec.md §4.3).
#[derive(Clone, Debug)]
pub struct OpcodeMeta {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub arity: Arity,
    pub params: &'static [SlotType],
    pub returns: SlotType,
    /// If true, argument expressions are passed to the handler unevaluated (spec.md §4.3
    /// "for control-flow opcodes like `if`, `for`, `while`, `let`, `seq`"); if false, the
    /// interpreter evaluates each left-to-right before calling the handler.
    pub lazy: bool,
}

/// The handler function signature common to every opcode: evaluated (or, for a lazy opcode,
/// raw expression) arguments plus the caller-supplied execution context, returning a value or
/// a script-level error (spec.md §4.3 "`(args, context) → value`").
pub type HandlerFn<Ctx, Err> = fn(&[Var], &mut Ctx) -> Result<Var, Err>;

struct Entry<Ctx, Err> {
    meta: OpcodeMeta,
    handler: HandlerFn<Ctx, Err>,
}

/// Populated once at startup by each standard-library family's `install` function, in a
/// deterministic order (spec.md §4.3 "registered in a deterministic order"). A missing
/// opcode is a fatal script error at the interpreter layer (spec.md §4.3), not here — the
/// registry only answers "is this name registered, and if so, how do I call it".
pub struct Registry<Ctx, Err> {
    entries: AHashMap<String, Entry<Ctx, Err>>,
}

impl<Ctx, Err> Default for Registry<Ctx, Err> {
    fn default() -> Self {
        Registry {
            entries: AHashMap::new(),
        }
    }
}

impl<Ctx, Err> Registry<Ctx, Err> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `meta.name`. Panics on a duplicate name — the registry is
    /// populated once at startup from a fixed, known set of families, so a collision is a
    /// programming error, not a runtime condition (spec.md §4.3 "The registry is populated
    /// once at startup").
    pub fn register(&mut self, meta: OpcodeMeta, handler: HandlerFn<Ctx, Err>) {
        let name = meta.name.to_string();
        if self.entries.contains_key(&name) {
            panic!("opcode {name} registered twice");
        }
        self.entries.insert(name, Entry { meta, handler });
    }

    pub fn lookup(&self, name: &str) -> Option<(&OpcodeMeta, HandlerFn<Ctx, Err>)> {
        self.entries.get(name).map(|e| (&e.meta, e.handler))
    }

    pub fn is_lazy(&self, name: &str) -> Option<bool> {
        self.entries.get(name).map(|e| e.meta.lazy)
    }

    /// Tooling accessor (SPEC_FULL.md §4.3): surfaces an opcode's metadata without invoking
    /// it, for structured editors — out of scope for the core, but the metadata backing such
    /// a tool must actually exist.
    pub fn describe(&self, name: &str) -> Option<&OpcodeMeta> {
        self.entries.get(name).map(|e| &e.meta)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}

impl<Ctx, Err> fmt::Debug for Registry<Ctx, Err> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("opcodes", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct DummyErr;

    fn add(args: &[Var], _ctx: &mut ()) -> Result<Var, DummyErr> {
        let sum: f64 = args.iter().filter_map(|v| v.as_number()).sum();
        Ok(Var::number(sum))
    }

    #[test]
    fn register_and_call() {
        let mut reg: Registry<(), DummyErr> = Registry::new();
        reg.register(
            OpcodeMeta {
                name: "+",
                label: "Add",
                category: "arithmetic",
                description: "sum of numbers",
                arity: Arity::AtLeast(2),
                params: &[SlotType::Number],
                returns: SlotType::Number,
                lazy: false,
            },
            add,
        );
        let (meta, handler) = reg.lookup("+").expect("registered");
        assert!(meta.arity.accepts(3));
        let mut ctx = ();
        let result = handler(&[Var::number(1.0), Var::number(2.0)], &mut ctx).unwrap();
        assert_eq!(result.as_number(), Some(3.0));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut reg: Registry<(), DummyErr> = Registry::new();
        let meta = OpcodeMeta {
            name: "+",
            label: "Add",
            category: "arithmetic",
            description: "",
            arity: Arity::AtLeast(2),
            params: &[],
            returns: SlotType::Number,
            lazy: false,
        };
        reg.register(meta.clone(), add);
        reg.register(meta, add);
    }

    #[test]
    fn describe_surfaces_metadata_without_calling() {
        let mut reg: Registry<(), DummyErr> = Registry::new();
        reg.register(
            OpcodeMeta {
                name: "if",
                label: "If",
                category: "control",
                description: "conditional",
                arity: Arity::Range(2, 3),
                params: &[],
                returns: SlotType::Any,
                lazy: true,
            },
            |_args, _ctx| Ok(Var::none()),
        );
        assert_eq!(reg.is_lazy("if"), Some(true));
        assert!(reg.describe("unknown").is_none());
    }
}
