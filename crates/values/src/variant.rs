use crate::capability_ref::CapabilityRef;
use crate::lambda::Lambda;
use crate::obj::EntityId;
use arcstr::ArcStr;
use imbl::{OrdMap, Vector};

/// The tagged sum described in spec.md §9 "Dynamic values":
/// `{null, bool, number(f64), string, list, map, entity-ref, lambda, capability-ref}`.
///
/// A `Variant::List` doubles as a script *call expression* when it appears as the head of a
/// script tree (spec.md §3 "Scripts") — the first element, if a `Str`, names the opcode. A
/// `Variant::Map` is always a self-evaluating literal (spec.md §4.4 step 2). This is what lets
/// the same `Var` type serve as both the runtime value and the canonical script representation.
#[derive(Clone, Debug)]
pub enum Variant {
    None,
    Bool(bool),
    Number(f64),
    Str(ArcStr),
    List(Vector<Var>),
    Map(OrdMap<ArcStr, Var>),
    Entity(EntityId),
    Lambda(std::sync::Arc<Lambda>),
    Capability(CapabilityRef),
}

use crate::var::Var;

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        use Variant::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Entity(a), Entity(b)) => a == b,
            (Lambda(a), Lambda(b)) => std::sync::Arc::ptr_eq(a, b),
            (Capability(a), Capability(b)) => a == b,
            _ => false,
        }
    }
}
