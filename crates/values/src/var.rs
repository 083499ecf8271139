use crate::capability_ref::CapabilityRef;
use crate::lambda::Lambda;
use crate::obj::EntityId;
use crate::variant::Variant;
use arcstr::ArcStr;
use imbl::{OrdMap, Vector};
use std::fmt;
use std::sync::Arc;

/// A dynamically-typed value — and, equivalently, a script expression tree node
/// (spec.md §3 "Scripts", §9 "Dynamic values"). Cloning a `Var` is cheap: compound variants
/// are backed by `imbl`'s structurally-shared persistent collections.
#[derive(Clone)]
pub struct Var(Variant);

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Var {
    pub fn from_variant(v: Variant) -> Self {
        Var(v)
    }

    pub fn variant(&self) -> &Variant {
        &self.0
    }

    pub fn none() -> Self {
        Var(Variant::None)
    }

    pub fn bool(b: bool) -> Self {
        Var(Variant::Bool(b))
    }

    pub fn number(n: f64) -> Self {
        Var(Variant::Number(n))
    }

    pub fn str(s: impl Into<ArcStr>) -> Self {
        Var(Variant::Str(s.into()))
    }

    pub fn list(items: Vector<Var>) -> Self {
        Var(Variant::List(items))
    }

    pub fn list_from<I: IntoIterator<Item = Var>>(items: I) -> Self {
        Var(Variant::List(items.into_iter().collect()))
    }

    pub fn map(m: OrdMap<ArcStr, Var>) -> Self {
        Var(Variant::Map(m))
    }

    pub fn entity(id: EntityId) -> Self {
        Var(Variant::Entity(id))
    }

    pub fn lambda(l: Lambda) -> Self {
        Var(Variant::Lambda(Arc::new(l)))
    }

    pub fn capability(c: CapabilityRef) -> Self {
        Var(Variant::Capability(c))
    }

    pub fn is_none(&self) -> bool {
        matches!(self.0, Variant::None)
    }

    /// Script truthiness: only `false` and `null` are falsy (the convention used throughout
    /// the standard library's control-flow opcodes — §4.4 `if`/`while`).
    pub fn truthy(&self) -> bool {
        !matches!(self.0, Variant::None | Variant::Bool(false))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.0 {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match &self.0 {
            Variant::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            Variant::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_arcstr(&self) -> Option<&ArcStr> {
        match &self.0 {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vector<Var>> {
        match &self.0 {
            Variant::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&OrdMap<ArcStr, Var>> {
        match &self.0 {
            Variant::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match &self.0 {
            Variant::Entity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&Arc<Lambda>> {
        match &self.0 {
            Variant::Lambda(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_capability(&self) -> Option<&CapabilityRef> {
        match &self.0 {
            Variant::Capability(c) => Some(c),
            _ => None,
        }
    }

    /// `typeof` opcode support (spec.md §4.5 "Meta").
    pub fn type_name(&self) -> &'static str {
        match &self.0 {
            Variant::None => "null",
            Variant::Bool(_) => "bool",
            Variant::Number(_) => "number",
            Variant::Str(_) => "string",
            Variant::List(_) => "list",
            Variant::Map(_) => "object",
            Variant::Entity(_) => "entity",
            Variant::Lambda(_) => "lambda",
            Variant::Capability(_) => "capability",
        }
    }

    /// Treats this `Var` as a script expression: if it is a non-empty list whose first
    /// element is a string, that string is the opcode name (spec.md §3 "Scripts").
    pub fn as_call(&self) -> Option<(&str, &Vector<Var>)> {
        let Variant::List(items) = &self.0 else {
            return None;
        };
        let head = items.get(0)?;
        let name = head.as_str()?;
        Some((name, items))
    }
}

impl From<bool> for Var {
    fn from(b: bool) -> Self {
        Var::bool(b)
    }
}

impl From<f64> for Var {
    fn from(n: f64) -> Self {
        Var::number(n)
    }
}

impl From<i64> for Var {
    fn from(n: i64) -> Self {
        Var::number(n as f64)
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Var::str(s)
    }
}

impl From<String> for Var {
    fn from(s: String) -> Self {
        Var::str(s)
    }
}

impl From<EntityId> for Var {
    fn from(id: EntityId) -> Self {
        Var::entity(id)
    }
}
