//! Layered name→value bindings (spec.md §3 "Scopes & lambdas"). Grounded on the teacher's
//! `Environment` (`crates/kernel/src/vm/environment.rs`) — a contiguous stack of scope
//! layers — but name-keyed rather than slot-indexed, since loom has no compilation pass to
//! resolve variable references to fixed slots ahead of time (scripts are evaluated directly
//! off the expression tree, spec.md §1 Non-goals "no... compilation to bytecode").

use arcstr::ArcStr;
use loom_values::Var;

/// A stack of scope layers. Lookup walks from the innermost (last-pushed) layer outward
/// (spec.md §3 "a variable lookup walks from innermost outward").
#[derive(Clone, Debug, Default)]
pub struct Scope {
    layers: Vec<ahash::AHashMap<ArcStr, Var>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope { layers: vec![ahash::AHashMap::new()] }
    }

    /// Builds a scope from a lambda's flattened capture snapshot as its sole base layer
    /// (spec.md §4.4 "Lambdas" — "a new scope layer is pushed with parameter bindings over
    /// the snapshot").
    pub fn from_captured(captured: &imbl::Vector<(ArcStr, Var)>) -> Self {
        let mut layer = ahash::AHashMap::new();
        for (name, value) in captured.iter() {
            layer.insert(name.clone(), value.clone());
        }
        Scope { layers: vec![layer] }
    }

    pub fn push_layer(&mut self) {
        self.layers.push(ahash::AHashMap::new());
    }

    pub fn pop_layer(&mut self) {
        self.layers.pop();
        if self.layers.is_empty() {
            self.layers.push(ahash::AHashMap::new());
        }
    }

    /// `let(name, value)` binds `name` in the innermost scope (spec.md §4.4 "Scoping").
    pub fn bind(&mut self, name: impl Into<ArcStr>, value: Var) {
        self.layers
            .last_mut()
            .expect("scope always has at least one layer")
            .insert(name.into(), value);
    }

    /// `set(name, value)` reassigns an existing binding in the nearest enclosing scope that
    /// contains it; it does not create a new one (spec.md §4.4 "Scoping"). Returns `false` if
    /// `name` was never `let`-bound anywhere on the stack.
    pub fn assign(&mut self, name: &str, value: Var) -> bool {
        for layer in self.layers.iter_mut().rev() {
            if let Some(slot) = layer.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        false
    }

    /// `var(name)` reads the nearest binding or returns `None` (caller maps this to
    /// `Var::none()` per spec.md §4.4).
    pub fn get(&self, name: &str) -> Option<&Var> {
        for layer in self.layers.iter().rev() {
            if let Some(v) = layer.get(name) {
                return Some(v);
            }
        }
        None
    }

    /// Flattens every binding currently visible, outermost-first, for a lambda's closure
    /// snapshot (spec.md §9 "Closures without cycles" — captured **by value**, not by
    /// reference, so the closure cannot outlive-and-alias its defining frame's mutable
    /// scope). A name bound in more than one layer appears once per layer; the innermost
    /// occurrence is appended last so that [`crate`]-side lookup favoring the last match
    /// preserves shadowing.
    pub fn snapshot(&self) -> imbl::Vector<(ArcStr, Var)> {
        let mut out = imbl::Vector::new();
        for layer in self.layers.iter() {
            for (k, v) in layer.iter() {
                out.push_back((k.clone(), v.clone()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reassigns_nearest_binding_without_shadowing() {
        let mut s = Scope::new();
        s.bind("x", Var::number(1.0));
        s.push_layer();
        assert!(s.assign("x", Var::number(2.0)));
        s.pop_layer();
        assert_eq!(s.get("x"), Some(&Var::number(2.0)));
    }

    #[test]
    fn set_on_unbound_name_returns_false() {
        let mut s = Scope::new();
        assert!(!s.assign("never_let", Var::number(1.0)));
    }

    #[test]
    fn var_read_of_missing_name_is_none() {
        let s = Scope::new();
        assert_eq!(s.get("nope"), None);
    }
}
