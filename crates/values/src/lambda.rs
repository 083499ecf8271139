use crate::var::Var;
use arcstr::ArcStr;

/// A closure value: `lambda(names, body)` (spec.md §4.4 "Lambdas").
///
/// The enclosing scope is snapshotted **by value** at construction time (spec.md §9
/// "Closures without cycles") so that a `Lambda` can outlive the frame that created it without
/// holding a live reference back into that frame's mutable scope chain.
#[derive(Clone, Debug)]
pub struct Lambda {
    pub params: Vec<ArcStr>,
    pub body: Var,
    /// Flattened snapshot of every binding visible at creation time, innermost-first.
    /// Looking up a captured variable is a linear scan; closures are small in practice.
    pub captured: imbl::Vector<(ArcStr, Var)>,
}

impl Lambda {
    pub fn new(params: Vec<ArcStr>, body: Var, captured: imbl::Vector<(ArcStr, Var)>) -> Self {
        Lambda {
            params,
            body,
            captured,
        }
    }

    pub fn lookup_captured(&self, name: &str) -> Option<&Var> {
        self.captured.iter().rev().find(|(n, _)| n.as_str() == name).map(|(_, v)| v)
    }
}

// Lambdas are compared by identity only: two distinct closures are never `==`, even with
// identical source, mirroring how function values behave in most dynamic languages.
impl PartialEq for Lambda {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
