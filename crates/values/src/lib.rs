//! The dynamic value / script-expression type shared by every crate in the loom workspace.
//!
//! A script is a tree of `Var`s (spec.md §3 "Scripts"): literals are self-evaluating, and a
//! non-empty list headed by a string is a call expression. See [`var::Var`] for the full
//! contract.

pub mod capability_ref;
pub mod lambda;
pub mod obj;
mod serde_impl;
pub mod variant;
pub mod var;

pub use capability_ref::CapabilityRef;
pub use lambda::Lambda;
pub use obj::{CapabilityId, EntityId, EntityKind};
pub use var::Var;
pub use variant::Variant;

/// Type alias for the persistent list backing `Variant::List`.
pub type List = imbl::Vector<Var>;
/// Type alias for the persistent, string-keyed map backing `Variant::Map`.
pub type Map = imbl::OrdMap<arcstr::ArcStr, Var>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(Var::bool(true).truthy());
        assert!(!Var::bool(false).truthy());
        assert!(!Var::none().truthy());
        assert!(Var::number(0.0).truthy());
        assert!(Var::str("").truthy());
    }

    #[test]
    fn as_call_recognizes_opcode_head() {
        let expr = Var::list_from(vec![Var::str("+"), Var::number(1.0), Var::number(2.0)]);
        let (name, args) = expr.as_call().expect("should be a call");
        assert_eq!(name, "+");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn bare_map_is_not_a_call() {
        let mut m = Map::new();
        m.insert("x".into(), Var::number(1.0));
        let v = Var::map(m);
        assert!(v.as_call().is_none());
    }

    #[test]
    fn json_round_trip_for_script_tree() {
        let expr = Var::list_from(vec![
            Var::str("+"),
            Var::number(1.0),
            Var::number(2.0),
            Var::list_from(vec![
                Var::str("*"),
                Var::number(4.0),
                Var::number(5.0),
            ]),
        ]);
        let json = serde_json::to_string(&expr).unwrap();
        let back: Var = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn entity_ref_round_trips_through_wire_tag() {
        let v = Var::entity(EntityId::new(42));
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("$entity"));
        let back: Var = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
