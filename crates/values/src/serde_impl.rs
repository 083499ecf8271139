//! Custom (de)serialization so that a `Var` round-trips through plain JSON exactly as
//! spec.md §6 "Script representation" requires: literals and calls serialize as the obvious
//! JSON primitive/array/object, with no wrapper envelope. Runtime-only variants that have no
//! JSON-native shape (entity references, lambdas, capability references) use a small tagged
//! object convention so they can still cross the wire in notifications (spec.md §6).

use crate::capability_ref::CapabilityRef;
use crate::obj::EntityId;
use crate::var::Var;
use crate::variant::Variant;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const ENTITY_TAG: &str = "$entity";
const CAPABILITY_TAG: &str = "$capability";

impl Serialize for Var {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.variant() {
            Variant::None => serializer.serialize_none(),
            Variant::Bool(b) => serializer.serialize_bool(*b),
            Variant::Number(n) => serializer.serialize_f64(*n),
            Variant::Str(s) => serializer.serialize_str(s.as_str()),
            Variant::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Variant::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m.iter() {
                    map.serialize_entry(k.as_str(), v)?;
                }
                map.end()
            }
            Variant::Entity(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(ENTITY_TAG, &id.0)?;
                map.end()
            }
            Variant::Capability(cap) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(CAPABILITY_TAG, cap)?;
                map.end()
            }
            Variant::Lambda(_) => Err(serde::ser::Error::custom(
                "lambda values cannot be serialized across the wire",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Var {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(VarVisitor)
    }
}

struct VarVisitor;

impl<'de> Visitor<'de> for VarVisitor {
    type Value = Var;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON null, bool, number, string, array, or object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Var, E> {
        Ok(Var::none())
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Var, E> {
        Ok(Var::bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Var, E> {
        Ok(Var::number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Var, E> {
        Ok(Var::number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Var, E> {
        Ok(Var::number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Var, E> {
        Ok(Var::str(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Var, E> {
        Ok(Var::str(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Var, A::Error> {
        let mut items = imbl::Vector::new();
        while let Some(item) = seq.next_element::<Var>()? {
            items.push_back(item);
        }
        Ok(Var::list(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Var, A::Error> {
        let mut entries: Vec<(String, Var)> = Vec::new();
        while let Some((k, v)) = access.next_entry::<String, Var>()? {
            entries.push((k, v));
        }
        if entries.len() == 1 {
            if entries[0].0 == ENTITY_TAG {
                if let Some(n) = entries[0].1.as_number() {
                    return Ok(Var::entity(EntityId::new(n as i64)));
                }
            }
            if entries[0].0 == CAPABILITY_TAG {
                // Re-decode the inner value as a CapabilityRef via a JSON value round trip.
                let json = serde_json::to_value(&entries[0].1)
                    .map_err(|e| de::Error::custom(e.to_string()))?;
                let cap: CapabilityRef =
                    serde_json::from_value(json).map_err(|e| de::Error::custom(e.to_string()))?;
                return Ok(Var::capability(cap));
            }
        }
        let mut m = imbl::OrdMap::new();
        for (k, v) in entries {
            m.insert(arcstr::ArcStr::from(k), v);
        }
        Ok(Var::map(m))
    }
}
