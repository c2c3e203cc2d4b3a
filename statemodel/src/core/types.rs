//! Shared value types for the state model core.
//!
//! Everything here is plain data: identifiers, tag values, and spatial
//! coordinates. Equality and ordering must be total and stable because these
//! values feed identity hashing and ordered collections.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

id_type!(
    /// Identity of an [`AbstractState`](crate::core::model::AbstractState).
    StateId
);
id_type!(
    /// Identity of an [`AbstractAction`](crate::core::model::AbstractAction), scoped to its source state.
    ActionId
);
id_type!(
    /// Identity of a [`NavigableState`](crate::core::navigable::NavigableState).
    NavigableStateId
);
id_type!(
    /// Identity of a [`NavigableAction`](crate::core::navigable::NavigableAction).
    NavigableActionId
);

/// Identity-defining tag values, keyed by tag name.
///
/// The `BTreeMap` gives a canonical iteration order, so the order in which a
/// collaborator inserted the tags never reaches the hash.
pub type TagValues = BTreeMap<String, TagValue>;

/// A single observable attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TagValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Coord(Coord3D),
    /// Unordered collection. Element order is normalized before hashing.
    Set(Vec<TagValue>),
    /// Ordered collection. Element order is part of the identity.
    List(Vec<TagValue>),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl TagValue {
    /// False when any number inside is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(value) => value.is_finite(),
            Self::Coord(coord) => coord.is_finite(),
            Self::Set(values) | Self::List(values) => values.iter().all(TagValue::is_finite),
            Self::Text(_) | Self::Integer(_) | Self::Boolean(_) => true,
        }
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Coord3D> for TagValue {
    fn from(value: Coord3D) -> Self {
        Self::Coord(value)
    }
}

/// A point in the SUT's 3D space.
///
/// Equality, ordering and hashing use the bit patterns of the components with
/// `-0.0` folded into `0.0` and every NaN folded into one canonical NaN, so
/// coordinates can live in ordered sets and hash deterministically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coord3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Coord3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn distance(&self, other: &Coord3D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub(crate) fn canonical_bits(&self) -> [u32; 3] {
        [
            canonical_f32(self.x),
            canonical_f32(self.y),
            canonical_f32(self.z),
        ]
    }
}

fn canonical_f32(value: f32) -> u32 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f32::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for Coord3D {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for Coord3D {}

impl Hash for Coord3D {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

impl PartialOrd for Coord3D {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Coord3D {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.canonical_bits().map(f32::from_bits);
        let right = other.canonical_bits().map(f32::from_bits);
        left[0]
            .total_cmp(&right[0])
            .then_with(|| left[1].total_cmp(&right[1]))
            .then_with(|| left[2].total_cmp(&right[2]))
    }
}

impl fmt::Display for Coord3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{},{}>", self.x, self.y, self.z)
    }
}

/// An interactive entity reachable from a navigable position, with its
/// activity flag at observation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReachableEntity {
    pub entity_id: String,
    pub active: bool,
}

impl ReachableEntity {
    pub fn new(entity_id: impl Into<String>, active: bool) -> Self {
        Self {
            entity_id: entity_id.into(),
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn coord_equality_folds_negative_zero() {
        assert_eq!(Coord3D::new(0.0, 1.0, 2.0), Coord3D::new(-0.0, 1.0, 2.0));
    }

    #[test]
    fn coord_ordering_is_consistent_with_equality() {
        let set: BTreeSet<Coord3D> = [
            Coord3D::new(1.0, 0.0, 0.0),
            Coord3D::new(-0.0, 0.0, 0.0),
            Coord3D::new(0.0, 0.0, 0.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.first(), Some(&Coord3D::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn tag_value_serializes_with_type_tag() {
        let json = serde_json::to_string(&TagValue::from(3_i64)).expect("serialize");
        assert_eq!(json, r#"{"type":"integer","value":3}"#);
    }
}
