//! Typed property schema of the backing store.
//!
//! Every persisted entity is an [`EntityRecord`] of one [`EntityClass`]:
//! vertices for states and sequences, edges for actions. Records carry a
//! store-level unique key derived from domain identity, never from insertion
//! order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

pub const ABSTRACT_STATE: &str = "AbstractState";
pub const ABSTRACT_ACTION: &str = "AbstractAction";
pub const NAVIGABLE_STATE: &str = "NavigableState";
pub const NAVIGABLE_ACTION: &str = "NavigableAction";
pub const SEQUENCE: &str = "Sequence";
pub const SEQUENCE_STEP: &str = "SequenceStep";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    StringSet,
    /// Structured value kept as embedded JSON.
    Json,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::StringSet => "string_set",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    StringSet(BTreeSet<String>),
    Json(serde_json::Value),
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Integer(_) => PropertyType::Integer,
            Self::Float(_) => PropertyType::Float,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::StringSet(_) => PropertyType::StringSet,
            Self::Json(_) => PropertyType::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: &'static str,
    pub kind: PropertyType,
    /// Part of the domain identity; must be present on every record.
    pub identifier: bool,
}

impl Property {
    const fn new(name: &'static str, kind: PropertyType) -> Self {
        Self {
            name,
            kind,
            identifier: false,
        }
    }

    const fn id(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyType::String,
            identifier: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Vertex,
    Edge {
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityClass {
    pub name: &'static str,
    pub kind: ClassKind,
    pub properties: Vec<Property>,
}

impl EntityClass {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|property| property.identifier)
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, ClassKind::Edge { .. })
    }
}

/// Reference from an edge record to one of its endpoint vertices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub class: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub class: String,
    /// Store-level unique key within the class.
    pub key: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Endpoint>,
}

impl EntityRecord {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            key: String::new(),
            properties: BTreeMap::new(),
            source: None,
            target: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

pub fn abstract_state_class() -> EntityClass {
    EntityClass {
        name: ABSTRACT_STATE,
        kind: ClassKind::Vertex,
        properties: vec![
            Property::id("stateId"),
            Property::id("modelIdentifier"),
            Property::new("tagValues", PropertyType::Json),
            Property::new("actionIds", PropertyType::StringSet),
            Property::new("visitCount", PropertyType::Integer),
            Property::new("isInitial", PropertyType::Boolean),
        ],
    }
}

pub fn abstract_action_class() -> EntityClass {
    EntityClass {
        name: ABSTRACT_ACTION,
        kind: ClassKind::Edge {
            from: ABSTRACT_STATE,
            to: ABSTRACT_STATE,
        },
        properties: vec![
            Property::id("actionId"),
            Property::id("modelIdentifier"),
            Property::new("fingerprint", PropertyType::String),
            Property::new("sourceStateId", PropertyType::String),
            Property::new("targetStateId", PropertyType::String),
            Property::new("description", PropertyType::String),
            Property::new("kind", PropertyType::Json),
            Property::new("roles", PropertyType::Json),
            Property::new("tagValues", PropertyType::Json),
            Property::new("visitCount", PropertyType::Integer),
        ],
    }
}

pub fn navigable_state_class() -> EntityClass {
    EntityClass {
        name: NAVIGABLE_STATE,
        kind: ClassKind::Vertex,
        properties: vec![
            Property::id("navigableStateId"),
            Property::id("modelIdentifier"),
            Property::new("nodes", PropertyType::Json),
            Property::new("entities", PropertyType::Json),
            Property::new("outgoing", PropertyType::Json),
            Property::new("unexecutedExploratoryActions", PropertyType::Json),
            Property::new("interactiveActions", PropertyType::Json),
            Property::new("visitCount", PropertyType::Integer),
        ],
    }
}

pub fn navigable_action_class() -> EntityClass {
    EntityClass {
        name: NAVIGABLE_ACTION,
        kind: ClassKind::Edge {
            from: NAVIGABLE_STATE,
            to: NAVIGABLE_STATE,
        },
        properties: vec![
            Property::id("navigableActionId"),
            Property::id("modelIdentifier"),
            Property::new("abstractActionId", PropertyType::String),
            Property::new("description", PropertyType::String),
            Property::new("originId", PropertyType::String),
            Property::new("targetId", PropertyType::String),
        ],
    }
}

pub fn sequence_class() -> EntityClass {
    EntityClass {
        name: SEQUENCE,
        kind: ClassKind::Vertex,
        properties: vec![
            Property::id("sequenceId"),
            Property::id("modelIdentifier"),
            Property::new("startedAt", PropertyType::String),
            Property::new("status", PropertyType::Json),
            Property::new("stepCount", PropertyType::Integer),
        ],
    }
}

pub fn sequence_step_class() -> EntityClass {
    EntityClass {
        name: SEQUENCE_STEP,
        kind: ClassKind::Edge {
            from: SEQUENCE,
            to: ABSTRACT_STATE,
        },
        properties: vec![
            Property::id("sequenceId"),
            Property::new("index", PropertyType::Integer),
            Property::new("stateId", PropertyType::String),
            Property::new("actionId", PropertyType::String),
            Property::new("description", PropertyType::String),
            Property::new("timestamp", PropertyType::String),
        ],
    }
}

/// Every class the persistence layer writes.
pub fn classes() -> Vec<EntityClass> {
    vec![
        abstract_state_class(),
        abstract_action_class(),
        navigable_state_class(),
        navigable_action_class(),
        sequence_class(),
        sequence_step_class(),
    ]
}
