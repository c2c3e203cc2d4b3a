//! Mapping between domain entities and store records.
//!
//! A hydrator writes a domain entity into an [`EntityRecord`] of its class
//! and derives the record's unique key from domain identity. An extractor
//! reads it back. Every record is checked against its class before it leaves
//! either direction.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::concrete::ActionKind;
use crate::core::identity::composite_id;
use crate::core::model::{AbstractAction, AbstractState};
use crate::core::navigable::{NavigableAction, NavigableState};
use crate::core::sequence::{SequenceInfo, SequenceStep};
use crate::core::types::{
    ActionId, Coord3D, NavigableActionId, NavigableStateId, StateId, TagValue, TagValues,
};
use crate::io::persistence::schema::{
    ClassKind, Endpoint, EntityClass, EntityRecord, PropertyType, PropertyValue,
    abstract_action_class, abstract_state_class, navigable_action_class, navigable_state_class,
    sequence_class, sequence_step_class,
};

/// Failure to map one entity. It aborts that write only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HydrationError {
    #[error("{class}: record of class {found} given")]
    ClassMismatch { class: String, found: String },

    #[error("{class}: missing identifier property '{property}'")]
    MissingIdentifier { class: String, property: String },

    #[error("{class}: missing property '{property}'")]
    MissingProperty { class: String, property: String },

    #[error("{class}: unknown property '{property}'")]
    UnknownProperty { class: String, property: String },

    #[error("{class}.{property}: expected {expected}, found {found}")]
    TypeMismatch {
        class: String,
        property: String,
        expected: PropertyType,
        found: PropertyType,
    },

    #[error("{class}: wrong endpoint, {message}")]
    WrongEndpoint { class: String, message: String },

    #[error("{class}.{property}: {message}")]
    InvalidValue {
        class: String,
        property: String,
        message: String,
    },
}

pub trait Hydrator<T> {
    fn class(&self) -> &EntityClass;

    /// Write `domain` into `record` and set the record's unique key.
    fn hydrate(&self, record: &mut EntityRecord, domain: &T) -> Result<(), HydrationError>;

    fn to_record(&self, domain: &T) -> Result<EntityRecord, HydrationError> {
        let mut record = EntityRecord::new(self.class().name);
        self.hydrate(&mut record, domain)?;
        Ok(record)
    }
}

pub trait Extractor<T> {
    fn extract(&self, record: &EntityRecord) -> Result<T, HydrationError>;
}

pub fn abstract_state_key(model_identifier: &str, state_id: &StateId) -> String {
    composite_id(&[model_identifier, state_id.as_str()])
}

/// Edge key of an abstract action. Unexecuted actions have no target yet and
/// are keyed with an empty one.
pub fn abstract_action_key(
    source: &StateId,
    target: Option<&StateId>,
    action_id: &ActionId,
    model_identifier: &str,
) -> String {
    composite_id(&[
        source.as_str(),
        target.map_or("", StateId::as_str),
        action_id.as_str(),
        model_identifier,
    ])
}

pub fn navigable_state_key(model_identifier: &str, id: &NavigableStateId) -> String {
    composite_id(&[model_identifier, id.as_str()])
}

pub fn navigable_action_key(
    origin: &NavigableStateId,
    target: &NavigableStateId,
    abstract_action_id: &ActionId,
    model_identifier: &str,
) -> String {
    composite_id(&[
        origin.as_str(),
        target.as_str(),
        abstract_action_id.as_str(),
        model_identifier,
    ])
}

pub fn sequence_key(model_identifier: &str, sequence_id: &str) -> String {
    composite_id(&[model_identifier, sequence_id])
}

pub fn sequence_step_key(sequence_id: &str, index: usize) -> String {
    composite_id(&[sequence_id.to_string(), index.to_string()])
}

/// Check `record` against `class`: known and well-typed properties, present
/// identifiers, and endpoints only on edges, of the declared classes.
pub fn validate_record(class: &EntityClass, record: &EntityRecord) -> Result<(), HydrationError> {
    let name = class.name.to_string();
    if record.class != class.name {
        return Err(HydrationError::ClassMismatch {
            class: name,
            found: record.class.clone(),
        });
    }
    for (property, value) in &record.properties {
        let Some(declared) = class.property(property) else {
            return Err(HydrationError::UnknownProperty {
                class: name,
                property: property.clone(),
            });
        };
        if declared.kind != value.property_type() {
            return Err(HydrationError::TypeMismatch {
                class: name,
                property: property.clone(),
                expected: declared.kind,
                found: value.property_type(),
            });
        }
    }
    if let Some(missing) = class
        .identifiers()
        .find(|property| !record.properties.contains_key(property.name))
    {
        return Err(HydrationError::MissingIdentifier {
            class: name,
            property: missing.name.to_string(),
        });
    }

    match class.kind {
        ClassKind::Vertex => {
            if record.source.is_some() || record.target.is_some() {
                return Err(HydrationError::WrongEndpoint {
                    class: name,
                    message: "vertex records have no endpoints".to_string(),
                });
            }
        }
        ClassKind::Edge { from, to } => {
            let Some(source) = &record.source else {
                return Err(HydrationError::WrongEndpoint {
                    class: name,
                    message: "edge record has no source".to_string(),
                });
            };
            if source.class != from {
                return Err(HydrationError::WrongEndpoint {
                    class: name,
                    message: format!("source must be {from}, got {}", source.class),
                });
            }
            if let Some(target) = &record.target {
                if target.class != to {
                    return Err(HydrationError::WrongEndpoint {
                        class: name,
                        message: format!("target must be {to}, got {}", target.class),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Typed writes into a record, checked against the class as they happen.
struct RecordWriter<'a> {
    class: &'a EntityClass,
    record: &'a mut EntityRecord,
}

impl<'a> RecordWriter<'a> {
    fn open(class: &'a EntityClass, record: &'a mut EntityRecord) -> Result<Self, HydrationError> {
        if record.class != class.name {
            return Err(HydrationError::ClassMismatch {
                class: class.name.to_string(),
                found: record.class.clone(),
            });
        }
        Ok(Self { class, record })
    }

    fn set(&mut self, property: &str, value: PropertyValue) -> Result<(), HydrationError> {
        let Some(declared) = self.class.property(property) else {
            return Err(HydrationError::UnknownProperty {
                class: self.class.name.to_string(),
                property: property.to_string(),
            });
        };
        if declared.kind != value.property_type() {
            return Err(HydrationError::TypeMismatch {
                class: self.class.name.to_string(),
                property: property.to_string(),
                expected: declared.kind,
                found: value.property_type(),
            });
        }
        self.record.properties.insert(property.to_string(), value);
        Ok(())
    }

    fn string(&mut self, property: &str, value: &str) -> Result<(), HydrationError> {
        self.set(property, PropertyValue::String(value.to_string()))
    }

    fn count(&mut self, property: &str, value: u64) -> Result<(), HydrationError> {
        let value = i64::try_from(value).map_err(|err| self.invalid(property, err))?;
        self.set(property, PropertyValue::Integer(value))
    }

    fn json<T: Serialize>(&mut self, property: &str, value: &T) -> Result<(), HydrationError> {
        let value = serde_json::to_value(value).map_err(|err| self.invalid(property, err))?;
        self.set(property, PropertyValue::Json(value))
    }

    /// JSON has no NaN or infinity; such a value would read back as null.
    fn finite_json<T: Serialize + Finite>(
        &mut self,
        property: &str,
        value: &T,
    ) -> Result<(), HydrationError> {
        if !value.is_finite() {
            return Err(self.invalid(property, "non-finite number cannot be stored"));
        }
        self.json(property, value)
    }

    fn endpoints(&mut self, source: String, target: Option<String>) {
        if let ClassKind::Edge { from, to } = self.class.kind {
            self.record.source = Some(Endpoint {
                class: from.to_string(),
                key: source,
            });
            self.record.target = target.map(|key| Endpoint {
                class: to.to_string(),
                key,
            });
        }
    }

    fn finish(self, key: String) -> Result<(), HydrationError> {
        self.record.key = key;
        validate_record(self.class, self.record)
    }

    fn invalid(&self, property: &str, err: impl std::fmt::Display) -> HydrationError {
        HydrationError::InvalidValue {
            class: self.class.name.to_string(),
            property: property.to_string(),
            message: err.to_string(),
        }
    }
}

/// Domain values holding floating point numbers.
trait Finite {
    fn is_finite(&self) -> bool;
}

impl Finite for TagValues {
    fn is_finite(&self) -> bool {
        self.values().all(TagValue::is_finite)
    }
}

impl Finite for ActionKind {
    fn is_finite(&self) -> bool {
        match self {
            ActionKind::Explore { target } => target.is_finite(),
            _ => true,
        }
    }
}

impl Finite for BTreeSet<Coord3D> {
    fn is_finite(&self) -> bool {
        self.iter().all(Coord3D::is_finite)
    }
}

impl Finite for BTreeMap<ActionId, Coord3D> {
    fn is_finite(&self) -> bool {
        self.values().all(Coord3D::is_finite)
    }
}

/// Typed reads from a validated record.
struct RecordReader<'a> {
    class: &'a EntityClass,
    record: &'a EntityRecord,
}

impl<'a> RecordReader<'a> {
    fn open(class: &'a EntityClass, record: &'a EntityRecord) -> Result<Self, HydrationError> {
        validate_record(class, record)?;
        Ok(Self { class, record })
    }

    fn value(&self, property: &str) -> Result<&'a PropertyValue, HydrationError> {
        self.record
            .get(property)
            .ok_or_else(|| HydrationError::MissingProperty {
                class: self.class.name.to_string(),
                property: property.to_string(),
            })
    }

    fn string(&self, property: &str) -> Result<String, HydrationError> {
        match self.value(property)? {
            PropertyValue::String(value) => Ok(value.clone()),
            other => Err(self.mismatch(property, PropertyType::String, other)),
        }
    }

    fn optional_string(&self, property: &str) -> Result<Option<String>, HydrationError> {
        if self.record.get(property).is_none() {
            return Ok(None);
        }
        self.string(property).map(Some)
    }

    fn count(&self, property: &str) -> Result<u64, HydrationError> {
        match self.value(property)? {
            PropertyValue::Integer(value) => u64::try_from(*value).map_err(|err| {
                HydrationError::InvalidValue {
                    class: self.class.name.to_string(),
                    property: property.to_string(),
                    message: err.to_string(),
                }
            }),
            other => Err(self.mismatch(property, PropertyType::Integer, other)),
        }
    }

    fn boolean(&self, property: &str) -> Result<bool, HydrationError> {
        match self.value(property)? {
            PropertyValue::Boolean(value) => Ok(*value),
            other => Err(self.mismatch(property, PropertyType::Boolean, other)),
        }
    }

    fn string_set(&self, property: &str) -> Result<BTreeSet<String>, HydrationError> {
        match self.value(property)? {
            PropertyValue::StringSet(values) => Ok(values.clone()),
            other => Err(self.mismatch(property, PropertyType::StringSet, other)),
        }
    }

    fn json<T: DeserializeOwned>(&self, property: &str) -> Result<T, HydrationError> {
        match self.value(property)? {
            PropertyValue::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|err| HydrationError::InvalidValue {
                    class: self.class.name.to_string(),
                    property: property.to_string(),
                    message: err.to_string(),
                })
            }
            other => Err(self.mismatch(property, PropertyType::Json, other)),
        }
    }

    fn mismatch(
        &self,
        property: &str,
        expected: PropertyType,
        found: &PropertyValue,
    ) -> HydrationError {
        HydrationError::TypeMismatch {
            class: self.class.name.to_string(),
            property: property.to_string(),
            expected,
            found: found.property_type(),
        }
    }
}

macro_rules! mapper {
    ($(#[$meta:meta])* $name:ident, $class:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            class: EntityClass,
        }

        impl Default for $name {
            fn default() -> Self {
                Self { class: $class() }
            }
        }
    };
}

mapper!(
    /// AbstractState vertex keyed by (model identifier, state id).
    AbstractStateHydrator,
    abstract_state_class
);
mapper!(
    /// AbstractAction edge keyed by (source, target, action id, model identifier).
    AbstractActionHydrator,
    abstract_action_class
);
mapper!(NavigableStateHydrator, navigable_state_class);
mapper!(NavigableActionHydrator, navigable_action_class);
mapper!(SequenceHydrator, sequence_class);
mapper!(SequenceStepHydrator, sequence_step_class);

impl Hydrator<AbstractState> for AbstractStateHydrator {
    fn class(&self) -> &EntityClass {
        &self.class
    }

    fn hydrate(&self, record: &mut EntityRecord, state: &AbstractState) -> Result<(), HydrationError> {
        let mut writer = RecordWriter::open(&self.class, record)?;
        writer.string("stateId", state.id.as_str())?;
        writer.string("modelIdentifier", &state.model_identifier)?;
        writer.finite_json("tagValues", &state.tag_values)?;
        writer.set(
            "actionIds",
            PropertyValue::StringSet(
                state
                    .action_ids
                    .iter()
                    .map(|id| id.as_str().to_string())
                    .collect(),
            ),
        )?;
        writer.count("visitCount", state.visit_count)?;
        writer.set("isInitial", PropertyValue::Boolean(state.initial))?;
        writer.finish(abstract_state_key(&state.model_identifier, &state.id))
    }
}

impl Extractor<AbstractState> for AbstractStateHydrator {
    fn extract(&self, record: &EntityRecord) -> Result<AbstractState, HydrationError> {
        let reader = RecordReader::open(&self.class, record)?;
        Ok(AbstractState {
            id: StateId::new(reader.string("stateId")?),
            model_identifier: reader.string("modelIdentifier")?,
            tag_values: reader.json("tagValues")?,
            action_ids: reader
                .string_set("actionIds")?
                .into_iter()
                .map(ActionId::new)
                .collect(),
            visit_count: reader.count("visitCount")?,
            initial: reader.boolean("isInitial")?,
        })
    }
}

impl Hydrator<AbstractAction> for AbstractActionHydrator {
    fn class(&self) -> &EntityClass {
        &self.class
    }

    fn hydrate(
        &self,
        record: &mut EntityRecord,
        action: &AbstractAction,
    ) -> Result<(), HydrationError> {
        let model = action.model_identifier.as_str();
        let mut writer = RecordWriter::open(&self.class, record)?;
        writer.string("actionId", action.id.as_str())?;
        writer.string("modelIdentifier", model)?;
        writer.string("fingerprint", &action.fingerprint)?;
        writer.string("sourceStateId", action.source.as_str())?;
        if let Some(target) = &action.target {
            writer.string("targetStateId", target.as_str())?;
        }
        writer.string("description", &action.description)?;
        writer.finite_json("kind", &action.kind)?;
        writer.json("roles", &action.roles)?;
        writer.finite_json("tagValues", &action.tag_values)?;
        writer.count("visitCount", action.visit_count)?;
        writer.endpoints(
            abstract_state_key(model, &action.source),
            action
                .target
                .as_ref()
                .map(|target| abstract_state_key(model, target)),
        );
        writer.finish(abstract_action_key(
            &action.source,
            action.target.as_ref(),
            &action.id,
            model,
        ))
    }
}

impl Extractor<AbstractAction> for AbstractActionHydrator {
    fn extract(&self, record: &EntityRecord) -> Result<AbstractAction, HydrationError> {
        let reader = RecordReader::open(&self.class, record)?;
        Ok(AbstractAction {
            id: ActionId::new(reader.string("actionId")?),
            model_identifier: reader.string("modelIdentifier")?,
            fingerprint: reader.string("fingerprint")?,
            source: StateId::new(reader.string("sourceStateId")?),
            target: reader.optional_string("targetStateId")?.map(StateId::new),
            description: reader.string("description")?,
            kind: reader.json("kind")?,
            roles: reader.json("roles")?,
            tag_values: reader.json("tagValues")?,
            visit_count: reader.count("visitCount")?,
        })
    }
}

impl Hydrator<NavigableState> for NavigableStateHydrator {
    fn class(&self) -> &EntityClass {
        &self.class
    }

    fn hydrate(
        &self,
        record: &mut EntityRecord,
        state: &NavigableState,
    ) -> Result<(), HydrationError> {
        let mut writer = RecordWriter::open(&self.class, record)?;
        writer.string("navigableStateId", state.id.as_str())?;
        writer.string("modelIdentifier", &state.model_identifier)?;
        writer.finite_json("nodes", &state.nodes)?;
        writer.json("entities", &state.entities)?;
        writer.json("outgoing", &state.outgoing)?;
        writer.finite_json(
            "unexecutedExploratoryActions",
            &state.unexecuted_exploratory_actions,
        )?;
        writer.json("interactiveActions", &state.interactive_actions)?;
        writer.count("visitCount", state.visit_count)?;
        writer.finish(navigable_state_key(&state.model_identifier, &state.id))
    }
}

impl Extractor<NavigableState> for NavigableStateHydrator {
    fn extract(&self, record: &EntityRecord) -> Result<NavigableState, HydrationError> {
        let reader = RecordReader::open(&self.class, record)?;
        Ok(NavigableState {
            id: NavigableStateId::new(reader.string("navigableStateId")?),
            model_identifier: reader.string("modelIdentifier")?,
            nodes: reader.json("nodes")?,
            entities: reader.json("entities")?,
            outgoing: reader.json("outgoing")?,
            unexecuted_exploratory_actions: reader.json("unexecutedExploratoryActions")?,
            interactive_actions: reader.json("interactiveActions")?,
            visit_count: reader.count("visitCount")?,
        })
    }
}

impl Hydrator<NavigableAction> for NavigableActionHydrator {
    fn class(&self) -> &EntityClass {
        &self.class
    }

    fn hydrate(
        &self,
        record: &mut EntityRecord,
        action: &NavigableAction,
    ) -> Result<(), HydrationError> {
        let model = action.model_identifier.as_str();
        let mut writer = RecordWriter::open(&self.class, record)?;
        writer.string("navigableActionId", action.id.as_str())?;
        writer.string("modelIdentifier", model)?;
        writer.string("abstractActionId", action.abstract_action_id.as_str())?;
        writer.string("description", &action.description)?;
        writer.string("originId", action.origin.as_str())?;
        writer.string("targetId", action.target.as_str())?;
        writer.endpoints(
            navigable_state_key(model, &action.origin),
            Some(navigable_state_key(model, &action.target)),
        );
        writer.finish(navigable_action_key(
            &action.origin,
            &action.target,
            &action.abstract_action_id,
            model,
        ))
    }
}

impl Extractor<NavigableAction> for NavigableActionHydrator {
    fn extract(&self, record: &EntityRecord) -> Result<NavigableAction, HydrationError> {
        let reader = RecordReader::open(&self.class, record)?;
        Ok(NavigableAction {
            id: NavigableActionId::new(reader.string("navigableActionId")?),
            model_identifier: reader.string("modelIdentifier")?,
            abstract_action_id: ActionId::new(reader.string("abstractActionId")?),
            description: reader.string("description")?,
            origin: NavigableStateId::new(reader.string("originId")?),
            target: NavigableStateId::new(reader.string("targetId")?),
        })
    }
}

impl Hydrator<SequenceInfo> for SequenceHydrator {
    fn class(&self) -> &EntityClass {
        &self.class
    }

    fn hydrate(&self, record: &mut EntityRecord, info: &SequenceInfo) -> Result<(), HydrationError> {
        let mut writer = RecordWriter::open(&self.class, record)?;
        writer.string("sequenceId", &info.id)?;
        writer.string("modelIdentifier", &info.model_identifier)?;
        writer.string("startedAt", &info.started_at.to_rfc3339())?;
        writer.json("status", &info.status)?;
        writer.count("stepCount", info.step_count as u64)?;
        writer.finish(sequence_key(&info.model_identifier, &info.id))
    }
}

impl Extractor<SequenceInfo> for SequenceHydrator {
    fn extract(&self, record: &EntityRecord) -> Result<SequenceInfo, HydrationError> {
        let reader = RecordReader::open(&self.class, record)?;
        let started_at = reader.string("startedAt")?;
        Ok(SequenceInfo {
            id: reader.string("sequenceId")?,
            model_identifier: reader.string("modelIdentifier")?,
            started_at: chrono::DateTime::parse_from_rfc3339(&started_at)
                .map_err(|err| HydrationError::InvalidValue {
                    class: self.class.name.to_string(),
                    property: "startedAt".to_string(),
                    message: err.to_string(),
                })?
                .with_timezone(&chrono::Utc),
            status: reader.json("status")?,
            step_count: usize::try_from(reader.count("stepCount")?).unwrap_or(usize::MAX),
        })
    }
}

impl Hydrator<(SequenceInfo, SequenceStep)> for SequenceStepHydrator {
    fn class(&self) -> &EntityClass {
        &self.class
    }

    fn hydrate(
        &self,
        record: &mut EntityRecord,
        (sequence, step): &(SequenceInfo, SequenceStep),
    ) -> Result<(), HydrationError> {
        let mut writer = RecordWriter::open(&self.class, record)?;
        writer.string("sequenceId", &sequence.id)?;
        writer.count("index", step.index as u64)?;
        writer.string("stateId", step.state_id.as_str())?;
        writer.string("actionId", step.action_id.as_str())?;
        writer.string("description", &step.description)?;
        writer.string("timestamp", &step.timestamp.to_rfc3339())?;
        writer.endpoints(
            sequence_key(&sequence.model_identifier, &sequence.id),
            Some(abstract_state_key(
                &sequence.model_identifier,
                &step.state_id,
            )),
        );
        writer.finish(sequence_step_key(&sequence.id, step.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::concrete::ActionRole;
    use crate::core::types::ReachableEntity;

    fn state() -> AbstractState {
        let mut tags = TagValues::new();
        tags.insert("title".to_string(), TagValue::from("Lobby"));
        AbstractState {
            id: StateId::new("s1"),
            model_identifier: "model".to_string(),
            tag_values: tags,
            action_ids: BTreeSet::from([ActionId::new("a1")]),
            visit_count: 3,
            initial: true,
        }
    }

    fn action(target: Option<&str>) -> AbstractAction {
        let kind = ActionKind::Explore {
            target: Coord3D::new(1.0, 0.0, 2.0),
        };
        AbstractAction {
            id: ActionId::new("a1"),
            model_identifier: "model".to_string(),
            fingerprint: "fp".to_string(),
            source: StateId::new("s1"),
            target: target.map(StateId::new),
            description: "explore".to_string(),
            roles: kind.default_roles(),
            kind,
            tag_values: TagValues::new(),
            visit_count: 1,
        }
    }

    #[test]
    fn abstract_state_round_trips() {
        let hydrator = AbstractStateHydrator::default();
        let record = hydrator.to_record(&state()).expect("hydrate");
        assert_eq!(record.key, abstract_state_key("model", &StateId::new("s1")));
        assert_eq!(hydrator.extract(&record).expect("extract"), state());
    }

    #[test]
    fn abstract_action_round_trips_with_and_without_target() {
        let hydrator = AbstractActionHydrator::default();
        for target in [None, Some("s2")] {
            let action = action(target);
            let record = hydrator.to_record(&action).expect("hydrate");
            assert_eq!(record.target.is_some(), target.is_some());
            let back = hydrator.extract(&record).expect("extract");
            assert_eq!(back, action);
            assert!(back.roles.contains(&ActionRole::Explore));
        }
    }

    #[test]
    fn edge_key_depends_on_target() {
        let hydrator = AbstractActionHydrator::default();
        let pending = hydrator.to_record(&action(None)).expect("pending");
        let recorded = hydrator.to_record(&action(Some("s2"))).expect("recorded");
        assert_ne!(pending.key, recorded.key);
    }

    #[test]
    fn navigable_entities_round_trip() {
        let state = NavigableState {
            id: NavigableStateId::new("n1"),
            model_identifier: "model".to_string(),
            nodes: BTreeSet::from([Coord3D::new(1.0, 2.0, 3.0)]),
            entities: BTreeSet::from([ReachableEntity::new("door1", true)]),
            outgoing: BTreeMap::from([(NavigableActionId::new("na"), "walk".to_string())]),
            unexecuted_exploratory_actions: BTreeMap::from([(
                ActionId::new("e1"),
                Coord3D::new(4.0, 0.0, 0.0),
            )]),
            interactive_actions: BTreeMap::from([(ActionId::new("i1"), "button1".to_string())]),
            visit_count: 2,
        };
        let hydrator = NavigableStateHydrator::default();
        let record = hydrator.to_record(&state).expect("hydrate");
        assert_eq!(hydrator.extract(&record).expect("extract"), state);

        let action = NavigableAction {
            id: NavigableActionId::new("na"),
            model_identifier: "model".to_string(),
            abstract_action_id: ActionId::new("a1"),
            description: "walk".to_string(),
            origin: NavigableStateId::new("n1"),
            target: NavigableStateId::new("n2"),
        };
        let hydrator = NavigableActionHydrator::default();
        let record = hydrator.to_record(&action).expect("hydrate");
        assert_eq!(hydrator.extract(&record).expect("extract"), action);
    }

    #[test]
    fn non_finite_tag_value_is_rejected() {
        let hydrator = AbstractStateHydrator::default();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut state = state();
            state
                .tag_values
                .insert("speed".to_string(), TagValue::List(vec![TagValue::Float(value)]));
            let err = hydrator.to_record(&state).expect_err("non-finite");
            assert!(
                matches!(&err, HydrationError::InvalidValue { property, .. } if property == "tagValues"),
                "{err}"
            );
        }
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        let mut explore = action(None);
        explore.kind = ActionKind::Explore {
            target: Coord3D::new(f32::NAN, 0.0, 0.0),
        };
        let err = AbstractActionHydrator::default()
            .to_record(&explore)
            .expect_err("nan target");
        assert!(matches!(&err, HydrationError::InvalidValue { property, .. } if property == "kind"));

        let state = NavigableState {
            id: NavigableStateId::new("n1"),
            model_identifier: "model".to_string(),
            nodes: BTreeSet::from([Coord3D::new(0.0, f32::INFINITY, 0.0)]),
            entities: BTreeSet::new(),
            outgoing: BTreeMap::new(),
            unexecuted_exploratory_actions: BTreeMap::new(),
            interactive_actions: BTreeMap::new(),
            visit_count: 1,
        };
        let err = NavigableStateHydrator::default()
            .to_record(&state)
            .expect_err("infinite node");
        assert!(matches!(&err, HydrationError::InvalidValue { property, .. } if property == "nodes"));
    }

    #[test]
    fn unknown_property_is_rejected() {
        let hydrator = AbstractStateHydrator::default();
        let mut record = hydrator.to_record(&state()).expect("hydrate");
        record
            .properties
            .insert("color".to_string(), PropertyValue::String("red".to_string()));
        let err = hydrator.extract(&record).expect_err("unknown");
        assert!(matches!(err, HydrationError::UnknownProperty { .. }));
    }

    #[test]
    fn missing_identifier_is_rejected() {
        let hydrator = AbstractStateHydrator::default();
        let mut record = hydrator.to_record(&state()).expect("hydrate");
        record.properties.remove("stateId");
        let err = hydrator.extract(&record).expect_err("missing id");
        assert!(matches!(err, HydrationError::MissingIdentifier { .. }));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let hydrator = AbstractStateHydrator::default();
        let mut record = hydrator.to_record(&state()).expect("hydrate");
        record
            .properties
            .insert("visitCount".to_string(), PropertyValue::String("3".to_string()));
        let err = hydrator.extract(&record).expect_err("mismatch");
        assert!(matches!(err, HydrationError::TypeMismatch { .. }));
    }

    #[test]
    fn wrong_endpoint_class_is_rejected() {
        let hydrator = AbstractActionHydrator::default();
        let mut record = hydrator.to_record(&action(Some("s2"))).expect("hydrate");
        if let Some(source) = record.source.as_mut() {
            source.class = "NavigableState".to_string();
        }
        let err = hydrator.extract(&record).expect_err("endpoint");
        assert!(matches!(err, HydrationError::WrongEndpoint { .. }));
    }

    #[test]
    fn hydrating_into_record_of_other_class_fails() {
        let hydrator = AbstractStateHydrator::default();
        let mut record = EntityRecord::new("AbstractAction");
        let err = hydrator.hydrate(&mut record, &state()).expect_err("class");
        assert!(matches!(err, HydrationError::ClassMismatch { .. }));
    }
}
