//! Spatial extension of the model for 3D exploration.
//!
//! A navigable state is a position cluster: the navigable nodes and the
//! reachable entities seen from there. Its id is fixed by the first
//! observation and scoped by the model identifier; later additions only enrich
//! its attributes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{ModelError, Result};
use crate::core::events::{EventBus, ModelEvent};
use crate::core::identity::{composite_id, compute_id};
use crate::core::types::{
    ActionId, Coord3D, NavigableActionId, NavigableStateId, ReachableEntity, TagValue, TagValues,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigableState {
    pub id: NavigableStateId,
    pub model_identifier: String,
    pub nodes: BTreeSet<Coord3D>,
    pub entities: BTreeSet<ReachableEntity>,
    /// Outgoing navigable actions with their descriptions.
    pub outgoing: BTreeMap<NavigableActionId, String>,
    /// Exploratory actions seen here but not yet executed, with their movement target.
    pub unexecuted_exploratory_actions: BTreeMap<ActionId, Coord3D>,
    /// Interactive actions seen here, keyed by action, valued by entity id.
    pub interactive_actions: BTreeMap<ActionId, String>,
    pub visit_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigableAction {
    pub id: NavigableActionId,
    pub model_identifier: String,
    pub abstract_action_id: ActionId,
    pub description: String,
    pub origin: NavigableStateId,
    pub target: NavigableStateId,
}

pub struct NavigableGraph {
    model_identifier: String,
    states: BTreeMap<NavigableStateId, NavigableState>,
    actions: BTreeMap<NavigableActionId, NavigableAction>,
    bus: EventBus,
}

impl NavigableGraph {
    pub fn new(model_identifier: impl Into<String>, bus: EventBus) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            states: BTreeMap::new(),
            actions: BTreeMap::new(),
            bus,
        }
    }

    /// Id a navigable observation maps to in this model.
    pub fn navigable_state_id(
        &self,
        nodes: &BTreeSet<Coord3D>,
        entities: &BTreeSet<ReachableEntity>,
    ) -> Result<NavigableStateId> {
        let mut values = TagValues::new();
        values.insert(
            "nodes".to_string(),
            TagValue::Set(nodes.iter().copied().map(TagValue::Coord).collect()),
        );
        values.insert(
            "entities".to_string(),
            TagValue::Set(
                entities
                    .iter()
                    .map(|entity| {
                        TagValue::List(vec![
                            TagValue::from(entity.entity_id.as_str()),
                            TagValue::from(entity.active),
                        ])
                    })
                    .collect(),
            ),
        );
        let observation = compute_id(&values)?;
        Ok(NavigableStateId::new(composite_id(&[
            self.model_identifier.as_str(),
            observation.as_str(),
        ])))
    }

    /// Insert the navigable state for this observation if new and count one visit.
    pub fn upsert_navigable_state(
        &mut self,
        nodes: BTreeSet<Coord3D>,
        entities: BTreeSet<ReachableEntity>,
    ) -> Result<&NavigableState> {
        let id = self.navigable_state_id(&nodes, &entities)?;
        let created = !self.states.contains_key(&id);
        let state = self
            .states
            .entry(id.clone())
            .or_insert_with(|| NavigableState {
                id: id.clone(),
                model_identifier: self.model_identifier.clone(),
                nodes,
                entities,
                outgoing: BTreeMap::new(),
                unexecuted_exploratory_actions: BTreeMap::new(),
                interactive_actions: BTreeMap::new(),
                visit_count: 0,
            });
        state.visit_count += 1;
        let snapshot = state.clone();

        debug!(navigable_state = %id, created, "navigable state upserted");
        if created {
            self.bus.emit(&ModelEvent::NavigableStateAdded(snapshot));
        } else {
            self.bus.emit(&ModelEvent::NavigableStateChanged(snapshot));
        }
        self.state(&id)
    }

    pub fn add_reachable_entity(
        &mut self,
        state_id: &NavigableStateId,
        entity_id: &str,
        active: bool,
    ) -> Result<()> {
        self.modify(state_id, |state| {
            state
                .entities
                .insert(ReachableEntity::new(entity_id, active))
        })
    }

    pub fn add_navigable_nodes(
        &mut self,
        state_id: &NavigableStateId,
        nodes: impl IntoIterator<Item = Coord3D>,
    ) -> Result<()> {
        self.modify(state_id, |state| {
            let before = state.nodes.len();
            state.nodes.extend(nodes);
            state.nodes.len() != before
        })
    }

    pub fn add_unexecuted_exploratory_action(
        &mut self,
        state_id: &NavigableStateId,
        action_id: &ActionId,
        target: Coord3D,
    ) -> Result<()> {
        self.modify(state_id, |state| {
            state
                .unexecuted_exploratory_actions
                .insert(action_id.clone(), target)
                != Some(target)
        })
    }

    /// Forget a pending exploratory action once it has been executed.
    pub fn remove_executed_exploratory_action(
        &mut self,
        state_id: &NavigableStateId,
        action_id: &ActionId,
    ) -> Result<bool> {
        let mut removed = false;
        self.modify(state_id, |state| {
            removed = state
                .unexecuted_exploratory_actions
                .remove(action_id)
                .is_some();
            removed
        })?;
        Ok(removed)
    }

    pub fn add_interactive_action(
        &mut self,
        state_id: &NavigableStateId,
        action_id: &ActionId,
        entity_id: &str,
    ) -> Result<()> {
        self.modify(state_id, |state| {
            state
                .interactive_actions
                .insert(action_id.clone(), entity_id.to_string())
                .as_deref()
                != Some(entity_id)
        })
    }

    /// Exploratory actions of `state_id` that were never executed.
    pub fn pending_exploratory_targets(
        &self,
        state_id: &NavigableStateId,
    ) -> Result<BTreeMap<ActionId, Coord3D>> {
        Ok(self.state(state_id)?.unexecuted_exploratory_actions.clone())
    }

    /// Record the movement `abstract_action_id` made from `source` to `target`.
    ///
    /// Re-recording an existing edge with the same description returns the
    /// stored edge. A different description is rejected and the stored record
    /// is kept.
    pub fn record_navigable_transition(
        &mut self,
        source: &NavigableStateId,
        target: &NavigableStateId,
        abstract_action_id: &ActionId,
        description: &str,
    ) -> Result<&NavigableAction> {
        self.state(source)?;
        self.state(target)?;
        let id = NavigableActionId::new(composite_id(&[
            source.as_str(),
            target.as_str(),
            abstract_action_id.as_str(),
            self.model_identifier.as_str(),
        ]));

        if self.actions.contains_key(&id) {
            let existing = &self.actions[&id];
            if existing.description != description {
                warn!(navigable_action = %id, "navigable action re-recorded with another description");
                return Err(ModelError::conflict(
                    "navigable action",
                    id.as_str(),
                    existing.description.as_str(),
                    description,
                ));
            }
            return Ok(existing);
        }

        let action = NavigableAction {
            id: id.clone(),
            model_identifier: self.model_identifier.clone(),
            abstract_action_id: abstract_action_id.clone(),
            description: description.to_string(),
            origin: source.clone(),
            target: target.clone(),
        };
        self.actions.insert(id.clone(), action.clone());
        self.modify(source, |state| {
            state.outgoing.insert(id.clone(), description.to_string());
            true
        })?;

        debug!(navigable_action = %id, origin = %source, target = %target, "navigable transition recorded");
        self.bus.emit(&ModelEvent::NavigableTransitionAdded {
            source: self.state(source)?.clone(),
            action: action.clone(),
            target: self.state(target)?.clone(),
        });
        Ok(self.actions.entry(id).or_insert(action))
    }

    pub fn state(&self, id: &NavigableStateId) -> Result<&NavigableState> {
        self.states
            .get(id)
            .ok_or_else(|| ModelError::NavigableStateNotFound(id.clone()))
    }

    pub fn action(&self, id: &NavigableActionId) -> Option<&NavigableAction> {
        self.actions.get(id)
    }

    pub fn states(&self) -> impl Iterator<Item = &NavigableState> {
        self.states.values()
    }

    pub fn actions(&self) -> impl Iterator<Item = &NavigableAction> {
        self.actions.values()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Apply `change` and publish the state if it reports a modification.
    fn modify<F>(&mut self, state_id: &NavigableStateId, change: F) -> Result<()>
    where
        F: FnOnce(&mut NavigableState) -> bool,
    {
        let state = self
            .states
            .get_mut(state_id)
            .ok_or_else(|| ModelError::NavigableStateNotFound(state_id.clone()))?;
        if change(state) {
            let snapshot = state.clone();
            self.bus.emit(&ModelEvent::NavigableStateChanged(snapshot));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{EventLog, ModelEventKind};
    use std::sync::Arc;

    fn graph(model: &str) -> (NavigableGraph, Arc<EventLog>) {
        let log = Arc::new(EventLog::default());
        let mut bus = EventBus::default();
        bus.subscribe(log.clone());
        (NavigableGraph::new(model, bus), log)
    }

    fn nodes(points: &[(f32, f32, f32)]) -> BTreeSet<Coord3D> {
        points
            .iter()
            .map(|(x, y, z)| Coord3D::new(*x, *y, *z))
            .collect()
    }

    fn entities(pairs: &[(&str, bool)]) -> BTreeSet<ReachableEntity> {
        pairs
            .iter()
            .map(|(id, active)| ReachableEntity::new(*id, *active))
            .collect()
    }

    #[test]
    fn identical_observations_in_two_models_get_distinct_ids() {
        let (mut one, _) = graph("model-a");
        let (mut two, _) = graph("model-b");
        let observed = nodes(&[(1.0, 0.0, 1.0)]);
        let seen = entities(&[("door1", false)]);

        let a = one
            .upsert_navigable_state(observed.clone(), seen.clone())
            .expect("a")
            .id
            .clone();
        let b = two
            .upsert_navigable_state(observed, seen)
            .expect("b")
            .id
            .clone();
        assert_ne!(a, b);
    }

    #[test]
    fn enrichment_keeps_the_creation_id() {
        let (mut graph, log) = graph("model");
        let id = graph
            .upsert_navigable_state(nodes(&[(0.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("upsert")
            .id
            .clone();

        graph
            .add_navigable_nodes(&id, nodes(&[(2.0, 0.0, 0.0)]))
            .expect("nodes");
        graph
            .add_reachable_entity(&id, "button1", true)
            .expect("entity");

        let state = graph.state(&id).expect("state");
        assert_eq!(state.id, id);
        assert_eq!(state.nodes.len(), 2);
        assert_eq!(state.entities.len(), 1);
        assert_eq!(log.count(ModelEventKind::NavigableStateChanged), 2);
    }

    #[test]
    fn adding_a_known_node_publishes_nothing() {
        let (mut graph, log) = graph("model");
        let id = graph
            .upsert_navigable_state(nodes(&[(0.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("upsert")
            .id
            .clone();
        log.clear();
        graph
            .add_navigable_nodes(&id, nodes(&[(0.0, 0.0, 0.0)]))
            .expect("nodes");
        assert!(log.events().is_empty());
    }

    #[test]
    fn same_move_from_two_positions_gives_two_actions() {
        let (mut graph, _) = graph("model");
        let a = graph
            .upsert_navigable_state(nodes(&[(0.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("a")
            .id
            .clone();
        let b = graph
            .upsert_navigable_state(nodes(&[(5.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("b")
            .id
            .clone();
        let c = graph
            .upsert_navigable_state(nodes(&[(9.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("c")
            .id
            .clone();
        let step = ActionId::new("move-east");

        let ab = graph
            .record_navigable_transition(&a, &b, &step, "east")
            .expect("ab")
            .id
            .clone();
        let bc = graph
            .record_navigable_transition(&b, &c, &step, "east")
            .expect("bc")
            .id
            .clone();
        assert_ne!(ab, bc);
        assert_eq!(graph.action_count(), 2);
        assert!(graph.state(&a).expect("a").outgoing.contains_key(&ab));
    }

    #[test]
    fn re_recorded_edge_with_new_description_is_rejected() {
        let (mut graph, _) = graph("model");
        let a = graph
            .upsert_navigable_state(nodes(&[(0.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("a")
            .id
            .clone();
        let b = graph
            .upsert_navigable_state(nodes(&[(1.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("b")
            .id
            .clone();
        let step = ActionId::new("step");

        graph
            .record_navigable_transition(&a, &b, &step, "walk")
            .expect("first");
        graph
            .record_navigable_transition(&a, &b, &step, "walk")
            .expect("same description is idempotent");
        let err = graph
            .record_navigable_transition(&a, &b, &step, "run")
            .expect_err("conflict");
        assert!(matches!(err, ModelError::IdentityConflict { .. }));
        let stored = graph.actions().next().expect("stored");
        assert_eq!(stored.description, "walk");
    }

    #[test]
    fn pending_exploratory_targets_track_execution() {
        let (mut graph, _) = graph("model");
        let id = graph
            .upsert_navigable_state(nodes(&[(0.0, 0.0, 0.0)]), BTreeSet::new())
            .expect("upsert")
            .id
            .clone();
        let explore = ActionId::new("explore-1");
        graph
            .add_unexecuted_exploratory_action(&id, &explore, Coord3D::new(3.0, 0.0, 4.0))
            .expect("add");
        assert_eq!(
            graph.pending_exploratory_targets(&id).expect("pending").len(),
            1
        );

        assert!(graph
            .remove_executed_exploratory_action(&id, &explore)
            .expect("remove"));
        assert!(graph
            .pending_exploratory_targets(&id)
            .expect("pending")
            .is_empty());
    }

    #[test]
    fn unknown_navigable_state_is_not_found() {
        let (mut graph, _) = graph("model");
        let err = graph
            .add_reachable_entity(&NavigableStateId::new("nope"), "door", true)
            .expect_err("unknown");
        assert!(err.is_not_found());
    }
}
