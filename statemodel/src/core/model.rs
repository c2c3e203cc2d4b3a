//! In-memory abstract state model: states are nodes, actions are edges.
//!
//! All writes are upserts keyed by identity. Every mutation is published on
//! the model's [`EventBus`] after it has been applied, so listeners always see
//! a state consistent with the event.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::abstraction::AbstractionConfig;
use crate::core::concrete::{ActionKind, ActionRole, ConcreteAction, ConcreteState};
use crate::core::error::{ModelError, Result};
use crate::core::events::{EventBus, ModelEvent};
use crate::core::identity::{composite_id, compute_id};
use crate::core::navigable::NavigableGraph;
use crate::core::types::{ActionId, StateId, TagValues};

/// Identity-deduplicated node of the exploration graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractState {
    pub id: StateId,
    pub model_identifier: String,
    /// Tag values the id was derived from. Never rewritten after creation.
    pub tag_values: TagValues,
    pub action_ids: BTreeSet<ActionId>,
    pub visit_count: u64,
    /// Set once the state has started at least one sequence.
    pub initial: bool,
}

/// Identity-deduplicated edge of the exploration graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractAction {
    pub id: ActionId,
    pub model_identifier: String,
    /// Hash of the action tags alone; equal for the same command in any state.
    pub fingerprint: String,
    pub source: StateId,
    /// Unknown until the action has been executed and the next state observed.
    pub target: Option<StateId>,
    pub description: String,
    pub kind: ActionKind,
    pub roles: BTreeSet<ActionRole>,
    pub tag_values: TagValues,
    pub visit_count: u64,
}

impl AbstractAction {
    pub fn is_visited(&self) -> bool {
        self.visit_count > 0
    }
}

/// Result of [`AbstractStateModel::record_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Recorded,
    /// The same target was already recorded; nothing changed.
    AlreadyRecorded,
}

/// Counts used by reports and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub states: usize,
    pub actions: usize,
    pub transitions: usize,
    pub unvisited_actions: usize,
    pub navigable_states: usize,
    pub navigable_actions: usize,
}

/// A model shared between a decision loop and its readers.
pub type SharedModel = Arc<RwLock<AbstractStateModel>>;

pub struct AbstractStateModel {
    model_identifier: String,
    abstraction: AbstractionConfig,
    states: BTreeMap<StateId, AbstractState>,
    actions: BTreeMap<ActionId, AbstractAction>,
    navigable: NavigableGraph,
    bus: EventBus,
}

impl AbstractStateModel {
    pub fn new(
        model_identifier: impl Into<String>,
        abstraction: AbstractionConfig,
        bus: EventBus,
    ) -> Self {
        let model_identifier = model_identifier.into();
        Self {
            navigable: NavigableGraph::new(model_identifier.clone(), bus.clone()),
            model_identifier,
            abstraction,
            states: BTreeMap::new(),
            actions: BTreeMap::new(),
            bus,
        }
    }

    pub fn into_shared(self) -> SharedModel {
        Arc::new(RwLock::new(self))
    }

    pub fn model_identifier(&self) -> &str {
        &self.model_identifier
    }

    pub fn abstraction(&self) -> &AbstractionConfig {
        &self.abstraction
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn navigable(&self) -> &NavigableGraph {
        &self.navigable
    }

    pub fn navigable_mut(&mut self) -> &mut NavigableGraph {
        &mut self.navigable
    }

    /// Insert the state for `values` if new and count one visit.
    pub fn upsert_state(&mut self, values: TagValues) -> Result<&AbstractState> {
        let id = StateId::new(compute_id(&values)?);
        let created = !self.states.contains_key(&id);
        let state = self.states.entry(id.clone()).or_insert_with(|| AbstractState {
            id: id.clone(),
            model_identifier: self.model_identifier.clone(),
            tag_values: values,
            action_ids: BTreeSet::new(),
            visit_count: 0,
            initial: false,
        });
        state.visit_count += 1;
        let snapshot = state.clone();

        debug!(state = %id, visits = snapshot.visit_count, created, "state upserted");
        if created {
            self.bus.emit(&ModelEvent::StateAdded(snapshot));
        } else {
            self.bus.emit(&ModelEvent::StateChanged(snapshot));
        }
        self.state(&id)
    }

    /// Abstract a concrete observation through the configured state tags.
    pub fn upsert_concrete_state(&mut self, state: &ConcreteState) -> Result<&AbstractState> {
        let values = self.abstraction.state_values(state);
        self.upsert_state(values)
    }

    /// Insert an action available in `source` if new. Existing actions are returned unchanged.
    pub fn upsert_action(
        &mut self,
        source: &StateId,
        values: TagValues,
        description: &str,
    ) -> Result<&AbstractAction> {
        let kind = ActionKind::Command;
        let roles = kind.default_roles();
        self.insert_action(source, values, description, kind, roles)
    }

    /// Abstract a concrete action through the configured action tags.
    pub fn upsert_concrete_action(
        &mut self,
        source: &StateId,
        action: &ConcreteAction,
    ) -> Result<&AbstractAction> {
        let values = self.abstraction.action_values(action);
        self.insert_action(
            source,
            values,
            &action.description,
            action.kind.clone(),
            action.roles.clone(),
        )
    }

    /// Id the action would have in `source`, without touching the model.
    pub fn action_id_for(&self, source: &StateId, action: &ConcreteAction) -> Result<ActionId> {
        let fingerprint = compute_id(&self.abstraction.action_values(action))?;
        Ok(scoped_action_id(source, &fingerprint))
    }

    fn insert_action(
        &mut self,
        source: &StateId,
        values: TagValues,
        description: &str,
        kind: ActionKind,
        roles: BTreeSet<ActionRole>,
    ) -> Result<&AbstractAction> {
        if !self.states.contains_key(source) {
            return Err(ModelError::unknown_state("upsert_action", source));
        }
        let fingerprint = compute_id(&values)?;
        let id = scoped_action_id(source, &fingerprint);

        if !self.actions.contains_key(&id) {
            let action = AbstractAction {
                id: id.clone(),
                model_identifier: self.model_identifier.clone(),
                fingerprint,
                source: source.clone(),
                target: None,
                description: description.to_string(),
                kind,
                roles,
                tag_values: values,
                visit_count: 0,
            };
            self.actions.insert(id.clone(), action.clone());
            debug!(action = %id, state = %source, "action added");
            self.bus.emit(&ModelEvent::ActionAdded(action));
        }

        let registered = self
            .states
            .get_mut(source)
            .map(|state| state.action_ids.insert(id.clone()))
            .unwrap_or(false);
        if registered {
            if let Some(state) = self.states.get(source) {
                self.bus.emit(&ModelEvent::StateChanged(state.clone()));
            }
        }
        self.action(&id)
    }

    /// Fill in the target of an executed action.
    ///
    /// A target is set at most once. Recording a different target is an
    /// [`ModelError::IdentityConflict`]: the abstraction is not deterministic
    /// for this action, and the first recording is kept.
    pub fn record_transition(
        &mut self,
        action_id: &ActionId,
        target: &StateId,
    ) -> Result<TransitionOutcome> {
        if !self.states.contains_key(target) {
            return Err(ModelError::unknown_state("record_transition", target));
        }
        let action = self
            .actions
            .get_mut(action_id)
            .ok_or_else(|| ModelError::ActionNotFound(action_id.clone()))?;

        match &action.target {
            Some(existing) if existing == target => return Ok(TransitionOutcome::AlreadyRecorded),
            Some(existing) => {
                warn!(action = %action_id, existing = %existing, attempted = %target, "non-deterministic transition");
                return Err(ModelError::conflict(
                    "action",
                    action_id.as_str(),
                    existing.as_str(),
                    target.as_str(),
                ));
            }
            None => action.target = Some(target.clone()),
        }

        let action = action.clone();
        let source = self.state(&action.source)?.clone();
        let target = self.state(target)?.clone();
        debug!(action = %action.id, source = %source.id, target = %target.id, "transition recorded");
        self.bus.emit(&ModelEvent::TransitionAdded {
            source,
            action,
            target,
        });
        Ok(TransitionOutcome::Recorded)
    }

    /// Count one execution of `action_id`.
    pub fn mark_visited(&mut self, action_id: &ActionId) -> Result<&AbstractAction> {
        let action = self
            .actions
            .get_mut(action_id)
            .ok_or_else(|| ModelError::ActionNotFound(action_id.clone()))?;
        action.visit_count += 1;
        let snapshot = action.clone();
        self.bus.emit(&ModelEvent::ActionChanged(snapshot));
        self.action(action_id)
    }

    pub fn mark_initial(&mut self, state_id: &StateId) -> Result<()> {
        let state = self
            .states
            .get_mut(state_id)
            .ok_or_else(|| ModelError::StateNotFound(state_id.clone()))?;
        if !state.initial {
            state.initial = true;
            let snapshot = state.clone();
            self.bus.emit(&ModelEvent::StateChanged(snapshot));
        }
        Ok(())
    }

    pub fn state(&self, id: &StateId) -> Result<&AbstractState> {
        self.states
            .get(id)
            .ok_or_else(|| ModelError::StateNotFound(id.clone()))
    }

    pub fn action(&self, id: &ActionId) -> Result<&AbstractAction> {
        self.actions
            .get(id)
            .ok_or_else(|| ModelError::ActionNotFound(id.clone()))
    }

    pub fn states(&self) -> impl Iterator<Item = &AbstractState> {
        self.states.values()
    }

    pub fn actions(&self) -> impl Iterator<Item = &AbstractAction> {
        self.actions.values()
    }

    /// Actions known to exist in `state_id`, in id order.
    pub fn actions_of(&self, state_id: &StateId) -> Result<Vec<&AbstractAction>> {
        let state = self.state(state_id)?;
        Ok(state
            .action_ids
            .iter()
            .filter_map(|id| self.actions.get(id))
            .collect())
    }

    /// Actions of `state_id` that have never been executed.
    pub fn unvisited_actions(&self, state_id: &StateId) -> Result<BTreeSet<ActionId>> {
        Ok(self
            .actions_of(state_id)?
            .into_iter()
            .filter(|action| !action.is_visited())
            .map(|action| action.id.clone())
            .collect())
    }

    /// Recorded transitions leaving `state_id` as `(action, target)` pairs.
    pub fn outgoing(&self, state_id: &StateId) -> Result<Vec<(&AbstractAction, &StateId)>> {
        Ok(self
            .actions_of(state_id)?
            .into_iter()
            .filter_map(|action| action.target.as_ref().map(|target| (action, target)))
            .collect())
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            states: self.states.len(),
            actions: self.actions.len(),
            transitions: self.actions.values().filter(|a| a.target.is_some()).count(),
            unvisited_actions: self.actions.values().filter(|a| !a.is_visited()).count(),
            navigable_states: self.navigable.state_count(),
            navigable_actions: self.navigable.action_count(),
        }
    }
}

fn scoped_action_id(source: &StateId, fingerprint: &str) -> ActionId {
    ActionId::new(composite_id(&[source.as_str(), fingerprint]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{EventLog, ModelEventKind};
    use crate::core::types::TagValue;

    fn values(name: &str) -> TagValues {
        let mut tags = TagValues::new();
        tags.insert("title".to_string(), TagValue::from(name));
        tags
    }

    fn action_values(kind: &str) -> TagValues {
        let mut tags = TagValues::new();
        tags.insert("kind".to_string(), TagValue::from(kind));
        tags
    }

    fn model() -> (AbstractStateModel, Arc<EventLog>) {
        let log = Arc::new(EventLog::default());
        let mut bus = EventBus::default();
        bus.subscribe(log.clone());
        let abstraction = AbstractionConfig::new(["title"], ["kind"]).expect("config");
        (AbstractStateModel::new("model-1", abstraction, bus), log)
    }

    #[test]
    fn upsert_state_twice_yields_one_node_with_two_visits() {
        let (mut model, log) = model();
        let first = model.upsert_state(values("A")).expect("upsert").id.clone();
        let second = model.upsert_state(values("A")).expect("upsert");
        assert_eq!(second.id, first);
        assert_eq!(second.visit_count, 2);
        assert_eq!(model.summary().states, 1);
        assert_eq!(
            log.kinds(),
            vec![ModelEventKind::StateAdded, ModelEventKind::StateChanged]
        );
    }

    #[test]
    fn upsert_state_keeps_identity_defining_values() {
        let (mut model, _) = model();
        let id = model.upsert_state(values("A")).expect("upsert").id.clone();
        model.upsert_state(values("A")).expect("upsert");
        assert_eq!(model.state(&id).expect("state").tag_values, values("A"));
    }

    #[test]
    fn upsert_action_is_scoped_to_source_state() {
        let (mut model, _) = model();
        let a = model.upsert_state(values("A")).expect("a").id.clone();
        let b = model.upsert_state(values("B")).expect("b").id.clone();
        let in_a = model.upsert_action(&a, action_values("move"), "move").expect("action");
        let (id_a, fp_a) = (in_a.id.clone(), in_a.fingerprint.clone());
        let in_b = model.upsert_action(&b, action_values("move"), "move").expect("action");
        assert_ne!(in_b.id, id_a);
        assert_eq!(in_b.fingerprint, fp_a);
    }

    #[test]
    fn upsert_action_on_unknown_state_is_usage_error() {
        let (mut model, _) = model();
        let err = model
            .upsert_action(&StateId::new("missing"), action_values("move"), "move")
            .expect_err("unknown source");
        assert!(matches!(err, ModelError::UnknownState { .. }));
    }

    #[test]
    fn record_transition_conflict_keeps_first_target() {
        let (mut model, _) = model();
        let a = model.upsert_state(values("A")).expect("a").id.clone();
        let b = model.upsert_state(values("B")).expect("b").id.clone();
        let c = model.upsert_state(values("C")).expect("c").id.clone();
        let x = model.upsert_action(&a, action_values("x"), "x").expect("x").id.clone();

        assert_eq!(
            model.record_transition(&x, &b).expect("record"),
            TransitionOutcome::Recorded
        );
        assert_eq!(
            model.record_transition(&x, &b).expect("record again"),
            TransitionOutcome::AlreadyRecorded
        );
        let err = model.record_transition(&x, &c).expect_err("conflict");
        assert!(matches!(err, ModelError::IdentityConflict { .. }));
        assert_eq!(model.action(&x).expect("x").target.as_ref(), Some(&b));
    }

    #[test]
    fn record_transition_reports_unknown_ids() {
        let (mut model, _) = model();
        let a = model.upsert_state(values("A")).expect("a").id.clone();
        let err = model
            .record_transition(&ActionId::new("nope"), &a)
            .expect_err("unknown action");
        assert!(err.is_not_found());

        let x = model.upsert_action(&a, action_values("x"), "x").expect("x").id.clone();
        let err = model
            .record_transition(&x, &StateId::new("nowhere"))
            .expect_err("unknown target");
        assert!(matches!(err, ModelError::UnknownState { .. }));
    }

    #[test]
    fn unvisited_actions_drop_after_mark_visited() {
        let (mut model, _) = model();
        let a = model.upsert_state(values("A")).expect("a").id.clone();
        let x = model.upsert_action(&a, action_values("x"), "x").expect("x").id.clone();
        let y = model.upsert_action(&a, action_values("y"), "y").expect("y").id.clone();

        model.mark_visited(&x).expect("visit");
        let unvisited = model.unvisited_actions(&a).expect("unvisited");
        assert_eq!(unvisited.into_iter().collect::<Vec<_>>(), vec![y]);
    }

    #[test]
    fn lookups_of_unknown_ids_are_not_found() {
        let (model, _) = model();
        assert!(model.state(&StateId::new("x")).expect_err("state").is_not_found());
        assert!(model.unvisited_actions(&StateId::new("x")).is_err());
    }
}
