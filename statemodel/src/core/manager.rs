//! Decision-loop facade: the only entry point a SUT driver talks to.
//!
//! The driver reports what it observed and executed; the manager keeps the
//! abstract and navigable models, the sequence log and the Q-table in step and
//! decides what to execute next.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, instrument, warn};

use crate::core::concrete::{ActionKind, ConcreteAction, ConcreteState};
use crate::core::error::{ModelError, Result};
use crate::core::model::{AbstractStateModel, ModelSummary, SharedModel};
use crate::core::selector::{
    CompoundSelector, RandomSelector, SelectionAlgorithm, SelectorOptions, SharedQTable,
    build_chain, seeded_rng,
};
use crate::core::sequence::{SequenceInfo, SequenceRecorder};
use crate::core::types::{ActionId, Coord3D, NavigableStateId, ReachableEntity, StateId};

/// Interactive action discovered in the current navigable area.
#[derive(Debug, Clone)]
struct PendingInteraction {
    entity_id: String,
}

/// Movement that led away from the last navigable state.
#[derive(Debug, Clone)]
struct NavigableStep {
    state: NavigableStateId,
    action: ActionId,
    description: String,
}

pub struct ModelManager {
    model: SharedModel,
    selector: CompoundSelector,
    fallback: RandomSelector,
    recorder: SequenceRecorder,
    q_table: Option<SharedQTable>,

    current_state: Option<StateId>,
    action_under_execution: Option<ActionId>,
    awaiting_initial_state: bool,

    // Per navigable area; reset by `notify_new_navigable_state`.
    pending_exploration: BTreeMap<ActionId, Coord3D>,
    pending_interactions: BTreeMap<ActionId, PendingInteraction>,
    executed: BTreeSet<ActionId>,
    previous_navigable: Option<NavigableStep>,

    last_executed: Option<(StateId, ActionId)>,
    pending_reward: Option<(StateId, ActionId, f64)>,
}

impl ModelManager {
    /// Manager over `model` choosing with `selector`. The seed drives the
    /// fallback random choice.
    pub fn new(model: SharedModel, selector: CompoundSelector, seed: Option<u64>) -> Result<Self> {
        let bus = read_model(&model)?.bus().clone();
        Ok(Self {
            model,
            selector,
            fallback: RandomSelector::new(seeded_rng(seed)),
            recorder: SequenceRecorder::new(bus),
            q_table: None,
            current_state: None,
            action_under_execution: None,
            awaiting_initial_state: false,
            pending_exploration: BTreeMap::new(),
            pending_interactions: BTreeMap::new(),
            executed: BTreeSet::new(),
            previous_navigable: None,
            last_executed: None,
            pending_reward: None,
        })
    }

    /// Manager whose selector chain is built for `algorithm`.
    pub fn with_algorithm(
        model: SharedModel,
        algorithm: SelectionAlgorithm,
        options: &SelectorOptions,
    ) -> Result<Self> {
        let chain = build_chain(algorithm, options);
        let mut manager = Self::new(model, chain, options.seed)?;
        if algorithm == SelectionAlgorithm::Reinforcement {
            manager.q_table = Some(options.q_table.clone());
        }
        info!(algorithm = %algorithm, selectors = ?manager.selector.names(), "model manager ready");
        Ok(manager)
    }

    pub fn model(&self) -> SharedModel {
        Arc::clone(&self.model)
    }

    pub fn current_state(&self) -> Option<&StateId> {
        self.current_state.as_ref()
    }

    pub fn recorder(&self) -> &SequenceRecorder {
        &self.recorder
    }

    pub fn q_table(&self) -> Option<&SharedQTable> {
        self.q_table.as_ref()
    }

    pub fn summary(&self) -> Result<ModelSummary> {
        Ok(read_model(&self.model)?.summary())
    }

    /// Exploratory actions seen since the last navigable state and not yet executed.
    pub fn pending_exploration(&self) -> &BTreeMap<ActionId, Coord3D> {
        &self.pending_exploration
    }

    /// Record the state the SUT is in now and the actions it offers.
    ///
    /// The action under execution, if any, gets this state as its target. A
    /// non-deterministic transition is reported as an
    /// [`ModelError::IdentityConflict`] after the state has still become current.
    #[instrument(skip_all, fields(actions = actions.len()))]
    pub fn notify_new_state_reached(
        &mut self,
        state: &ConcreteState,
        actions: &[ConcreteAction],
    ) -> Result<StateId> {
        let model = Arc::clone(&self.model);
        let mut model = write_model(&model)?;

        let state_id = model.upsert_concrete_state(state)?.id.clone();
        if self.awaiting_initial_state && self.recorder.is_active() {
            model.mark_initial(&state_id)?;
            self.awaiting_initial_state = false;
        }

        for action in actions {
            let action_id = model.upsert_concrete_action(&state_id, action)?.id.clone();
            if self.executed.contains(&action_id) {
                continue;
            }
            if let Some(target) = action.kind.exploration_target() {
                self.pending_exploration.entry(action_id).or_insert(target);
            } else if let ActionKind::NavigateInteract { entity_id } = &action.kind {
                self.pending_interactions
                    .entry(action_id)
                    .or_insert_with(|| PendingInteraction {
                        entity_id: entity_id.clone(),
                    });
            }
        }

        let transition = match self.action_under_execution.take() {
            Some(action_id) => model.record_transition(&action_id, &state_id).map(|_| ()),
            None => Ok(()),
        };
        drop(model);

        debug!(state = %state_id, "new state reached");
        self.current_state = Some(state_id.clone());
        transition.map(|()| state_id)
    }

    /// Pick one of `available` to execute in the current state.
    ///
    /// Pending exploratory actions come first, then the selector chain, which
    /// only ever sees the ids of `available`. An exhausted chain falls back to uniform choice, so a non-empty
    /// `available` always yields an action.
    #[instrument(skip_all, fields(available = available.len()))]
    pub fn select_action<'a>(
        &mut self,
        available: &'a [ConcreteAction],
    ) -> Result<&'a ConcreteAction> {
        if available.is_empty() {
            return Err(ModelError::SelectionExhausted(
                "no actions available in the current state".to_string(),
            ));
        }
        let current = self.require_current("select_action")?;
        let model = Arc::clone(&self.model);
        let model = read_model(&model)?;

        let mut by_id: BTreeMap<ActionId, &'a ConcreteAction> = BTreeMap::new();
        for action in available {
            by_id.insert(model.action_id_for(&current, action)?, action);
        }

        let exploratory: Vec<ActionId> = by_id
            .keys()
            .filter(|id| self.pending_exploration.contains_key(*id))
            .cloned()
            .collect();
        let chosen = if let Some(id) = self.fallback.choose_from(&exploratory) {
            debug!(action = %id, "pending exploratory action prioritised");
            id
        } else {
            let offered: BTreeSet<ActionId> = by_id.keys().cloned().collect();
            match self.selector.select(&current, &offered, &model) {
                Ok(id) => id,
                Err(ModelError::SelectionExhausted(reason)) => {
                    debug!(%reason, "selector chain exhausted, choosing randomly");
                    self.random_available(&by_id)?
                }
                Err(err) => return Err(err),
            }
        };
        drop(model);

        self.apply_pending_reward(Some((&current, &chosen)))?;
        by_id
            .get(&chosen)
            .copied()
            .ok_or(ModelError::ActionNotFound(chosen))
    }

    /// The driver executed `action` in the current state.
    #[instrument(skip_all, fields(action = %action.description))]
    pub fn notify_action_executed(&mut self, action: &ConcreteAction) -> Result<ActionId> {
        let action_id = self.begin_execution(action)?;
        self.pending_exploration.remove(&action_id);
        self.executed.insert(action_id.clone());
        Ok(action_id)
    }

    /// An action performed outside the manager's choice, e.g. by a human
    /// tester, was observed in the current state.
    #[instrument(skip_all, fields(action = %action.description))]
    pub fn notify_listened_action(&mut self, action: &ConcreteAction) -> Result<ActionId> {
        self.begin_execution(action)
    }

    /// Attach a reward to the last executed action. It is applied once the
    /// next action is chosen or executed, or when the sequence ends.
    pub fn record_reward(&mut self, reward: f64) -> Result<()> {
        let Some((state, action)) = self.last_executed.take() else {
            return Err(ModelError::Sequence(
                "no executed action to reward".to_string(),
            ));
        };
        self.pending_reward = Some((state, action, reward));
        Ok(())
    }

    /// Record the navigable area the agent stands in.
    ///
    /// `description` and `abstract_action_id` name the movement the driver is
    /// about to perform from this area; it becomes the edge to the next one.
    #[instrument(skip_all, fields(nodes = nodes.len(), entities = entities.len()))]
    pub fn notify_new_navigable_state(
        &mut self,
        nodes: BTreeSet<Coord3D>,
        entities: BTreeSet<ReachableEntity>,
        description: &str,
        abstract_action_id: &ActionId,
    ) -> Result<NavigableStateId> {
        let model = Arc::clone(&self.model);
        let mut model = write_model(&model)?;
        let graph = model.navigable_mut();

        let state_id = graph.upsert_navigable_state(nodes, entities)?.id.clone();
        for (action_id, target) in &self.pending_exploration {
            graph.add_unexecuted_exploratory_action(&state_id, action_id, *target)?;
        }
        for (action_id, interaction) in &self.pending_interactions {
            graph.add_interactive_action(&state_id, action_id, &interaction.entity_id)?;
        }

        let transition = match self.previous_navigable.take() {
            Some(previous) => graph
                .record_navigable_transition(
                    &previous.state,
                    &state_id,
                    &previous.action,
                    &previous.description,
                )
                .map(|_| ()),
            None => Ok(()),
        };
        drop(model);

        self.pending_exploration.clear();
        self.pending_interactions.clear();
        self.executed.clear();
        self.previous_navigable = Some(NavigableStep {
            state: state_id.clone(),
            action: abstract_action_id.clone(),
            description: description.to_string(),
        });
        debug!(navigable_state = %state_id, "new navigable state");
        transition.map(|()| state_id)
    }

    pub fn notify_sequence_started(&mut self) -> Result<SequenceInfo> {
        let model_identifier = read_model(&self.model)?.model_identifier().to_string();
        let info = self.recorder.start(&model_identifier)?.clone();
        self.reset_run();
        self.awaiting_initial_state = true;
        Ok(info)
    }

    pub fn notify_sequence_stopped(&mut self) -> Result<Option<SequenceInfo>> {
        self.apply_pending_reward(None)?;
        Ok(self.recorder.end())
    }

    pub fn notify_sequence_interrupted_by_user(&mut self) -> Result<Option<SequenceInfo>> {
        self.apply_pending_reward(None)?;
        Ok(self.recorder.interrupt_by_user())
    }

    pub fn notify_sequence_interrupted_by_system(
        &mut self,
        message: &str,
    ) -> Result<Option<SequenceInfo>> {
        self.apply_pending_reward(None)?;
        Ok(self.recorder.interrupt_by_system(message))
    }

    /// Close a sequence left open and flush every listener.
    pub fn notify_testing_ended(&mut self) -> Result<()> {
        if self.recorder.is_active() {
            warn!("testing ended while a sequence was running");
            self.notify_sequence_interrupted_by_system("testing ended")?;
        }
        let bus = read_model(&self.model)?.bus().clone();
        bus.flush();
        info!("testing ended");
        Ok(())
    }

    fn begin_execution(&mut self, action: &ConcreteAction) -> Result<ActionId> {
        let current = self.require_current("action execution")?;
        let model = Arc::clone(&self.model);
        let mut model = write_model(&model)?;

        let action_id = model.action_id_for(&current, action)?;
        if model.action(&action_id).is_err() {
            warn!(action = %action_id, state = %current, "executed action was not offered in the current state");
            model.upsert_concrete_action(&current, action)?;
        }
        model.mark_visited(&action_id)?;
        drop(model);

        // A driver that chose on its own never called `select_action`.
        self.apply_pending_reward(Some((&current, &action_id)))?;
        if self.recorder.is_active() {
            self.recorder
                .append_step(&current, &action_id, &action.summary())?;
        } else {
            debug!(action = %action_id, "action executed outside a sequence");
        }
        self.action_under_execution = Some(action_id.clone());
        self.last_executed = Some((current, action_id.clone()));
        Ok(action_id)
    }

    /// SARSA step for the rewarded pair, bootstrapping from `next` when a
    /// follow-up action was chosen.
    fn apply_pending_reward(&mut self, next: Option<(&StateId, &ActionId)>) -> Result<()> {
        let Some((state, action, reward)) = self.pending_reward.take() else {
            return Ok(());
        };
        let Some(q_table) = &self.q_table else {
            debug!("reward recorded without a q-table, ignored");
            return Ok(());
        };
        let mut table = q_table
            .write()
            .map_err(|err| ModelError::LockPoisoned(err.to_string()))?;
        let next_value = next.map_or(0.0, |(s, a)| table.value(s, a));
        table.update(&state, &action, reward, next_value);
        Ok(())
    }

    fn random_available(&mut self, by_id: &BTreeMap<ActionId, &ConcreteAction>) -> Result<ActionId> {
        let ids: Vec<ActionId> = by_id.keys().cloned().collect();
        self.fallback
            .choose_from(&ids)
            .ok_or_else(|| ModelError::SelectionExhausted("no actions available".to_string()))
    }

    fn require_current(&self, operation: &str) -> Result<StateId> {
        self.current_state.clone().ok_or_else(|| {
            ModelError::Sequence(format!("{operation} before any state was reached"))
        })
    }

    fn reset_run(&mut self) {
        self.current_state = None;
        self.action_under_execution = None;
        self.pending_exploration.clear();
        self.pending_interactions.clear();
        self.executed.clear();
        self.previous_navigable = None;
        self.last_executed = None;
        self.pending_reward = None;
    }
}

fn read_model(model: &SharedModel) -> Result<RwLockReadGuard<'_, AbstractStateModel>> {
    model
        .read()
        .map_err(|err| ModelError::LockPoisoned(err.to_string()))
}

fn write_model(model: &SharedModel) -> Result<RwLockWriteGuard<'_, AbstractStateModel>> {
    model
        .write()
        .map_err(|err| ModelError::LockPoisoned(err.to_string()))
}
