use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{ModelError, Result};
use crate::core::model::AbstractStateModel;
use crate::core::selector::{ActionSelector, Selection};
use crate::core::types::{ActionId, StateId};

/// Learning parameters for [`QTable::update`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlParameters {
    pub learning_rate: f64,
    pub discount: f64,
    /// Value of a pair that has never been updated.
    pub default_q: f64,
}

impl Default for RlParameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.9,
            default_q: 0.0,
        }
    }
}

/// Q-function keyed by (abstract state, abstract action).
#[derive(Debug, Clone, Default)]
pub struct QTable {
    parameters: RlParameters,
    values: HashMap<(StateId, ActionId), f64>,
}

/// Q-table shared between the selector (reads) and the manager (updates).
pub type SharedQTable = Arc<RwLock<QTable>>;

impl QTable {
    pub fn new(parameters: RlParameters) -> Self {
        Self {
            parameters,
            values: HashMap::new(),
        }
    }

    pub fn shared(parameters: RlParameters) -> SharedQTable {
        Arc::new(RwLock::new(Self::new(parameters)))
    }

    pub fn parameters(&self) -> RlParameters {
        self.parameters
    }

    pub fn value(&self, state: &StateId, action: &ActionId) -> f64 {
        self.values
            .get(&(state.clone(), action.clone()))
            .copied()
            .unwrap_or(self.parameters.default_q)
    }

    pub fn set(&mut self, state: &StateId, action: &ActionId, value: f64) {
        self.values.insert((state.clone(), action.clone()), value);
    }

    /// `Q(s,a) += lr * (reward + discount * next_value - Q(s,a))`.
    ///
    /// `next_value` is the value of the action chosen in the next state, or 0
    /// when the sequence ended. Returns the new value.
    pub fn update(
        &mut self,
        state: &StateId,
        action: &ActionId,
        reward: f64,
        next_value: f64,
    ) -> f64 {
        let RlParameters {
            learning_rate,
            discount,
            ..
        } = self.parameters;
        let old = self.value(state, action);
        let new = old + learning_rate * (reward + discount * next_value - old);
        self.set(state, action, new);
        debug!(state = %state, action = %action, old, new, reward, "q-value updated");
        new
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Turns scored candidates into one choice.
pub trait Policy: Send {
    fn choose(&mut self, candidates: &[(ActionId, f64)]) -> Option<ActionId>;
}

/// Highest value wins; ties go to the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyPolicy;

impl Policy for GreedyPolicy {
    fn choose(&mut self, candidates: &[(ActionId, f64)]) -> Option<ActionId> {
        let mut best: Option<&(ActionId, f64)> = None;
        for candidate in candidates {
            if best.is_none_or(|(_, value)| candidate.1 > *value) {
                best = Some(candidate);
            }
        }
        best.map(|(id, _)| id.clone())
    }
}

/// Random candidate with probability `epsilon`, greedy otherwise.
pub struct EpsilonGreedyPolicy {
    epsilon: f64,
    rng: StdRng,
}

impl EpsilonGreedyPolicy {
    pub fn new(epsilon: f64, rng: StdRng) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl fmt::Debug for EpsilonGreedyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpsilonGreedyPolicy")
            .field("epsilon", &self.epsilon)
            .finish_non_exhaustive()
    }
}

impl Policy for EpsilonGreedyPolicy {
    fn choose(&mut self, candidates: &[(ActionId, f64)]) -> Option<ActionId> {
        if self.rng.gen_bool(self.epsilon) {
            return candidates.choose(&mut self.rng).map(|(id, _)| id.clone());
        }
        GreedyPolicy.choose(candidates)
    }
}

/// Scores the current state's actions from the shared Q-table and lets the
/// policy pick. Never writes to the table.
pub struct ReinforcementSelector {
    q_table: SharedQTable,
    policy: Box<dyn Policy>,
}

impl ReinforcementSelector {
    pub fn new(q_table: SharedQTable, policy: Box<dyn Policy>) -> Self {
        Self { q_table, policy }
    }
}

impl ActionSelector for ReinforcementSelector {
    fn name(&self) -> &'static str {
        "reinforcement"
    }

    fn select(
        &mut self,
        current: &StateId,
        available: &BTreeSet<ActionId>,
        model: &AbstractStateModel,
    ) -> Result<Selection> {
        let actions = model.actions_of(current)?;
        let table = self
            .q_table
            .read()
            .map_err(|err| ModelError::LockPoisoned(err.to_string()))?;
        let scored: Vec<(ActionId, f64)> = actions
            .into_iter()
            .filter(|action| available.contains(&action.id))
            .map(|action| (action.id.clone(), table.value(current, &action.id)))
            .collect();
        drop(table);

        Ok(match self.policy.choose(&scored) {
            Some(id) => Selection::Found(id),
            None => Selection::NotFound,
        })
    }
}
