//! Action-selection strategies.
//!
//! A selector looks at the current abstract state and the model and either
//! names an action or defers with [`Selection::NotFound`]. Deferring is data,
//! not an error; [`CompoundSelector`] chains selectors until one decides.

mod compound;
mod exploratory;
mod path;
mod random;
mod rl;
mod unvisited;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::core::error::{ModelError, Result};
use crate::core::model::AbstractStateModel;
use crate::core::types::{ActionId, StateId};

pub use compound::CompoundSelector;
pub use exploratory::ExploratorySelector;
pub use path::{PathSelector, PathTarget};
pub use random::RandomSelector;
pub use rl::{
    EpsilonGreedyPolicy, GreedyPolicy, Policy, QTable, ReinforcementSelector, RlParameters,
    SharedQTable,
};
pub use unvisited::UnvisitedSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Found(ActionId),
    NotFound,
}

impl Selection {
    pub fn found(self) -> Option<ActionId> {
        match self {
            Self::Found(id) => Some(id),
            Self::NotFound => None,
        }
    }
}

pub trait ActionSelector: Send {
    fn name(&self) -> &'static str;

    /// Choose one of `available`, the actions `current` offers right now. The
    /// model may know more actions for `current`; those are never returned.
    /// Unknown states are errors.
    fn select(
        &mut self,
        current: &StateId,
        available: &BTreeSet<ActionId>,
        model: &AbstractStateModel,
    ) -> Result<Selection>;
}

/// Configured selection strategy, expanded into a selector chain by [`build_chain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAlgorithm {
    Random,
    #[default]
    Unvisited,
    Explore,
    Path,
    Reinforcement,
}

impl SelectionAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Unvisited => "unvisited",
            Self::Explore => "explore",
            Self::Path => "path",
            Self::Reinforcement => "reinforcement",
        }
    }
}

impl fmt::Display for SelectionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionAlgorithm {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "unvisited" => Ok(Self::Unvisited),
            "explore" => Ok(Self::Explore),
            "path" => Ok(Self::Path),
            "reinforcement" | "rl" => Ok(Self::Reinforcement),
            other => Err(ModelError::configuration(format!(
                "unknown action selection algorithm '{other}'"
            ))),
        }
    }
}

/// Inputs shared by every selector a chain is built from.
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    pub seed: Option<u64>,
    pub max_expansions: usize,
    pub path_target: PathTarget,
    pub epsilon: f64,
    pub q_table: SharedQTable,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            seed: None,
            max_expansions: 1_000,
            path_target: PathTarget::AnyUnvisited,
            epsilon: 0.1,
            q_table: SharedQTable::default(),
        }
    }
}

/// Build the selector chain for `algorithm`. Every chain ends in random choice.
pub fn build_chain(algorithm: SelectionAlgorithm, options: &SelectorOptions) -> CompoundSelector {
    let rng = |offset: u64| seeded_rng(options.seed.map(|seed| seed.wrapping_add(offset)));
    let random: Box<dyn ActionSelector> = Box::new(RandomSelector::new(rng(0)));
    let selectors: Vec<Box<dyn ActionSelector>> = match algorithm {
        SelectionAlgorithm::Random => vec![random],
        SelectionAlgorithm::Unvisited => vec![
            Box::new(UnvisitedSelector::new(rng(1))),
            Box::new(PathSelector::new(
                PathTarget::AnyUnvisited,
                options.max_expansions,
            )),
            random,
        ],
        SelectionAlgorithm::Explore => vec![
            Box::new(ExploratorySelector::new(rng(2))),
            Box::new(UnvisitedSelector::new(rng(1))),
            random,
        ],
        SelectionAlgorithm::Path => vec![
            Box::new(PathSelector::new(
                options.path_target.clone(),
                options.max_expansions,
            )),
            random,
        ],
        SelectionAlgorithm::Reinforcement => vec![
            Box::new(ReinforcementSelector::new(
                options.q_table.clone(),
                Box::new(EpsilonGreedyPolicy::new(options.epsilon, rng(3))),
            )),
            random,
        ],
    };
    CompoundSelector::new(selectors)
}

/// Seeded when reproducibility was asked for, otherwise from OS entropy.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeSet;

    use crate::core::abstraction::AbstractionConfig;
    use crate::core::events::EventBus;
    use crate::core::model::AbstractStateModel;
    use crate::core::types::{ActionId, StateId, TagValue, TagValues};

    pub fn model() -> AbstractStateModel {
        let abstraction = AbstractionConfig::new(["title"], ["kind"]).expect("config");
        AbstractStateModel::new("test-model", abstraction, EventBus::default())
    }

    pub fn state(model: &mut AbstractStateModel, title: &str) -> StateId {
        let mut values = TagValues::new();
        values.insert("title".to_string(), TagValue::from(title));
        model.upsert_state(values).expect("state").id.clone()
    }

    pub fn action(model: &mut AbstractStateModel, source: &StateId, kind: &str) -> ActionId {
        let mut values = TagValues::new();
        values.insert("kind".to_string(), TagValue::from(kind));
        model
            .upsert_action(source, values, kind)
            .expect("action")
            .id
            .clone()
    }

    /// Every action the model knows for `state`, as if all were on offer.
    pub fn offered(model: &AbstractStateModel, state: &StateId) -> BTreeSet<ActionId> {
        model
            .actions_of(state)
            .expect("known state")
            .into_iter()
            .map(|action| action.id.clone())
            .collect()
    }

    /// Action `kind` in `source`, executed once and leading to `target`.
    pub fn edge(
        model: &mut AbstractStateModel,
        source: &StateId,
        kind: &str,
        target: &StateId,
    ) -> ActionId {
        let id = action(model, source, kind);
        model.mark_visited(&id).expect("visit");
        model.record_transition(&id, target).expect("transition");
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_parses_case_insensitively() {
        assert_eq!(
            "Unvisited".parse::<SelectionAlgorithm>().expect("parse"),
            SelectionAlgorithm::Unvisited
        );
        assert_eq!(
            "rl".parse::<SelectionAlgorithm>().expect("parse"),
            SelectionAlgorithm::Reinforcement
        );
        assert!("greedy".parse::<SelectionAlgorithm>().is_err());
    }

    #[test]
    fn chains_end_with_random() {
        for algorithm in [
            SelectionAlgorithm::Random,
            SelectionAlgorithm::Unvisited,
            SelectionAlgorithm::Explore,
            SelectionAlgorithm::Path,
            SelectionAlgorithm::Reinforcement,
        ] {
            let chain = build_chain(algorithm, &SelectorOptions::default());
            assert_eq!(chain.names().last(), Some(&"random"), "{algorithm}");
        }
    }

    #[test]
    fn unvisited_chain_matches_expected_order() {
        let chain = build_chain(SelectionAlgorithm::Unvisited, &SelectorOptions::default());
        assert_eq!(chain.names(), vec!["unvisited", "path", "random"]);
    }
}
