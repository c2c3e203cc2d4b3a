use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;

use crate::core::error::Result;
use crate::core::model::AbstractStateModel;
use crate::core::selector::{ActionSelector, Selection};
use crate::core::types::{ActionId, StateId};

/// Uniform choice among the offered actions never executed from this state.
#[derive(Debug)]
pub struct UnvisitedSelector {
    rng: StdRng,
}

impl UnvisitedSelector {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl ActionSelector for UnvisitedSelector {
    fn name(&self) -> &'static str {
        "unvisited"
    }

    fn select(
        &mut self,
        current: &StateId,
        available: &BTreeSet<ActionId>,
        model: &AbstractStateModel,
    ) -> Result<Selection> {
        let unvisited = model.unvisited_actions(current)?;
        let choice = unvisited
            .into_iter()
            .filter(|id| available.contains(id))
            .choose(&mut self.rng);
        Ok(match choice {
            Some(id) => Selection::Found(id),
            None => Selection::NotFound,
        })
    }
}
