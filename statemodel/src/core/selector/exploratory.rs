use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;

use crate::core::error::Result;
use crate::core::model::AbstractStateModel;
use crate::core::selector::{ActionSelector, Selection};
use crate::core::types::{ActionId, StateId};

/// Prefers movement towards not yet explored positions.
#[derive(Debug)]
pub struct ExploratorySelector {
    rng: StdRng,
}

impl ExploratorySelector {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl ActionSelector for ExploratorySelector {
    fn name(&self) -> &'static str {
        "explore"
    }

    fn select(
        &mut self,
        current: &StateId,
        available: &BTreeSet<ActionId>,
        model: &AbstractStateModel,
    ) -> Result<Selection> {
        let choice = model
            .actions_of(current)?
            .into_iter()
            .filter(|action| action.kind.is_exploratory() && !action.is_visited())
            .map(|action| action.id.clone())
            .filter(|id| available.contains(id))
            .choose(&mut self.rng);
        Ok(match choice {
            Some(id) => Selection::Found(id),
            None => Selection::NotFound,
        })
    }
}
