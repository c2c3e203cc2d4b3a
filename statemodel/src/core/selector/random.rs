use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::error::Result;
use crate::core::model::AbstractStateModel;
use crate::core::selector::{ActionSelector, Selection};
use crate::core::types::{ActionId, StateId};

/// Uniform choice over the actions on offer.
#[derive(Debug)]
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn choose_from(&mut self, candidates: &[ActionId]) -> Option<ActionId> {
        candidates.choose(&mut self.rng).cloned()
    }
}

impl ActionSelector for RandomSelector {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(
        &mut self,
        current: &StateId,
        available: &BTreeSet<ActionId>,
        model: &AbstractStateModel,
    ) -> Result<Selection> {
        let candidates: Vec<ActionId> = model
            .actions_of(current)?
            .into_iter()
            .map(|action| action.id.clone())
            .filter(|id| available.contains(id))
            .collect();
        Ok(match self.choose_from(&candidates) {
            Some(id) => Selection::Found(id),
            None => Selection::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selector::fixtures;
    use crate::core::selector::seeded_rng;

    #[test]
    fn state_without_actions_defers() {
        let mut model = fixtures::model();
        let s = fixtures::state(&mut model, "empty");
        let mut selector = RandomSelector::new(seeded_rng(Some(1)));
        assert_eq!(
            selector.select(&s, &BTreeSet::new(), &model).expect("select"),
            Selection::NotFound
        );
    }

    #[test]
    fn same_seed_gives_same_choices() {
        let mut model = fixtures::model();
        let s = fixtures::state(&mut model, "menu");
        for kind in ["a", "b", "c", "d", "e"] {
            fixtures::action(&mut model, &s, kind);
        }
        let offered = fixtures::offered(&model, &s);
        let mut first = RandomSelector::new(seeded_rng(Some(7)));
        let mut second = RandomSelector::new(seeded_rng(Some(7)));
        for _ in 0..10 {
            assert_eq!(
                first.select(&s, &offered, &model).expect("select"),
                second.select(&s, &offered, &model).expect("select")
            );
        }
    }

    #[test]
    fn known_but_absent_actions_are_never_chosen() {
        let mut model = fixtures::model();
        let s = fixtures::state(&mut model, "menu");
        fixtures::action(&mut model, &s, "a");
        let b = fixtures::action(&mut model, &s, "b");
        fixtures::action(&mut model, &s, "c");
        let offered = BTreeSet::from([b.clone()]);

        for seed in 0..50 {
            let mut selector = RandomSelector::new(seeded_rng(Some(seed)));
            assert_eq!(
                selector.select(&s, &offered, &model).expect("select"),
                Selection::Found(b.clone())
            );
        }
    }
}
