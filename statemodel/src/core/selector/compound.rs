use std::collections::BTreeSet;

use tracing::debug;

use crate::core::error::{ModelError, Result};
use crate::core::model::AbstractStateModel;
use crate::core::selector::{ActionSelector, Selection};
use crate::core::types::{ActionId, StateId};

/// Ordered selector chain: the first selector that decides wins.
pub struct CompoundSelector {
    selectors: Vec<Box<dyn ActionSelector>>,
}

impl CompoundSelector {
    pub fn new(selectors: Vec<Box<dyn ActionSelector>>) -> Self {
        Self { selectors }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.selectors.iter().map(|selector| selector.name()).collect()
    }

    /// Ask each selector in order. A pick outside `available` counts as a
    /// deferral. When every one defers the chain is exhausted, which the caller
    /// resolves.
    pub fn select(
        &mut self,
        current: &StateId,
        available: &BTreeSet<ActionId>,
        model: &AbstractStateModel,
    ) -> Result<ActionId> {
        for selector in &mut self.selectors {
            if let Selection::Found(id) = selector.select(current, available, model)? {
                if available.contains(&id) {
                    debug!(selector = selector.name(), action = %id, "action selected");
                    return Ok(id);
                }
                debug!(selector = selector.name(), action = %id, "selected action not on offer");
            }
        }
        Err(ModelError::SelectionExhausted(format!(
            "no selector in [{}] chose an action in state {current}",
            self.names().join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selector::{fixtures, seeded_rng, RandomSelector, UnvisitedSelector};

    struct Deferring;

    impl ActionSelector for Deferring {
        fn name(&self) -> &'static str {
            "deferring"
        }

        fn select(
            &mut self,
            _: &StateId,
            _: &BTreeSet<ActionId>,
            _: &AbstractStateModel,
        ) -> Result<Selection> {
            Ok(Selection::NotFound)
        }
    }

    struct Fixed(ActionId);

    impl ActionSelector for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn select(
            &mut self,
            _: &StateId,
            _: &BTreeSet<ActionId>,
            _: &AbstractStateModel,
        ) -> Result<Selection> {
            Ok(Selection::Found(self.0.clone()))
        }
    }

    #[test]
    fn first_found_wins() {
        let mut model = fixtures::model();
        let s = fixtures::state(&mut model, "s");
        let a = fixtures::action(&mut model, &s, "a");
        let mut chain = CompoundSelector::new(vec![
            Box::new(Deferring),
            Box::new(Fixed(a.clone())),
            Box::new(Fixed(ActionId::new("never"))),
        ]);
        assert_eq!(chain.select(&s, &fixtures::offered(&model, &s), &model).expect("select"), a);
    }

    #[test]
    fn unvisited_then_random_falls_through_when_all_visited() {
        let mut model = fixtures::model();
        let s = fixtures::state(&mut model, "s");
        let a = fixtures::action(&mut model, &s, "a");
        model.mark_visited(&a).expect("visit");

        let mut chain = CompoundSelector::new(vec![
            Box::new(UnvisitedSelector::new(seeded_rng(Some(1)))),
            Box::new(RandomSelector::new(seeded_rng(Some(2)))),
        ]);
        assert_eq!(chain.select(&s, &fixtures::offered(&model, &s), &model).expect("select"), a);
    }

    #[test]
    fn all_deferring_is_exhausted() {
        let mut model = fixtures::model();
        let s = fixtures::state(&mut model, "s");
        let mut chain = CompoundSelector::new(vec![Box::new(Deferring)]);
        let err = chain.select(&s, &fixtures::offered(&model, &s), &model).expect_err("exhausted");
        assert!(matches!(err, ModelError::SelectionExhausted(_)));
    }

    #[test]
    fn pick_outside_offer_falls_through() {
        let mut model = fixtures::model();
        let s = fixtures::state(&mut model, "s");
        let a = fixtures::action(&mut model, &s, "a");
        let b = fixtures::action(&mut model, &s, "b");
        let mut chain = CompoundSelector::new(vec![
            Box::new(Fixed(b)),
            Box::new(Fixed(a.clone())),
        ]);
        assert_eq!(
            chain
                .select(&s, &BTreeSet::from([a.clone()]), &model)
                .expect("select"),
            a
        );
    }
}
