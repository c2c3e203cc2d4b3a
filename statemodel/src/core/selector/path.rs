use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::core::error::Result;
use crate::core::model::{AbstractAction, AbstractStateModel};
use crate::core::selector::{ActionSelector, Selection};
use crate::core::types::{ActionId, StateId};

/// What a path search is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget {
    /// A state offering an action with this fingerprint.
    Fingerprint(String),
    /// A state with at least one never-executed action.
    AnyUnvisited,
}

impl PathTarget {
    fn offered_by<'a>(&self, actions: &[&'a AbstractAction]) -> Option<&'a AbstractAction> {
        match self {
            Self::Fingerprint(fingerprint) => actions
                .iter()
                .find(|action| &action.fingerprint == fingerprint)
                .copied(),
            Self::AnyUnvisited => actions.iter().find(|action| !action.is_visited()).copied(),
        }
    }
}

/// Breadth-first search over recorded transitions.
///
/// Returns the first action on a shortest path to the nearest state offering
/// the target. When the target is on offer in the current state, that action is
/// returned directly. The first hop is always one of the offered actions; later
/// hops follow whatever the model recorded. Reaching `max_expansions` defers,
/// like an unreachable target.
#[derive(Debug, Clone)]
pub struct PathSelector {
    target: PathTarget,
    max_expansions: usize,
}

impl PathSelector {
    pub fn new(target: PathTarget, max_expansions: usize) -> Self {
        Self {
            target,
            max_expansions,
        }
    }

    pub fn target(&self) -> &PathTarget {
        &self.target
    }
}

impl ActionSelector for PathSelector {
    fn name(&self) -> &'static str {
        "path"
    }

    fn select(
        &mut self,
        current: &StateId,
        available: &BTreeSet<ActionId>,
        model: &AbstractStateModel,
    ) -> Result<Selection> {
        let here: Vec<&AbstractAction> = model
            .actions_of(current)?
            .into_iter()
            .filter(|action| available.contains(&action.id))
            .collect();
        if let Some(action) = self.target.offered_by(&here) {
            return Ok(Selection::Found(action.id.clone()));
        }

        let mut seen: BTreeSet<&StateId> = BTreeSet::from([current]);
        let mut queue: VecDeque<(&StateId, Option<&ActionId>)> = VecDeque::from([(current, None)]);
        let mut expansions = 0;

        while let Some((state, first_hop)) = queue.pop_front() {
            if expansions >= self.max_expansions {
                debug!(expansions, target = ?self.target, "path search exhausted");
                return Ok(Selection::NotFound);
            }
            expansions += 1;

            for (action, next) in model.outgoing(state)? {
                if first_hop.is_none() && !available.contains(&action.id) {
                    continue;
                }
                if !seen.insert(next) {
                    continue;
                }
                let hop = first_hop.unwrap_or(&action.id);
                if self.target.offered_by(&model.actions_of(next)?).is_some() {
                    debug!(first_hop = %hop, expansions, "path found");
                    return Ok(Selection::Found(hop.clone()));
                }
                queue.push_back((next, Some(hop)));
            }
        }
        Ok(Selection::NotFound)
    }
}
