//! Abstraction-tag configuration: which observed attributes define identity.

use std::collections::BTreeSet;

use crate::core::concrete::{ConcreteAction, ConcreteState};
use crate::core::error::{ModelError, Result};
use crate::core::types::TagValues;

/// The configured tag sets used to abstract states and actions.
///
/// Both sets must be non-empty; they are fixed for the lifetime of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractionConfig {
    state_tags: BTreeSet<String>,
    action_tags: BTreeSet<String>,
}

impl AbstractionConfig {
    pub fn new<S, A>(state_tags: S, action_tags: A) -> Result<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        let state_tags = normalize(state_tags);
        let action_tags = normalize(action_tags);
        if state_tags.is_empty() {
            return Err(ModelError::configuration(
                "no abstract state tags were configured",
            ));
        }
        if action_tags.is_empty() {
            return Err(ModelError::configuration(
                "no abstract action tags were configured",
            ));
        }
        Ok(Self {
            state_tags,
            action_tags,
        })
    }

    pub fn state_tags(&self) -> &BTreeSet<String> {
        &self.state_tags
    }

    pub fn action_tags(&self) -> &BTreeSet<String> {
        &self.action_tags
    }

    /// Configured tags present on the observed state.
    pub fn state_values(&self, state: &ConcreteState) -> TagValues {
        select(&self.state_tags, &state.tags)
    }

    /// Configured tags present on the observed action.
    pub fn action_values(&self, action: &ConcreteAction) -> TagValues {
        select(&self.action_tags, &action.tags)
    }
}

fn normalize<I>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    tags.into_iter()
        .map(|tag| {
            let tag: String = tag.into();
            tag.trim().to_string()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn select(configured: &BTreeSet<String>, observed: &TagValues) -> TagValues {
    observed
        .iter()
        .filter(|(name, _)| configured.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
