//! Error taxonomy for the abstract state model.
//!
//! `NotFound` is an ordinary control-flow signal (unknown id). Callers decide
//! whether it is worth logging; the model itself never logs it as a failure.

use thiserror::Error;

use crate::core::types::{ActionId, NavigableStateId, StateId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Missing or empty abstraction configuration. Fatal before a run starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An action's recorded target disagrees with an earlier recording.
    #[error("identity conflict on {entity} '{id}': recorded {existing}, observed {attempted}")]
    IdentityConflict {
        entity: &'static str,
        id: String,
        existing: String,
        attempted: String,
    },

    #[error("state not found: {0}")]
    StateNotFound(StateId),

    #[error("action not found: {0}")]
    ActionNotFound(ActionId),

    #[error("navigable state not found: {0}")]
    NavigableStateNotFound(NavigableStateId),

    /// A write referenced a state the model has never seen.
    #[error("unknown state referenced by {operation}: {id}")]
    UnknownState { operation: &'static str, id: StateId },

    /// Every selector in a chain deferred and no fallback could choose.
    #[error("action selection exhausted: {0}")]
    SelectionExhausted(String),

    #[error("sequence error: {0}")]
    Sequence(String),

    #[error("model lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn conflict(
        entity: &'static str,
        id: impl Into<String>,
        existing: impl Into<String>,
        attempted: impl Into<String>,
    ) -> Self {
        Self::IdentityConflict {
            entity,
            id: id.into(),
            existing: existing.into(),
            attempted: attempted.into(),
        }
    }

    pub fn unknown_state(operation: &'static str, id: &StateId) -> Self {
        Self::UnknownState {
            operation,
            id: id.clone(),
        }
    }

    /// True for the lookup failures that are expected during normal exploration.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StateNotFound(_) | Self::ActionNotFound(_) | Self::NavigableStateNotFound(_)
        )
    }
}
