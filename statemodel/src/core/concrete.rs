//! Concrete observations supplied by the collaborator that drives the SUT.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{Coord3D, ReachableEntity, TagValue, TagValues};

/// Snapshot of the SUT after an action (or at startup).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcreteState {
    pub tags: TagValues,
}

impl ConcreteState {
    pub fn new(tags: TagValues) -> Self {
        Self { tags }
    }

    pub fn with_tag(mut self, name: &str, value: impl Into<TagValue>) -> Self {
        self.tags.insert(name.to_string(), value.into());
        self
    }
}

/// What an action does, independent of which game or SUT produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    Command,
    /// Move towards a not yet visited position.
    Explore { target: Coord3D },
    /// Walk to an entity and interact with it.
    NavigateInteract { entity_id: String },
    Goal,
    Observe,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Explore { .. } => "explore",
            Self::NavigateInteract { .. } => "navigate-interact",
            Self::Goal => "goal",
            Self::Observe => "observe",
        }
    }

    pub fn exploration_target(&self) -> Option<Coord3D> {
        match self {
            Self::Explore { target } => Some(*target),
            _ => None,
        }
    }

    pub fn is_exploratory(&self) -> bool {
        matches!(self, Self::Explore { .. })
    }

    pub fn is_interaction(&self) -> bool {
        matches!(self, Self::NavigateInteract { .. })
    }

    /// Roles an action of this kind always carries.
    pub fn default_roles(&self) -> BTreeSet<ActionRole> {
        let roles: &[ActionRole] = match self {
            Self::Command => &[ActionRole::Command],
            Self::Explore { .. } => &[ActionRole::Command, ActionRole::Move, ActionRole::Explore],
            Self::NavigateInteract { .. } => {
                &[ActionRole::Command, ActionRole::Move, ActionRole::Interact]
            }
            Self::Goal => &[ActionRole::Goal],
            Self::Observe => &[ActionRole::Command, ActionRole::Observe],
        };
        roles.iter().copied().collect()
    }
}

/// Capability flags attached to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRole {
    Command,
    Move,
    Interact,
    Explore,
    Observe,
    Goal,
}

/// An action the collaborator can execute in the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteAction {
    pub tags: TagValues,
    pub description: String,
    #[serde(default)]
    pub kind: ActionKind,
    #[serde(default)]
    pub roles: BTreeSet<ActionRole>,
}

impl ConcreteAction {
    /// Build an action whose roles are the defaults for `kind`.
    pub fn new(tags: TagValues, description: impl Into<String>, kind: ActionKind) -> Self {
        let roles = kind.default_roles();
        Self {
            tags,
            description: description.into(),
            kind,
            roles,
        }
    }

    pub fn has_role(&self, role: ActionRole) -> bool {
        self.roles.contains(&role)
    }

    /// One-line description for logs and sequence records.
    pub fn summary(&self) -> String {
        match &self.kind {
            ActionKind::Explore { target } => format!("explore {}: {}", target, self.description),
            ActionKind::NavigateInteract { entity_id } => {
                format!("interact {}: {}", entity_id, self.description)
            }
            other => format!("{}: {}", other.label(), self.description),
        }
    }
}

/// Spatial observation made while exploring a 3D SUT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigableObservation {
    pub nodes: BTreeSet<Coord3D>,
    pub entities: BTreeSet<ReachableEntity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_kind_exposes_target_and_roles() {
        let kind = ActionKind::Explore {
            target: Coord3D::new(1.0, 0.0, 2.0),
        };
        assert_eq!(kind.exploration_target(), Some(Coord3D::new(1.0, 0.0, 2.0)));
        assert!(kind.default_roles().contains(&ActionRole::Explore));
        assert!(!kind.is_interaction());
    }

    #[test]
    fn action_kind_deserializes_from_tagged_json() {
        let kind: ActionKind =
            serde_json::from_str(r#"{"kind":"navigate_interact","entity_id":"button1"}"#)
                .expect("parse");
        assert_eq!(
            kind,
            ActionKind::NavigateInteract {
                entity_id: "button1".to_string()
            }
        );
    }
}
