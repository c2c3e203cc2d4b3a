//! Test-only builders for observations, models and traces.

use std::sync::Arc;

use crate::core::abstraction::AbstractionConfig;
use crate::core::concrete::{ActionKind, ConcreteAction, ConcreteState};
use crate::core::events::{EventBus, EventLog};
use crate::core::model::{AbstractStateModel, SharedModel};
use crate::core::types::{Coord3D, TagValue, TagValues};
use crate::io::trace::{Trace, TraceStep};

/// Abstraction over a `title` state tag and a `kind` action tag.
pub fn title_abstraction() -> AbstractionConfig {
    AbstractionConfig::new(["title"], ["kind"]).expect("static abstraction is valid")
}

/// Shared model with an [`EventLog`] subscribed to its bus.
pub fn logged_model(model_identifier: &str) -> (SharedModel, Arc<EventLog>) {
    let log = Arc::new(EventLog::default());
    let mut bus = EventBus::default();
    bus.subscribe(log.clone());
    let model = AbstractStateModel::new(model_identifier, title_abstraction(), bus).into_shared();
    (model, log)
}

/// State identified by its `title` tag.
pub fn screen(title: &str) -> ConcreteState {
    ConcreteState::default().with_tag("title", title)
}

fn kind_tag(kind: &str) -> TagValues {
    let mut tags = TagValues::new();
    tags.insert("kind".to_string(), TagValue::from(kind));
    tags
}

/// Plain command identified by its `kind` tag.
pub fn command(kind: &str) -> ConcreteAction {
    ConcreteAction::new(kind_tag(kind), kind, ActionKind::Command)
}

/// Exploratory move towards `target`.
pub fn explore(kind: &str, target: Coord3D) -> ConcreteAction {
    ConcreteAction::new(kind_tag(kind), kind, ActionKind::Explore { target })
}

/// Trace step that executes `actions[executed]`.
pub fn step(state: ConcreteState, actions: Vec<ConcreteAction>, executed: Option<usize>) -> TraceStep {
    TraceStep {
        state,
        actions,
        executed,
        navigable: None,
        reward: None,
    }
}

pub fn trace(steps: Vec<TraceStep>) -> Trace {
    Trace {
        steps,
        ..Trace::default()
    }
}
