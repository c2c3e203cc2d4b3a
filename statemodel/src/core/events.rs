//! Ordered publish/subscribe of model mutations.
//!
//! The model, the navigable graph and the sequence recorder share one
//! [`EventBus`]. Clones of a bus share its listener list, so a listener attached
//! through any clone hears every emitter. Listeners are called synchronously in
//! subscription order, after the mutation they describe has been applied.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::model::{AbstractAction, AbstractState};
use crate::core::navigable::{NavigableAction, NavigableState};
use crate::core::sequence::{SequenceInfo, SequenceStep};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    StateAdded(AbstractState),
    StateChanged(AbstractState),
    ActionAdded(AbstractAction),
    ActionChanged(AbstractAction),
    TransitionAdded {
        source: AbstractState,
        action: AbstractAction,
        target: AbstractState,
    },
    NavigableStateAdded(NavigableState),
    NavigableStateChanged(NavigableState),
    NavigableTransitionAdded {
        source: NavigableState,
        action: NavigableAction,
        target: NavigableState,
    },
    SequenceStarted(SequenceInfo),
    SequenceStepAdded {
        sequence: SequenceInfo,
        step: SequenceStep,
    },
    SequenceEnded(SequenceInfo),
}

/// Discriminant of a [`ModelEvent`], for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEventKind {
    StateAdded,
    StateChanged,
    ActionAdded,
    ActionChanged,
    TransitionAdded,
    NavigableStateAdded,
    NavigableStateChanged,
    NavigableTransitionAdded,
    SequenceStarted,
    SequenceStepAdded,
    SequenceEnded,
}

impl ModelEvent {
    pub fn kind(&self) -> ModelEventKind {
        match self {
            Self::StateAdded(_) => ModelEventKind::StateAdded,
            Self::StateChanged(_) => ModelEventKind::StateChanged,
            Self::ActionAdded(_) => ModelEventKind::ActionAdded,
            Self::ActionChanged(_) => ModelEventKind::ActionChanged,
            Self::TransitionAdded { .. } => ModelEventKind::TransitionAdded,
            Self::NavigableStateAdded(_) => ModelEventKind::NavigableStateAdded,
            Self::NavigableStateChanged(_) => ModelEventKind::NavigableStateChanged,
            Self::NavigableTransitionAdded { .. } => ModelEventKind::NavigableTransitionAdded,
            Self::SequenceStarted(_) => ModelEventKind::SequenceStarted,
            Self::SequenceStepAdded { .. } => ModelEventKind::SequenceStepAdded,
            Self::SequenceEnded(_) => ModelEventKind::SequenceEnded,
        }
    }
}

impl fmt::Display for ModelEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StateAdded => "state_added",
            Self::StateChanged => "state_changed",
            Self::ActionAdded => "action_added",
            Self::ActionChanged => "action_changed",
            Self::TransitionAdded => "transition_added",
            Self::NavigableStateAdded => "navigable_state_added",
            Self::NavigableStateChanged => "navigable_state_changed",
            Self::NavigableTransitionAdded => "navigable_transition_added",
            Self::SequenceStarted => "sequence_started",
            Self::SequenceStepAdded => "sequence_step_added",
            Self::SequenceEnded => "sequence_ended",
        };
        f.write_str(name)
    }
}

/// Receiver of model mutation events.
///
/// Implementations must not call back into the model: the bus is invoked while
/// the model is being written.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ModelEvent);

    /// Block until previously delivered events are durable.
    fn flush(&self) {}
}

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn EventListener>>>>,
}

impl EventBus {
    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        self.write().push(listener);
    }

    /// Subscribe `listener` until the returned guard is dropped.
    pub fn attach(&self, listener: Arc<dyn EventListener>) -> Subscription {
        self.write().push(Arc::clone(&listener));
        Subscription {
            bus: self.clone(),
            listener,
        }
    }

    pub fn emit(&self, event: &ModelEvent) {
        for listener in self.read().iter() {
            listener.on_event(event);
        }
    }

    pub fn flush(&self) {
        for listener in self.read().iter() {
            listener.flush();
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn detach(&self, listener: &Arc<dyn EventListener>) {
        self.write().retain(|held| !Arc::ptr_eq(held, listener));
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn EventListener>>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn EventListener>>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Keeps a listener attached to a bus; dropping it detaches the listener.
#[must_use = "the listener is detached when the subscription is dropped"]
pub struct Subscription {
    bus: EventBus,
    listener: Arc<dyn EventListener>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.detach(&self.listener);
    }
}

/// In-memory listener that keeps every event, for reports and tests.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<ModelEvent>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<ModelEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn kinds(&self) -> Vec<ModelEventKind> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(ModelEvent::kind)
            .collect()
    }

    pub fn count(&self, kind: ModelEventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventListener for EventLog {
    fn on_event(&self, event: &ModelEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
