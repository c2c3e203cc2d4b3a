//! Externalizes the model to a durable store behind the event-listener seam.
//!
//! [`StoreWriter`] turns each [`ModelEvent`] into hydrated records. It runs
//! either inline ([`StorePersistence`]) or on a worker thread
//! ([`BackgroundPersistence`]). A hydration or store failure skips that entity,
//! is logged and counted, and never stops the run.

pub mod hydrator;
pub mod schema;
pub mod store;
mod worker;

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::events::{EventListener, ModelEvent};
use crate::io::config::{PersistenceConfig, PersistenceMode};
use crate::io::persistence::hydrator::{
    AbstractActionHydrator, AbstractStateHydrator, HydrationError, Hydrator,
    NavigableActionHydrator, NavigableStateHydrator, SequenceHydrator, SequenceStepHydrator,
    abstract_action_key,
};
use crate::io::persistence::schema::ABSTRACT_ACTION;
use crate::io::persistence::store::{JsonRecordStore, RecordStore};

pub use worker::BackgroundPersistence;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceStats {
    pub written: u64,
    pub failed: u64,
}

/// Counters readable while a writer owns the store.
pub type SharedStats = Arc<Mutex<PersistenceStats>>;

/// Applies model events to a record store.
pub struct StoreWriter<S: RecordStore> {
    sink: Sink<S>,
    states: AbstractStateHydrator,
    actions: AbstractActionHydrator,
    navigable_states: NavigableStateHydrator,
    navigable_actions: NavigableActionHydrator,
    sequences: SequenceHydrator,
    steps: SequenceStepHydrator,
}

struct Sink<S> {
    store: S,
    stats: SharedStats,
}

impl<S: RecordStore> StoreWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            sink: Sink {
                store,
                stats: SharedStats::default(),
            },
            states: AbstractStateHydrator::default(),
            actions: AbstractActionHydrator::default(),
            navigable_states: NavigableStateHydrator::default(),
            navigable_actions: NavigableActionHydrator::default(),
            sequences: SequenceHydrator::default(),
            steps: SequenceStepHydrator::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.sink.store
    }

    pub fn into_store(self) -> S {
        self.sink.store
    }

    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.sink.stats)
    }

    pub fn apply(&mut self, event: &ModelEvent) {
        let sink = &mut self.sink;
        match event {
            ModelEvent::StateAdded(state) | ModelEvent::StateChanged(state) => {
                sink.write(&self.states, state);
            }
            ModelEvent::ActionAdded(action) | ModelEvent::ActionChanged(action) => {
                sink.write(&self.actions, action);
            }
            ModelEvent::TransitionAdded {
                source,
                action,
                target,
            } => {
                // The unexecuted edge was keyed without a target.
                let pending = abstract_action_key(
                    &action.source,
                    None,
                    &action.id,
                    &action.model_identifier,
                );
                if let Err(err) = sink.store.remove(ABSTRACT_ACTION, &pending) {
                    sink.fail(&err);
                }
                sink.write(&self.states, source);
                sink.write(&self.states, target);
                sink.write(&self.actions, action);
            }
            ModelEvent::NavigableStateAdded(state) | ModelEvent::NavigableStateChanged(state) => {
                sink.write(&self.navigable_states, state);
            }
            ModelEvent::NavigableTransitionAdded {
                source,
                action,
                target,
            } => {
                sink.write(&self.navigable_states, source);
                sink.write(&self.navigable_states, target);
                sink.write(&self.navigable_actions, action);
            }
            ModelEvent::SequenceStarted(info) | ModelEvent::SequenceEnded(info) => {
                sink.write(&self.sequences, info);
            }
            ModelEvent::SequenceStepAdded { sequence, step } => {
                sink.write(&self.sequences, sequence);
                sink.write(&self.steps, &(sequence.clone(), step.clone()));
            }
        }
    }

    pub fn flush(&mut self) {
        if let Err(err) = self.sink.store.flush() {
            self.sink.fail(&err);
        }
    }
}

impl<S: RecordStore> Sink<S> {
    fn write<T, H: Hydrator<T>>(&mut self, hydrator: &H, domain: &T) {
        let record = match hydrator.to_record(domain) {
            Ok(record) => record,
            Err(err) => {
                self.reject(&err);
                return;
            }
        };
        debug!(class = %record.class, key = %record.key, "persisting record");
        match self.store.upsert(record) {
            Ok(()) => self.count(|stats| stats.written += 1),
            Err(err) => self.fail(&err),
        }
    }

    fn reject(&self, err: &HydrationError) {
        warn!(error = %err, "entity not persisted");
        self.count(|stats| stats.failed += 1);
    }

    fn fail(&self, err: &anyhow::Error) {
        warn!(error = %format!("{err:#}"), "store write failed");
        self.count(|stats| stats.failed += 1);
    }

    fn count(&self, update: impl FnOnce(&mut PersistenceStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Writes every event inline, on the thread that emitted it.
pub struct StorePersistence<S: RecordStore> {
    writer: Mutex<StoreWriter<S>>,
}

impl<S: RecordStore> StorePersistence<S> {
    pub fn new(store: S) -> Self {
        Self {
            writer: Mutex::new(StoreWriter::new(store)),
        }
    }

    pub fn stats(&self) -> PersistenceStats {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = writer.sink.stats.lock().unwrap_or_else(PoisonError::into_inner);
        *stats
    }

    /// Run `read` against the underlying store.
    pub fn with_store<R>(&self, read: impl FnOnce(&S) -> R) -> R {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        read(writer.store())
    }
}

impl<S: RecordStore> EventListener for StorePersistence<S> {
    fn on_event(&self, event: &ModelEvent) {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(event);
    }

    fn flush(&self) {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
    }
}

/// Persistence that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyPersistence;

impl EventListener for DummyPersistence {
    fn on_event(&self, _event: &ModelEvent) {}
}

/// Listener chosen by configuration plus the counters it reports.
pub struct Persistence {
    listener: Arc<dyn EventListener>,
    stats: SharedStats,
}

impl Persistence {
    pub fn listener(&self) -> Arc<dyn EventListener> {
        Arc::clone(&self.listener)
    }

    pub fn stats(&self) -> PersistenceStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the persistence listener described by `config`.
pub fn persistence_from_config(config: &PersistenceConfig) -> Result<Persistence> {
    match config.mode {
        PersistenceMode::None => {
            debug!("persistence disabled");
            Ok(Persistence {
                listener: Arc::new(DummyPersistence),
                stats: SharedStats::default(),
            })
        }
        PersistenceMode::Json => {
            let store = JsonRecordStore::open(&config.path)?;
            let writer = StoreWriter::new(store);
            let stats = writer.stats();
            info!(path = %config.path.display(), background = config.background, "json persistence");
            let listener: Arc<dyn EventListener> = if config.background {
                Arc::new(BackgroundPersistence::spawn(writer)?)
            } else {
                Arc::new(StorePersistence {
                    writer: Mutex::new(writer),
                })
            };
            Ok(Persistence { listener, stats })
        }
    }
}
