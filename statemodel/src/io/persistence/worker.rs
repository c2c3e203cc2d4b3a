//! Store writes on a dedicated thread.

use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::events::{EventListener, ModelEvent};
use crate::io::persistence::StoreWriter;
use crate::io::persistence::store::RecordStore;

enum Message {
    Event(Box<ModelEvent>),
    Flush(Sender<()>),
}

/// Fire-and-forget persistence. Events cross a FIFO channel to a worker that
/// owns the store, so writes land in emission order without blocking the
/// decision loop. `flush` waits until everything sent before it is stored.
pub struct BackgroundPersistence {
    sender: Mutex<Option<Sender<Message>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundPersistence {
    pub fn spawn<S: RecordStore + 'static>(mut writer: StoreWriter<S>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Message>();
        let handle = thread::Builder::new()
            .name("statemodel-persistence".to_string())
            .spawn(move || {
                for message in receiver {
                    match message {
                        Message::Event(event) => writer.apply(&event),
                        Message::Flush(ack) => {
                            writer.flush();
                            // The waiter may have given up; nothing to report then.
                            let _ = ack.send(());
                        }
                    }
                }
                writer.flush();
                debug!("persistence worker stopped");
            })
            .context("spawn persistence worker")?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn send(&self, message: Message) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Stop accepting events, drain the queue, and join the worker.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("persistence worker panicked");
            }
        }
    }
}

impl EventListener for BackgroundPersistence {
    fn on_event(&self, event: &ModelEvent) {
        if !self.send(Message::Event(Box::new(event.clone()))) {
            warn!(event = %event.kind(), "persistence worker gone; event dropped");
        }
    }

    fn flush(&self) {
        let (ack, done) = mpsc::channel();
        if self.send(Message::Flush(ack)) && done.recv().is_err() {
            warn!("persistence worker stopped before flush completed");
        }
    }
}

impl Drop for BackgroundPersistence {
    fn drop(&mut self) {
        self.shutdown();
    }
}
