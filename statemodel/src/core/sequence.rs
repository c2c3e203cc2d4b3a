//! Linear per-run log of executed steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{ModelError, Result};
use crate::core::events::{EventBus, ModelEvent};
use crate::core::identity::composite_id;
use crate::core::types::{ActionId, StateId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequenceStatus {
    Running,
    Completed,
    InterruptedByUser,
    InterruptedBySystem { message: String },
}

impl SequenceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub id: String,
    pub model_identifier: String,
    pub started_at: DateTime<Utc>,
    pub status: SequenceStatus,
    pub step_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub index: usize,
    pub state_id: StateId,
    pub action_id: ActionId,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Records one sequence at a time and publishes its lifecycle on the bus.
#[derive(Debug)]
pub struct SequenceRecorder {
    bus: EventBus,
    active: Option<SequenceInfo>,
    steps: Vec<SequenceStep>,
    started: u64,
}

impl SequenceRecorder {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            active: None,
            steps: Vec::new(),
            started: 0,
        }
    }

    pub fn start(&mut self, model_identifier: &str) -> Result<&SequenceInfo> {
        if let Some(active) = &self.active {
            return Err(ModelError::Sequence(format!(
                "sequence {} is still running",
                active.id
            )));
        }

        self.started += 1;
        let started_at = Utc::now();
        let id = composite_id(&[
            model_identifier.to_string(),
            started_at.to_rfc3339(),
            self.started.to_string(),
        ]);
        let info = SequenceInfo {
            id,
            model_identifier: model_identifier.to_string(),
            started_at,
            status: SequenceStatus::Running,
            step_count: 0,
        };
        info!(sequence = %info.id, model = model_identifier, "sequence started");
        self.steps.clear();
        self.bus.emit(&ModelEvent::SequenceStarted(info.clone()));
        Ok(self.active.insert(info))
    }

    pub fn append_step(
        &mut self,
        state_id: &StateId,
        action_id: &ActionId,
        description: &str,
    ) -> Result<&SequenceStep> {
        let Some(active) = self.active.as_mut() else {
            return Err(ModelError::Sequence(
                "cannot append a step without an active sequence".to_string(),
            ));
        };

        let step = SequenceStep {
            index: self.steps.len(),
            state_id: state_id.clone(),
            action_id: action_id.clone(),
            description: description.to_string(),
            timestamp: Utc::now(),
        };
        active.step_count = step.index + 1;
        debug!(sequence = %active.id, index = step.index, action = %action_id, "sequence step");
        self.bus.emit(&ModelEvent::SequenceStepAdded {
            sequence: active.clone(),
            step: step.clone(),
        });
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Close the active sequence as completed. No-op without one.
    pub fn end(&mut self) -> Option<SequenceInfo> {
        self.finish(SequenceStatus::Completed)
    }

    pub fn interrupt_by_user(&mut self) -> Option<SequenceInfo> {
        self.finish(SequenceStatus::InterruptedByUser)
    }

    pub fn interrupt_by_system(&mut self, message: &str) -> Option<SequenceInfo> {
        self.finish(SequenceStatus::InterruptedBySystem {
            message: message.to_string(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<&SequenceInfo> {
        self.active.as_ref()
    }

    /// Steps of the active sequence, or of the last finished one.
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    fn finish(&mut self, status: SequenceStatus) -> Option<SequenceInfo> {
        let mut info = self.active.take()?;
        info.status = status;
        info!(sequence = %info.id, steps = info.step_count, status = ?info.status, "sequence ended");
        self.bus.emit(&ModelEvent::SequenceEnded(info.clone()));
        Some(info)
    }
}
