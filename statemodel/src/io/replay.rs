//! Drive a [`ModelManager`] through a recorded trace.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::error::ModelError;
use crate::core::events::EventBus;
use crate::core::manager::ModelManager;
use crate::core::model::ModelSummary;
use crate::core::registry::ModelRegistry;
use crate::io::config::ModelConfig;
use crate::io::persistence::{PersistenceStats, persistence_from_config};
use crate::io::trace::Trace;

/// Outcome of one replayed run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub model_identifier: String,
    pub sequence_id: String,
    pub steps: usize,
    /// Steps whose action came from the trace.
    pub recorded: usize,
    /// Steps whose action the selector chose.
    pub selected: usize,
    /// Non-deterministic transitions and conflicting navigable edges.
    pub conflicts: usize,
    pub model: ModelSummary,
    pub persistence: PersistenceStats,
}

/// Replay `trace` into the model `config` identifies, creating it in
/// `registry` on first use. The persistence `config` names is attached for
/// this run only.
#[instrument(skip_all, fields(steps = trace.steps.len()))]
pub fn replay(
    config: &ModelConfig,
    trace: &Trace,
    registry: &ModelRegistry,
) -> Result<ReplaySummary> {
    config.validate()?;
    if let Some(app) = &trace.application {
        if app.name != config.application.name || app.version != config.application.version {
            warn!(
                trace = %format!("{} {}", app.name, app.version),
                config = %format!("{} {}", config.application.name, config.application.version),
                "trace was recorded against another application"
            );
        }
    }

    let abstraction = config.abstraction()?;
    let persistence = persistence_from_config(&config.persistence)?;

    let model_identifier = config.model_identifier();
    let model = registry.get_or_create(&model_identifier, &abstraction, &EventBus::default());
    // Each run writes to its own store, also when the model outlives the run.
    let subscription = model
        .read()
        .map_err(|err| ModelError::LockPoisoned(err.to_string()))?
        .bus()
        .attach(persistence.listener());
    let mut manager = ModelManager::with_algorithm(
        model,
        config.selection.algorithm,
        &config.selector_options(),
    )?;

    let sequence = manager.notify_sequence_started()?;
    let mut summary = ReplaySummary {
        model_identifier,
        sequence_id: sequence.id,
        steps: 0,
        recorded: 0,
        selected: 0,
        conflicts: 0,
        model: manager.summary()?,
        persistence: PersistenceStats::default(),
    };

    let outcome = drive(&mut manager, trace, &mut summary);
    match (&outcome, &trace.interrupted) {
        (Err(err), _) => {
            manager.notify_sequence_interrupted_by_system(&format!("{err:#}"))?;
        }
        (Ok(()), Some(message)) => {
            manager.notify_sequence_interrupted_by_system(message)?;
        }
        (Ok(()), None) => {
            manager.notify_sequence_stopped()?;
        }
    }
    manager.notify_testing_ended()?;
    drop(subscription);
    outcome?;

    summary.model = manager.summary()?;
    summary.persistence = persistence.stats();
    info!(
        states = summary.model.states,
        actions = summary.model.actions,
        conflicts = summary.conflicts,
        "replay finished"
    );
    Ok(summary)
}

fn drive(manager: &mut ModelManager, trace: &Trace, summary: &mut ReplaySummary) -> Result<()> {
    for (index, step) in trace.steps.iter().enumerate() {
        tolerate_conflict(
            manager
                .notify_new_state_reached(&step.state, &step.actions)
                .map(|_| ()),
            summary,
        )
        .with_context(|| format!("step {index}: state"))?;
        summary.steps += 1;

        if step.actions.is_empty() {
            continue;
        }
        let action = match step.executed {
            Some(executed) => {
                summary.recorded += 1;
                &step.actions[executed]
            }
            None => {
                summary.selected += 1;
                manager
                    .select_action(&step.actions)
                    .with_context(|| format!("step {index}: select"))?
            }
        };
        let action_id = manager
            .notify_action_executed(action)
            .with_context(|| format!("step {index}: execute"))?;
        if let Some(reward) = step.reward {
            manager.record_reward(reward)?;
        }
        if let Some(observation) = &step.navigable {
            tolerate_conflict(
                manager
                    .notify_new_navigable_state(
                        observation.nodes.clone(),
                        observation.entities.clone(),
                        &action.description,
                        &action_id,
                    )
                    .map(|_| ()),
                summary,
            )
            .with_context(|| format!("step {index}: navigable"))?;
        }
    }
    Ok(())
}

/// Identity conflicts are local: count, log and carry on.
fn tolerate_conflict(
    result: std::result::Result<(), ModelError>,
    summary: &mut ReplaySummary,
) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err @ ModelError::IdentityConflict { .. }) => {
            warn!(error = %err, "conflict ignored");
            summary.conflicts += 1;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
