//! Recorded observation traces (`schemas/trace/v1.schema.json`).
//!
//! A trace is what a SUT driver saw during one run: per step the concrete
//! state, the actions on offer, optionally the one it executed, the spatial
//! observation, and a reward. Replaying a trace rebuilds the model offline.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::concrete::{ConcreteAction, ConcreteState, NavigableObservation};

pub const TRACE_SCHEMA: &str = include_str!("../../../schemas/trace/v1.schema.json");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<TraceApplication>,
    /// Set when the recorded run was aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
    pub steps: Vec<TraceStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceApplication {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub state: ConcreteState,
    pub actions: Vec<ConcreteAction>,
    /// Index into `actions` of what the driver executed. Unset lets the
    /// selector decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigable: Option<NavigableObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
}

/// Load a trace file, checking it against the bundled schema first.
pub fn load_trace(path: &Path) -> Result<Trace> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read trace {}", path.display()))?;
    parse_trace(&raw).with_context(|| format!("load trace {}", path.display()))
}

pub fn parse_trace(raw: &str) -> Result<Trace> {
    let instance: Value = serde_json::from_str(raw).context("parse trace json")?;
    let schema: Value = serde_json::from_str(TRACE_SCHEMA).context("parse trace schema")?;
    validate_schema(&instance, &schema)?;
    let mut trace: Trace = serde_json::from_value(instance).context("deserialize trace")?;
    validate_steps(&trace)?;
    for action in trace.steps.iter_mut().flat_map(|step| step.actions.iter_mut()) {
        if action.roles.is_empty() {
            action.roles = action.kind.default_roles();
        }
    }
    Ok(trace)
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| anyhow!("compile trace schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("trace schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

fn validate_steps(trace: &Trace) -> Result<()> {
    let errors: Vec<String> = trace
        .steps
        .iter()
        .enumerate()
        .filter_map(|(index, step)| match step.executed {
            Some(executed) if executed >= step.actions.len() => Some(format!(
                "step {index}: executed index {executed} but only {} actions",
                step.actions.len()
            )),
            _ => None,
        })
        .collect();
    if !errors.is_empty() {
        bail!("trace step violations:\n- {}", errors.join("\n- "));
    }
    Ok(())
}
