//! Models shared across concurrent runs, keyed by model identifier.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::core::abstraction::AbstractionConfig;
use crate::core::events::EventBus;
use crate::core::model::{AbstractStateModel, SharedModel};

/// Runs against the same model identifier share one model; distinct
/// identifiers never contend.
#[derive(Default)]
pub struct ModelRegistry {
    models: DashMap<String, SharedModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model for `model_identifier`, created with `abstraction` and `bus`
    /// on first request. Later requests ignore both arguments; listeners for a
    /// single run attach through the model's bus instead.
    pub fn get_or_create(
        &self,
        model_identifier: &str,
        abstraction: &AbstractionConfig,
        bus: &EventBus,
    ) -> SharedModel {
        let entry = self
            .models
            .entry(model_identifier.to_string())
            .or_insert_with(|| {
                debug!(model = model_identifier, "creating model");
                AbstractStateModel::new(model_identifier, abstraction.clone(), bus.clone())
                    .into_shared()
            });
        Arc::clone(entry.value())
    }

    pub fn get(&self, model_identifier: &str) -> Option<SharedModel> {
        self.models
            .get(model_identifier)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, model_identifier: &str) -> Option<SharedModel> {
        self.models
            .remove(model_identifier)
            .map(|(_, model)| model)
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
