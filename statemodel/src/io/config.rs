//! Model configuration stored in `statemodel.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::abstraction::AbstractionConfig;
use crate::core::identity::model_identifier;
use crate::core::selector::{PathTarget, QTable, RlParameters, SelectionAlgorithm, SelectorOptions};

pub const DEFAULT_CONFIG_FILE: &str = "statemodel.toml";

/// Invalid configuration. The CLI maps it to its own exit code.
#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// State model configuration (TOML).
///
/// Edited by humans. Missing fields default to values that describe an
/// unnamed application abstracted by its `title` and action `kind`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub application: ApplicationConfig,
    pub abstraction: AbstractionTags,
    pub selection: SelectionConfig,
    pub reinforcement: ReinforcementConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub version: String,
}

/// Tags that define identity. Both lists must be non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AbstractionTags {
    pub state_tags: Vec<String>,
    pub action_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SelectionConfig {
    pub algorithm: SelectionAlgorithm,
    /// Seeds every selector RNG; unset means a fresh sequence per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// States a path search may expand before it defers.
    pub max_path_expansions: usize,
    /// Action fingerprint the `path` algorithm steers towards. Unset means the
    /// nearest state with an unvisited action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReinforcementConfig {
    pub epsilon: f64,
    pub learning_rate: f64,
    pub discount: f64,
    pub default_q: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    #[default]
    None,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub mode: PersistenceMode,
    /// JSON store file, relative to the working directory.
    pub path: PathBuf,
    /// Write from a worker thread instead of the decision loop.
    pub background: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "application".to_string(),
            version: "0.0.0".to_string(),
        }
    }
}

impl Default for AbstractionTags {
    fn default() -> Self {
        Self {
            state_tags: vec!["title".to_string()],
            action_tags: vec!["kind".to_string()],
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            algorithm: SelectionAlgorithm::Unvisited,
            seed: None,
            max_path_expansions: 1_000,
            target_fingerprint: None,
        }
    }
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        let parameters = RlParameters::default();
        Self {
            epsilon: 0.1,
            learning_rate: parameters.learning_rate,
            discount: parameters.discount,
            default_q: parameters.default_q,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::None,
            path: PathBuf::from("statemodel-store.json"),
            background: true,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.application.name.trim().is_empty() {
            return Err(invalid("application.name must be non-empty"));
        }
        if self.application.version.trim().is_empty() {
            return Err(invalid("application.version must be non-empty"));
        }
        if self.abstraction.state_tags.iter().all(|tag| tag.trim().is_empty()) {
            return Err(invalid("abstraction.state_tags must name at least one tag"));
        }
        if self.abstraction.action_tags.iter().all(|tag| tag.trim().is_empty()) {
            return Err(invalid("abstraction.action_tags must name at least one tag"));
        }
        if self.selection.max_path_expansions == 0 {
            return Err(invalid("selection.max_path_expansions must be > 0"));
        }
        let rl = &self.reinforcement;
        if !(0.0..=1.0).contains(&rl.epsilon) {
            return Err(invalid("reinforcement.epsilon must be within [0, 1]"));
        }
        if !(rl.learning_rate > 0.0 && rl.learning_rate <= 1.0) {
            return Err(invalid("reinforcement.learning_rate must be within (0, 1]"));
        }
        if !(0.0..=1.0).contains(&rl.discount) {
            return Err(invalid("reinforcement.discount must be within [0, 1]"));
        }
        if self.persistence.mode == PersistenceMode::Json
            && self.persistence.path.as_os_str().is_empty()
        {
            return Err(invalid("persistence.path is required for json persistence"));
        }
        Ok(())
    }

    pub fn abstraction(&self) -> Result<AbstractionConfig> {
        AbstractionConfig::new(
            self.abstraction.state_tags.iter().cloned(),
            self.abstraction.action_tags.iter().cloned(),
        )
        .map_err(|err| ConfigError(err.to_string()).into())
    }

    pub fn model_identifier(&self) -> String {
        model_identifier(
            self.application.name.trim(),
            self.application.version.trim(),
            &self.abstraction.state_tags,
            &self.abstraction.action_tags,
        )
    }

    pub fn rl_parameters(&self) -> RlParameters {
        RlParameters {
            learning_rate: self.reinforcement.learning_rate,
            discount: self.reinforcement.discount,
            default_q: self.reinforcement.default_q,
        }
    }

    pub fn selector_options(&self) -> SelectorOptions {
        SelectorOptions {
            seed: self.selection.seed,
            max_expansions: self.selection.max_path_expansions,
            path_target: self
                .selection
                .target_fingerprint
                .clone()
                .map_or(PathTarget::AnyUnvisited, PathTarget::Fingerprint),
            epsilon: self.reinforcement.epsilon,
            q_table: QTable::shared(self.rl_parameters()),
        }
    }
}

fn invalid(message: &str) -> anyhow::Error {
    ConfigError(message.to_string()).into()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ModelConfig::default()`.
pub fn load_config(path: &Path) -> Result<ModelConfig> {
    if !path.exists() {
        let cfg = ModelConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ModelConfig = toml::from_str(&contents)
        .map_err(|err| ConfigError(format!("parse {}: {err}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ModelConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename it into place.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path has no file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
