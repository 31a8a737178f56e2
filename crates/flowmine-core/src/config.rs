//! Configuration management for flowmine
//!
//! Repository-level settings: where the JSON stores live, mining defaults,
//! optimizer thresholds, synthesis cut-off and the engine's default
//! failure strategy.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{FailureStrategy, FlowError, Result};

/// Repository-level flowmine configuration
///
/// Loaded from `.flowmine/config.toml` in the repo root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub mining: MiningDefaults,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Locations of the persisted documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding all documents
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_history_file")]
    pub history_file: String,

    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Relative to `state_dir`
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

/// Defaults for `mine_patterns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningDefaults {
    #[serde(default = "default_min_frequency")]
    pub min_frequency: u64,

    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,

    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Width of the sliding window over raw executions
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

/// Thresholds for optimization analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Minimum index distance between two steps paired for parallel runs
    #[serde(default = "default_min_parallel_distance")]
    pub min_parallel_distance: usize,

    /// A parallel pair must save strictly more than this (ms)
    #[serde(default = "default_min_parallel_savings_ms")]
    pub min_parallel_savings_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub failure_strategy: FailureStrategy,

    #[serde(default)]
    pub yolo_mode: bool,
}

// Default value providers
fn default_state_dir() -> PathBuf {
    PathBuf::from(".planning")
}

fn default_history_file() -> String {
    "workflow-history.json".to_string()
}

fn default_state_file() -> String {
    "workflow-state.json".to_string()
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("workflow-templates").join("discovered")
}

fn default_min_frequency() -> u64 {
    2
}

fn default_min_success_rate() -> f64 {
    0.5
}

fn default_min_length() -> usize {
    2
}

fn default_max_length() -> usize {
    10
}

fn default_window_size() -> usize {
    5
}

fn default_min_parallel_distance() -> usize {
    2
}

fn default_min_parallel_savings_ms() -> f64 {
    1000.0
}

fn default_min_quality_score() -> f64 {
    50.0
}

impl FlowConfig {
    /// Load configuration from `.flowmine/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(".flowmine/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| FlowError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.flowmine/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<PathBuf> {
        let config_dir = repo_root.join(".flowmine");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| FlowError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Re-root relative storage paths under `repo_root`
    pub fn rooted(mut self, repo_root: &Path) -> Self {
        if self.storage.state_dir.is_relative() {
            self.storage.state_dir = repo_root.join(&self.storage.state_dir);
        }
        self
    }

    pub fn history_path(&self) -> PathBuf {
        self.storage.state_dir.join(&self.storage.history_file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.storage.state_dir.join(&self.storage.state_file)
    }

    pub fn templates_path(&self) -> PathBuf {
        self.storage.state_dir.join(&self.storage.templates_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            history_file: default_history_file(),
            state_file: default_state_file(),
            templates_dir: default_templates_dir(),
        }
    }
}

impl Default for MiningDefaults {
    fn default() -> Self {
        Self {
            min_frequency: default_min_frequency(),
            min_success_rate: default_min_success_rate(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            window_size: default_window_size(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_parallel_distance: default_min_parallel_distance(),
            min_parallel_savings_ms: default_min_parallel_savings_ms(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_quality_score: default_min_quality_score(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let config = FlowConfig::load_or_default(dir.path()).unwrap();

        assert_eq!(config.mining.min_frequency, 2);
        assert_eq!(config.optimizer.min_parallel_savings_ms, 1000.0);
        assert_eq!(config.engine.failure_strategy, FailureStrategy::StopOnError);
        assert!(config.history_path().ends_with("workflow-history.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".flowmine")).unwrap();
        std::fs::write(
            dir.path().join(".flowmine/config.toml"),
            "[mining]\nmin_length = 3\n\n[engine]\nfailure_strategy = \"rollback-on-error\"\n",
        )
        .unwrap();

        let config = FlowConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.mining.min_length, 3);
        assert_eq!(config.mining.max_length, 10);
        assert_eq!(config.engine.failure_strategy, FailureStrategy::RollbackOnError);
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = tempdir().unwrap();
        let path = FlowConfig::write_default(dir.path()).unwrap();
        assert!(path.exists());

        let config = FlowConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.synthesis.min_quality_score, 50.0);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".flowmine")).unwrap();
        std::fs::write(dir.path().join(".flowmine/config.toml"), "mining = 3").unwrap();

        let err = FlowConfig::load_or_default(dir.path()).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }
}
