//! Layered configuration: `--config` file, then the user config dir, then defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::agents::{ClaudeEvaluator, CliRunner, Evaluator, Model, RuleEvaluator};
use crate::deliberation::{Arbiter, PolicyKind, SpecialistKind};
use crate::executor::ExecutorConfig;

/// Upper bound on configured retries per task
pub const MAX_RETRIES: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub task_timeout_secs: u64,
    pub phase_concurrency: usize,
    /// Available specialist entries the arbiter needs
    pub min_quorum: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8000,
            task_timeout_secs: 180,
            phase_concurrency: 4,
            min_quorum: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationSettings {
    pub policy: PolicyKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Rules,
    Claude,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rules" => Ok(Backend::Rules),
            "claude" => Ok(Backend::Claude),
            other => Err(format!("unknown evaluator backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    pub backend: Backend,
    pub claude_path: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub model: Model,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Rules,
            claude_path: PathBuf::from("claude"),
            working_dir: None,
            model: Model::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub executor: ExecutorSettings,
    pub arbitration: ArbitrationSettings,
    pub evaluator: EvaluatorSettings,
    pub roster: Vec<SpecialistKind>,
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            executor: ExecutorSettings::default(),
            arbitration: ArbitrationSettings::default(),
            evaluator: EvaluatorSettings::default(),
            roster: SpecialistKind::default_roster(),
            data_dir: None,
        }
    }
}

impl Config {
    /// `~/.config/orca-lift/config.yaml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("orca-lift").join("config.yaml"))
    }

    /// Explicit path must exist; the default path is optional
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        tracing::debug!("Config loaded from {:?}", path);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.roster.is_empty() {
            return Err(anyhow!("roster must name at least one specialist"));
        }
        if self.executor.max_retries > MAX_RETRIES {
            return Err(anyhow!(
                "executor.max_retries {} exceeds {}",
                self.executor.max_retries,
                MAX_RETRIES
            ));
        }
        if self.executor.phase_concurrency == 0 {
            return Err(anyhow!("executor.phase_concurrency must be at least 1"));
        }
        if self.executor.min_quorum > self.roster.len() {
            return Err(anyhow!(
                "executor.min_quorum {} exceeds roster size {}",
                self.executor.min_quorum,
                self.roster.len()
            ));
        }
        Ok(())
    }

    /// Configured data dir, else the platform data dir, else `./data`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("orca-lift"))
                .unwrap_or_else(|| PathBuf::from("data"))
        })
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let s = &self.executor;
        ExecutorConfig {
            max_retries: s.max_retries,
            base_backoff: Duration::from_millis(s.base_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms),
            task_timeout: Duration::from_secs(s.task_timeout_secs),
            phase_concurrency: s.phase_concurrency.max(1),
        }
    }

    pub fn arbiter(&self) -> Arbiter {
        Arbiter::new(self.arbitration.policy.build()).with_min_quorum(self.executor.min_quorum)
    }

    pub fn evaluator(&self) -> Result<Arc<dyn Evaluator>> {
        match self.evaluator.backend {
            Backend::Rules => Ok(Arc::new(RuleEvaluator::new())),
            Backend::Claude => {
                let working_dir = match &self.evaluator.working_dir {
                    Some(dir) => dir.clone(),
                    None => std::env::current_dir().context("Failed to resolve working dir")?,
                };
                let runner = CliRunner::new(working_dir)
                    .with_claude_path(self.evaluator.claude_path.clone());
                Ok(Arc::new(ClaudeEvaluator::new(runner, self.evaluator.model)))
            }
        }
    }
}
