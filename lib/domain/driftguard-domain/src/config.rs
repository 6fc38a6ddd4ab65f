//! Service configuration loaded from YAML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::health::{DEFAULT_MAE_THRESHOLD, DEFAULT_T_IN, DEFAULT_T_OUT, MAX_ATTEMPTS};
use crate::parameter::{Parameter, ParameterSpec};

/// Whether an unhealthy model may be retrained without a human in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationMode {
    Auto,
    /// Drift is surfaced for review and nothing is mutated.
    #[default]
    ManualConfirm,
}

impl AutomationMode {
    pub fn from_flag(enabled: bool) -> Self {
        if enabled { Self::Auto } else { Self::ManualConfirm }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftguardConfig {
    pub parameters: Vec<ParameterSpec>,
    pub automation_mode: AutomationMode,
    pub evaluation: EvaluationConfig,
    pub retrain: RetrainConfig,
    pub training: TrainingConfig,
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub deployment: DeploymentConfig,
    pub tracking: TrackingConfig,
    pub cycle: CycleConfig,
}

impl Default for DriftguardConfig {
    fn default() -> Self {
        Self {
            parameters: vec![
                ParameterSpec::unbounded("T2M"),
                ParameterSpec {
                    name: Parameter::new("RH2M"),
                    min: Some(0.0),
                    max: Some(100.0),
                },
                ParameterSpec {
                    name: Parameter::new("WS2M"),
                    min: Some(0.0),
                    max: None,
                },
            ],
            automation_mode: AutomationMode::default(),
            evaluation: EvaluationConfig::default(),
            retrain: RetrainConfig::default(),
            training: TrainingConfig::default(),
            storage: StorageConfig::default(),
            source: SourceConfig::default(),
            deployment: DeploymentConfig::default(),
            tracking: TrackingConfig::default(),
            cycle: CycleConfig::default(),
        }
    }
}

impl DriftguardConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load_from_path`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            bail!("at least one parameter must be configured");
        }
        if self.evaluation.t_in == 0 || self.evaluation.t_out == 0 {
            bail!("evaluation windows must be non-empty");
        }
        if !(self.evaluation.mae_threshold > 0.0) {
            bail!("mae_threshold must be positive");
        }
        if self.retrain.max_attempts == 0 {
            bail!("retrain.max_attempts must be at least 1");
        }
        if !(self.training.train_split > 0.0 && self.training.train_split < 1.0) {
            bail!("training.train_split must be within (0, 1)");
        }
        if self.cycle.max_parallel == 0 {
            bail!("cycle.max_parallel must be at least 1");
        }
        if self.tracking.timeout_secs == 0
            || self.deployment.timeout_secs == 0
            || self.retrain.restart_timeout_secs == 0
            || self.cycle.record_timeout_secs == 0
        {
            bail!("timeouts must be at least one second");
        }
        Ok(())
    }

    pub fn parameter_names(&self) -> Vec<Parameter> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn spec_for(&self, parameter: &Parameter) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| &p.name == parameter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub t_in: usize,
    pub t_out: usize,
    pub mae_threshold: f64,
    /// Extra observations requested beyond `t_in + t_out`.
    pub fetch_margin: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            t_in: DEFAULT_T_IN,
            t_out: DEFAULT_T_OUT,
            mae_threshold: DEFAULT_MAE_THRESHOLD,
            fetch_margin: 5,
        }
    }
}

impl EvaluationConfig {
    pub fn window_len(&self) -> usize {
        self.t_in + self.t_out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainConfig {
    pub max_attempts: u32,
    pub attempt_timeout_secs: Option<u64>,
    /// Upper bound on one deployment restart request.
    pub restart_timeout_secs: u64,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            attempt_timeout_secs: None,
            restart_timeout_secs: 120,
        }
    }
}

impl RetrainConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub history_days: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub train_split: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            history_days: 5 * 365 + 4,
            epochs: 200,
            learning_rate: 0.05,
            train_split: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub models_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding one `<PARAM>.csv` per parameter.
    pub data_dir: PathBuf,
    /// Raw value marking a missing observation.
    pub missing_sentinel: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            missing_sentinel: -999.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentKind {
    #[default]
    Kubectl,
    Noop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub kind: DeploymentKind,
    pub namespace: String,
    pub deployment_prefix: String,
    pub kubectl_bin: String,
    /// `kubectl` is killed when it runs longer than this.
    pub timeout_secs: u64,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            kind: DeploymentKind::default(),
            namespace: "weather-mlops".to_string(),
            deployment_prefix: "inference-".to_string(),
            kubectl_bin: "kubectl".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingKind {
    #[default]
    Jsonl,
    Mlflow,
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub kind: TrackingKind,
    pub runs_path: PathBuf,
    pub mlflow_uri: String,
    pub experiment: String,
    /// Connect and per-request timeout for the tracking server.
    pub timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            kind: TrackingKind::default(),
            runs_path: PathBuf::from("runs/retraining.jsonl"),
            mlflow_uri: "http://mlflow:5005".to_string(),
            experiment: "llm4ts-drift-monitoring".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Parameters processed concurrently. 1 keeps the sequential order.
    pub max_parallel: usize,
    /// Longest a single run record may take before it is given up on.
    pub record_timeout_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            record_timeout_secs: 60,
        }
    }
}

impl CycleConfig {
    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_secs)
    }
}
