//! Domain models and invariants.

pub mod artifact;
pub mod config;
pub mod decision;
pub mod error;
pub mod health;
pub mod parameter;
pub mod run;
pub mod series;

pub use artifact::{VersionId, WeightArtifact};
pub use config::{
    AutomationMode, CycleConfig, DeploymentConfig, DeploymentKind, DriftguardConfig,
    EvaluationConfig, RetrainConfig, SourceConfig, StorageConfig, TrackingConfig, TrackingKind,
    TrainingConfig,
};
pub use decision::{AttemptRecord, OrchestratorState, RetrainDecision, RetrainOutcome};
pub use error::{DriftguardError, DriftguardResult};
pub use health::{
    DEFAULT_MAE_THRESHOLD, DEFAULT_T_IN, DEFAULT_T_OUT, HealthCheckResult, MAX_ATTEMPTS,
    SENTINEL_MAE,
};
pub use parameter::{Parameter, ParameterSpec};
pub use run::RunRecord;
pub use series::{Normalization, Observation, SeriesSummary, mean_absolute_error};
