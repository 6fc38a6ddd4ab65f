//! Error taxonomy shared by every port and the orchestration runtime.

use thiserror::Error;

use crate::parameter::Parameter;

pub type DriftguardResult<T> = Result<T, DriftguardError>;

#[derive(Debug, Error)]
pub enum DriftguardError {
    /// Fewer observations than the evaluation window needs.
    #[error("[{parameter}] data unavailable: needed {needed} observations, got {available}")]
    DataUnavailable {
        parameter: Parameter,
        needed: usize,
        available: usize,
    },

    /// The time-series source could not be reached.
    #[error("[{parameter}] time-series source unavailable: {message}")]
    SourceUnavailable { parameter: Parameter, message: String },

    /// No usable artifact in the "latest" slot.
    #[error("[{parameter}] model unavailable: {message}")]
    ModelUnavailable { parameter: Parameter, message: String },

    /// Training collaborator errored or produced a non-finite result.
    #[error("[{parameter}] training failed: {message}")]
    TrainingFailed { parameter: Parameter, message: String },

    #[error("[{parameter}] deployment restart failed: {message}")]
    DeploymentRestartFailed { parameter: Parameter, message: String },

    #[error("run recorder unavailable: {message}")]
    RecorderUnavailable { message: String },

    #[error("[{parameter}] weight store error: {message}")]
    Storage { parameter: Parameter, message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DriftguardError {
    /// Expected conditions that the evaluator folds into a fail-closed result.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. }
                | Self::SourceUnavailable { .. }
                | Self::ModelUnavailable { .. }
        )
    }

    pub fn storage<E: std::fmt::Display>(parameter: &Parameter, e: E) -> Self {
        Self::Storage {
            parameter: parameter.clone(),
            message: e.to_string(),
        }
    }

    pub fn training<E: std::fmt::Display>(parameter: &Parameter, e: E) -> Self {
        Self::TrainingFailed {
            parameter: parameter.clone(),
            message: e.to_string(),
        }
    }

    pub fn model_unavailable<E: std::fmt::Display>(parameter: &Parameter, e: E) -> Self {
        Self::ModelUnavailable {
            parameter: parameter.clone(),
            message: e.to_string(),
        }
    }

    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal {
            message: e.to_string(),
        }
    }
}
