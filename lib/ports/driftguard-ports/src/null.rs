use async_trait::async_trait;

use driftguard_domain::{DriftguardError, Observation, Parameter, RunRecord};

use crate::{
    DeploymentController, PortResult, Predictor, RunRecorder, TimeSeriesSource, Trainer,
    TrainingReport,
};

#[derive(Clone, Copy, Default)]
pub struct NullTimeSeriesSource;

#[async_trait]
impl TimeSeriesSource for NullTimeSeriesSource {
    async fn fetch(&self, parameter: &Parameter, _window_length: usize)
    -> PortResult<Vec<Observation>> {
        Err(DriftguardError::SourceUnavailable {
            parameter: parameter.clone(),
            message: "no time-series source configured".to_string(),
        })
    }
}

#[derive(Clone, Copy, Default)]
pub struct NullPredictor;

#[async_trait]
impl Predictor for NullPredictor {
    async fn forecast(&self, parameter: &Parameter, _normalized_window: &[f64])
    -> PortResult<Vec<f64>> {
        Err(DriftguardError::model_unavailable(
            parameter,
            "no predictor configured",
        ))
    }
}

#[derive(Clone, Copy, Default)]
pub struct NullTrainer;

#[async_trait]
impl Trainer for NullTrainer {
    async fn train(&self, parameter: &Parameter) -> PortResult<TrainingReport> {
        Err(DriftguardError::training(parameter, "no trainer configured"))
    }
}

/// Accepts restarts without signalling anything. Used for local runs.
#[derive(Clone, Copy, Default)]
pub struct NullDeploymentController;

#[async_trait]
impl DeploymentController for NullDeploymentController {
    async fn restart(&self, parameter: &Parameter) -> PortResult<()> {
        tracing::info!(parameter = %parameter, "restart skipped (no deployment controller)");
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
pub struct NullRunRecorder;

#[async_trait]
impl RunRecorder for NullRunRecorder {
    async fn record(&self, _record: &RunRecord) -> PortResult<()> {
        Ok(())
    }
}
