//! Collaborator capabilities consumed by the retraining runtime.

use std::sync::Arc;

use async_trait::async_trait;

use driftguard_domain::{
    DriftguardError, Observation, Parameter, RunRecord, VersionId, WeightArtifact,
};

mod memory;
mod null;

pub use memory::InMemoryWeightStore;
pub use null::{
    NullDeploymentController, NullPredictor, NullRunRecorder, NullTimeSeriesSource, NullTrainer,
};

pub type PortResult<T> = Result<T, DriftguardError>;

#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    /// Most recent `window_length` cleaned observations, oldest first.
    ///
    /// May return fewer when the history is shorter. Fails with
    /// `SourceUnavailable` on transport errors.
    async fn fetch(&self, parameter: &Parameter, window_length: usize)
    -> PortResult<Vec<Observation>>;
}

#[async_trait]
pub trait Predictor: Send + Sync {
    /// Forecast `T_OUT` normalized values from a normalized input window.
    ///
    /// Fails with `ModelUnavailable` when no artifact is stored for `parameter`.
    async fn forecast(&self, parameter: &Parameter, normalized_window: &[f64])
    -> PortResult<Vec<f64>>;
}

/// Metrics reported by one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub version_id: VersionId,
    pub test_mse: f64,
    pub test_mae: f64,
}

#[async_trait]
pub trait Trainer: Send + Sync {
    /// Train a fresh model and write it to the "latest" slot.
    async fn train(&self, parameter: &Parameter) -> PortResult<TrainingReport>;
}

/// Parameter-keyed artifact persistence with "latest"/"previous" slots and an
/// append-only version history. Every operation is atomic per parameter.
#[async_trait]
pub trait WeightStore: Send + Sync {
    /// Append `artifact` to the history and point "latest" at it.
    ///
    /// Returns the stored version id, which differs from the artifact's when
    /// that id was already taken.
    async fn write_latest(&self, artifact: WeightArtifact) -> PortResult<VersionId>;

    async fn read_latest(&self, parameter: &Parameter) -> PortResult<Option<WeightArtifact>>;

    async fn read_previous(&self, parameter: &Parameter) -> PortResult<Option<WeightArtifact>>;

    async fn latest_version(&self, parameter: &Parameter) -> PortResult<Option<VersionId>> {
        Ok(self
            .read_latest(parameter)
            .await?
            .map(|artifact| artifact.version_id))
    }

    /// Copy "latest" over "previous". When there is no "latest", "previous"
    /// is cleared. Returns whether an artifact was backed up.
    async fn snapshot_latest_to_previous(&self, parameter: &Parameter) -> PortResult<bool>;

    /// Copy "previous" over "latest". When there is no "previous", "latest"
    /// is cleared. Returns whether an artifact was restored.
    async fn restore_previous_to_latest(&self, parameter: &Parameter) -> PortResult<bool>;

    /// Version history, oldest first.
    async fn versions(&self, parameter: &Parameter) -> PortResult<Vec<VersionId>>;
}

#[async_trait]
pub trait DeploymentController: Send + Sync {
    /// Signal the serving workload for `parameter` to reload its weights.
    async fn restart(&self, parameter: &Parameter) -> PortResult<()>;
}

#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn record(&self, record: &RunRecord) -> PortResult<()>;
}

#[derive(Clone)]
pub struct PortSet {
    pub source: Arc<dyn TimeSeriesSource>,
    pub predictor: Arc<dyn Predictor>,
    pub trainer: Arc<dyn Trainer>,
    pub store: Arc<dyn WeightStore>,
    pub deployer: Arc<dyn DeploymentController>,
    pub recorder: Arc<dyn RunRecorder>,
}

impl PortSet {
    pub fn empty() -> Self {
        Self {
            source: Arc::new(NullTimeSeriesSource),
            predictor: Arc::new(NullPredictor),
            trainer: Arc::new(NullTrainer),
            store: Arc::new(InMemoryWeightStore::default()),
            deployer: Arc::new(NullDeploymentController),
            recorder: Arc::new(NullRunRecorder),
        }
    }
}
