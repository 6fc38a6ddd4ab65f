use std::sync::Arc;

use driftguard_domain::{DriftguardError, DriftguardResult, HealthCheckResult, Parameter};
use driftguard_ports::{Trainer, TrainingReport};

use crate::evaluator::HealthEvaluator;

/// One training round followed by a fresh health check.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrainAttempt {
    pub training: TrainingReport,
    pub health: HealthCheckResult,
}

/// Runs exactly one training + evaluation round. Retrying is the caller's job.
#[derive(Clone)]
pub struct RetrainExecutor {
    trainer: Arc<dyn Trainer>,
    evaluator: HealthEvaluator,
}

impl RetrainExecutor {
    pub fn new(trainer: Arc<dyn Trainer>, evaluator: HealthEvaluator) -> Self {
        Self { trainer, evaluator }
    }

    /// Train, then re-score the new "latest" artifact.
    ///
    /// Every trainer failure surfaces as `TrainingFailed`, as does a report
    /// with a non-finite test loss.
    pub async fn execute(&self, parameter: &Parameter) -> DriftguardResult<RetrainAttempt> {
        let training = self.trainer.train(parameter).await.map_err(|err| match err {
            DriftguardError::TrainingFailed { .. } => err,
            other => DriftguardError::training(parameter, other),
        })?;
        if !training.test_mse.is_finite() || !training.test_mae.is_finite() {
            return Err(DriftguardError::training(
                parameter,
                format!("non-finite test loss (mse={})", training.test_mse),
            ));
        }
        tracing::info!(
            parameter = %parameter,
            version = %training.version_id,
            test_mse = training.test_mse,
            test_mae = training.test_mae,
            "candidate trained, re-evaluating"
        );

        let health = self.evaluator.evaluate(parameter).await?;
        Ok(RetrainAttempt { training, health })
    }
}
