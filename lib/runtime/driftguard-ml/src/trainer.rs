use std::sync::Arc;

use async_trait::async_trait;
use ndarray::Axis;

use driftguard_domain::{
    DriftguardError, DriftguardResult, Normalization, Parameter, TrainingConfig, WeightArtifact,
};
use driftguard_ports::{PortResult, TimeSeriesSource, Trainer, TrainingReport, WeightStore};

use crate::forecaster::LinearForecaster;
use crate::window::WindowSet;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Fit {
    train_mse: f64,
    test_mse: f64,
    test_mae: f64,
}

/// Fits a fresh `LinearForecaster` on the parameter's history and publishes
/// it to the "latest" slot.
pub struct LinearTrainer {
    source: Arc<dyn TimeSeriesSource>,
    store: Arc<dyn WeightStore>,
    config: TrainingConfig,
    t_in: usize,
    t_out: usize,
}

impl LinearTrainer {
    pub fn new(
        source: Arc<dyn TimeSeriesSource>,
        store: Arc<dyn WeightStore>,
        config: TrainingConfig,
        t_in: usize,
        t_out: usize,
    ) -> Self {
        Self {
            source,
            store,
            config,
            t_in,
            t_out,
        }
    }
}

#[async_trait]
impl Trainer for LinearTrainer {
    async fn train(&self, parameter: &Parameter) -> PortResult<TrainingReport> {
        let history = self
            .source
            .fetch(parameter, self.config.history_days)
            .await?;
        let values: Vec<f64> = history.iter().map(|obs| obs.value).collect();
        tracing::info!(
            parameter = %parameter,
            observations = values.len(),
            epochs = self.config.epochs,
            "training started"
        );

        let config = self.config.clone();
        let (t_in, t_out) = (self.t_in, self.t_out);
        let owner = parameter.clone();
        let (model, fit) =
            tokio::task::spawn_blocking(move || fit_model(&owner, &values, &config, t_in, t_out))
                .await
                .map_err(|e| DriftguardError::training(parameter, e))??;

        let artifact = WeightArtifact::new(parameter.clone(), model.to_payload()?);
        let version_id = self.store.write_latest(artifact).await?;
        tracing::info!(
            parameter = %parameter,
            version = %version_id,
            train_mse = fit.train_mse,
            test_mse = fit.test_mse,
            test_mae = fit.test_mae,
            "training finished"
        );
        Ok(TrainingReport {
            version_id,
            test_mse: fit.test_mse,
            test_mae: fit.test_mae,
        })
    }
}

fn fit_model(
    parameter: &Parameter,
    values: &[f64],
    config: &TrainingConfig,
    t_in: usize,
    t_out: usize,
) -> DriftguardResult<(LinearForecaster, Fit)> {
    let normalized = Normalization::fit(values).apply(values);
    let windows = WindowSet::from_series(&normalized, t_in, t_out);
    let (train, test) = windows.split(config.train_split);
    if train.is_empty() || test.is_empty() {
        return Err(DriftguardError::training(
            parameter,
            format!(
                "{} observations yield {} windows, not enough for a train/test split",
                values.len(),
                windows.len()
            ),
        ));
    }

    let mut model = LinearForecaster::zeros(t_in, t_out);
    let mut train_mse = f64::NAN;
    for epoch in 0..config.epochs {
        let residual = model.predict_batch(&train.inputs) - &train.targets;
        train_mse = residual.mapv(|r| r * r).mean().unwrap_or(f64::NAN);
        if !train_mse.is_finite() {
            return Err(DriftguardError::training(
                parameter,
                format!("loss diverged at epoch {epoch}"),
            ));
        }
        // d/dW of mean((XW' + b - Y)^2) over every output element.
        let scale = 2.0 / residual.len() as f64;
        let grad_w = residual.t().dot(&train.inputs) * scale;
        let grad_b = residual.sum_axis(Axis(0)) * scale;
        let (weights, bias) = model.parts_mut();
        weights.scaled_add(-config.learning_rate, &grad_w);
        bias.scaled_add(-config.learning_rate, &grad_b);
    }

    let residual = model.predict_batch(&test.inputs) - &test.targets;
    let test_mse = residual.mapv(|r| r * r).mean().unwrap_or(f64::NAN);
    let test_mae = residual.mapv(f64::abs).mean().unwrap_or(f64::NAN);
    if !test_mse.is_finite() || !test_mae.is_finite() {
        return Err(DriftguardError::training(parameter, "non-finite test loss"));
    }
    Ok((
        model,
        Fit {
            train_mse,
            test_mse,
            test_mae,
        },
    ))
}
