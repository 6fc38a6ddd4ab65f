use std::sync::Arc;

use driftguard_domain::{
    DriftguardError, DriftguardResult, EvaluationConfig, HealthCheckResult, Normalization,
    Parameter, mean_absolute_error,
};
use driftguard_ports::{Predictor, TimeSeriesSource};

/// Backtests the current model: forecast the last `t_out` observations from
/// the `t_in` before them and compare.
#[derive(Clone)]
pub struct HealthEvaluator {
    source: Arc<dyn TimeSeriesSource>,
    predictor: Arc<dyn Predictor>,
    config: EvaluationConfig,
}

impl HealthEvaluator {
    pub fn new(
        source: Arc<dyn TimeSeriesSource>,
        predictor: Arc<dyn Predictor>,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            source,
            predictor,
            config,
        }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate `parameter`, failing closed.
    ///
    /// Missing data or a missing model yields an unhealthy sentinel result
    /// instead of an error; only unanticipated faults are returned as `Err`.
    pub async fn evaluate(&self, parameter: &Parameter) -> DriftguardResult<HealthCheckResult> {
        match self.backtest_mae(parameter).await {
            Ok(mae) => {
                let result =
                    HealthCheckResult::classify(parameter.clone(), mae, self.config.mae_threshold);
                tracing::info!(
                    parameter = %parameter,
                    mae,
                    threshold = self.config.mae_threshold,
                    healthy = result.is_healthy,
                    "health check"
                );
                Ok(result)
            }
            Err(err) if err.is_expected() => {
                tracing::warn!(
                    parameter = %parameter,
                    error = %err,
                    "backtest impossible, assuming unhealthy"
                );
                Ok(HealthCheckResult::unavailable(parameter.clone()))
            }
            Err(err) => Err(err),
        }
    }

    /// Raw backtest MAE without the fail-closed conversion.
    pub async fn backtest_mae(&self, parameter: &Parameter) -> DriftguardResult<f64> {
        let t_in = self.config.t_in;
        let t_out = self.config.t_out;
        let needed = self.config.window_len();

        let observations = self
            .source
            .fetch(parameter, needed + self.config.fetch_margin)
            .await?;
        if observations.len() < needed {
            return Err(DriftguardError::DataUnavailable {
                parameter: parameter.clone(),
                needed,
                available: observations.len(),
            });
        }

        let values: Vec<f64> = observations[observations.len() - needed..]
            .iter()
            .map(|obs| obs.value)
            .collect();
        let (input, actual) = values.split_at(t_in);

        let norm = Normalization::fit(input);
        let forecast = self
            .predictor
            .forecast(parameter, &norm.apply(input))
            .await?;
        if forecast.len() != t_out {
            return Err(DriftguardError::internal(format!(
                "[{parameter}] predictor returned {} values, expected {t_out}",
                forecast.len()
            )));
        }

        Ok(mean_absolute_error(&norm.invert(&forecast), actual))
    }
}
