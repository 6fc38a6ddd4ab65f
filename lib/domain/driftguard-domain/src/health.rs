use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parameter::Parameter;

/// Look-back window length fed to the predictor.
pub const DEFAULT_T_IN: usize = 60;
/// Forecast horizon length produced by the predictor.
pub const DEFAULT_T_OUT: usize = 10;
/// Backtest MAE at or above which a model counts as drifted.
pub const DEFAULT_MAE_THRESHOLD: f64 = 2.0;
/// MAE reported when no backtest could be computed. Always unhealthy.
pub const SENTINEL_MAE: f64 = 9999.0;
/// Retraining attempts per parameter per cycle.
pub const MAX_ATTEMPTS: u32 = 3;

/// Outcome of one backtest evaluation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub parameter: Parameter,
    pub mean_absolute_error: f64,
    pub is_healthy: bool,
    /// Set only by `unavailable`: no backtest was computed.
    #[serde(default)]
    pub backtest_missing: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Healthy iff `mae` is strictly below `threshold`. NaN is never healthy.
    pub fn classify(parameter: Parameter, mae: f64, threshold: f64) -> Self {
        Self {
            parameter,
            mean_absolute_error: mae,
            is_healthy: mae < threshold,
            backtest_missing: false,
            evaluated_at: Utc::now(),
        }
    }

    /// Fail-closed result used when the backtest cannot be computed.
    pub fn unavailable(parameter: Parameter) -> Self {
        Self {
            parameter,
            mean_absolute_error: SENTINEL_MAE,
            is_healthy: false,
            backtest_missing: true,
            evaluated_at: Utc::now(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.backtest_missing
    }
}
