use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::RetrainDecision;
use crate::parameter::Parameter;

/// One audit entry handed to a run recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_name: String,
    pub parameter: Parameter,
    /// `None` marks a cycle that faulted before reaching a decision.
    pub decision: Option<RetrainDecision>,
    pub backtest_mae: Option<f64>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(
        parameter: Parameter,
        decision: Option<RetrainDecision>,
        backtest_mae: Option<f64>,
    ) -> Self {
        let recorded_at = Utc::now();
        let run_name = format!(
            "{}_daily_retrain_{}",
            parameter,
            recorded_at.format("%Y%m%d")
        );
        let mut params = BTreeMap::new();
        params.insert("parameter".to_string(), parameter.to_string());
        params.insert(
            "retrain_decision".to_string(),
            decision.map_or("UNKNOWN", |d| d.as_str()).to_string(),
        );
        let mut metrics = BTreeMap::new();
        if let Some(mae) = backtest_mae {
            metrics.insert("backtest_mae".to_string(), mae);
        }
        Self {
            run_name,
            parameter,
            decision,
            backtest_mae,
            params,
            metrics,
            recorded_at,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_metric(mut self, key: &str, value: f64) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }
}
