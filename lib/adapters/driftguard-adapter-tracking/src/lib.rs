//! Run recorders: where each cycle's audit entry ends up.

mod jsonl;
#[cfg(feature = "mlflow")]
mod mlflow;

pub use jsonl::JsonlRunRecorder;
#[cfg(feature = "mlflow")]
pub use mlflow::MlflowRunRecorder;

use async_trait::async_trait;

use driftguard_domain::RunRecord;
use driftguard_ports::{PortResult, RunRecorder};

/// Emits every record as a structured log event and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRunRecorder;

#[async_trait]
impl RunRecorder for TracingRunRecorder {
    async fn record(&self, record: &RunRecord) -> PortResult<()> {
        tracing::info!(
            run = %record.run_name,
            parameter = %record.parameter,
            decision = record.decision.map_or("UNKNOWN", |d| d.as_str()),
            backtest_mae = ?record.backtest_mae,
            params = ?record.params,
            metrics = ?record.metrics,
            "run recorded"
        );
        Ok(())
    }
}
