//! One pass of the orchestrator over every configured parameter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinError;

use driftguard_domain::{DriftguardError, Parameter, RetrainDecision, RetrainOutcome, RunRecord};
use driftguard_ports::RunRecorder;

use crate::orchestrator::{OrchestrationReport, RetrainOrchestrator};

const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs the orchestrator per parameter, isolating failures and recording
/// every decision.
#[derive(Clone)]
pub struct CycleRunner {
    orchestrator: Arc<RetrainOrchestrator>,
    recorder: Arc<dyn RunRecorder>,
    record_timeout: Duration,
}

impl CycleRunner {
    pub fn new(orchestrator: Arc<RetrainOrchestrator>, recorder: Arc<dyn RunRecorder>) -> Self {
        Self {
            orchestrator,
            recorder,
            record_timeout: DEFAULT_RECORD_TIMEOUT,
        }
    }

    /// A record that takes longer than `timeout` is abandoned as if the
    /// recorder were down.
    pub fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    /// Process `parameters` one after another, in order.
    pub async fn run(&self, parameters: &[Parameter]) -> Vec<RetrainOutcome> {
        tracing::info!(parameters = parameters.len(), "retraining cycle started");
        let mut outcomes = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let runner = self.clone();
            let owned = parameter.clone();
            let joined = tokio::spawn(async move { runner.process(&owned).await }).await;
            outcomes.push(self.settle(parameter, joined).await);
        }
        tracing::info!("retraining cycle finished");
        outcomes
    }

    /// Process up to `max_parallel` parameters at once. Outcomes keep the
    /// order of `parameters`; repeated parameters still run one at a time.
    pub async fn run_concurrent(
        &self,
        parameters: &[Parameter],
        max_parallel: usize,
    ) -> Vec<RetrainOutcome> {
        tracing::info!(
            parameters = parameters.len(),
            max_parallel,
            "concurrent retraining cycle started"
        );
        let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
        let handles: Vec<_> = parameters
            .iter()
            .map(|parameter| {
                let runner = self.clone();
                let permits = permits.clone();
                let parameter = parameter.clone();
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    runner.process(&parameter).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(parameters.len());
        for (parameter, handle) in parameters.iter().zip(handles) {
            outcomes.push(self.settle(parameter, handle.await).await);
        }
        tracing::info!("concurrent retraining cycle finished");
        outcomes
    }

    async fn process(&self, parameter: &Parameter) -> RetrainOutcome {
        match self.orchestrator.run(parameter).await {
            Ok(report) => {
                self.record(report_record(&report)).await;
                let outcome = report.outcome();
                log_outcome(&outcome);
                outcome
            }
            Err(err) => {
                tracing::error!(
                    parameter = %parameter,
                    error = %err,
                    expected = err.is_expected(),
                    "cycle failed for parameter"
                );
                let record = RunRecord::new(parameter.clone(), None, None).with_param("error", &err);
                self.record(record).await;
                RetrainOutcome::failed(parameter.clone(), err.to_string())
            }
        }
    }

    /// Turn a panicked task into a failed outcome.
    async fn settle(
        &self,
        parameter: &Parameter,
        joined: Result<RetrainOutcome, JoinError>,
    ) -> RetrainOutcome {
        match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(parameter = %parameter, error = %err, "parameter task aborted");
                let record = RunRecord::new(parameter.clone(), None, None).with_param("error", &err);
                self.record(record).await;
                RetrainOutcome::failed(parameter.clone(), format!("task aborted: {err}"))
            }
        }
    }

    async fn record(&self, record: RunRecord) {
        let result = tokio::time::timeout(self.record_timeout, self.recorder.record(&record))
            .await
            .unwrap_or_else(|_| {
                Err(DriftguardError::RecorderUnavailable {
                    message: format!(
                        "no response within {}s",
                        self.record_timeout.as_secs_f64()
                    ),
                })
            });
        if let Err(err) = result {
            tracing::warn!(
                parameter = %record.parameter,
                error = %err,
                "run recorder unavailable, decision not persisted"
            );
        }
    }
}

fn report_record(report: &OrchestrationReport) -> RunRecord {
    let mut record = RunRecord::new(
        report.parameter.clone(),
        Some(report.decision),
        Some(report.initial.mean_absolute_error),
    );
    if report.decision == RetrainDecision::RetrainAttempted {
        record = record
            .with_param("retrain_success", report.succeeded())
            .with_param("attempts_used", report.attempts.len())
            .with_param("backup_taken", report.backup_taken);
        if let Some(health) = &report.final_health {
            record = record.with_metric("final_mae", health.mean_absolute_error);
        }
    }
    record
}

fn log_outcome(outcome: &RetrainOutcome) {
    match outcome.decision {
        Some(RetrainDecision::RetrainAttempted) if outcome.succeeded => {
            tracing::info!(
                parameter = %outcome.parameter,
                attempts = outcome.attempts_used,
                "retrain completed successfully"
            )
        }
        Some(RetrainDecision::RetrainAttempted) => {
            tracing::error!(
                parameter = %outcome.parameter,
                attempts = outcome.attempts_used,
                "retrain failed after max attempts"
            )
        }
        Some(RetrainDecision::ManualRequired) => {
            tracing::warn!(
                parameter = %outcome.parameter,
                "drift detected, enable automated retraining or retrain manually"
            )
        }
        Some(RetrainDecision::Skipped) | None => {}
    }
}
