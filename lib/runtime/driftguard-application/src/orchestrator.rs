//! Per-parameter retraining state machine.

use std::sync::Arc;
use std::time::Duration;

use driftguard_domain::{
    AttemptRecord, AutomationMode, DriftguardError, DriftguardResult, HealthCheckResult,
    OrchestratorState, Parameter, RetrainConfig, RetrainDecision, RetrainOutcome,
};
use driftguard_ports::{DeploymentController, WeightStore};

use crate::evaluator::HealthEvaluator;
use crate::executor::{RetrainAttempt, RetrainExecutor};
use crate::locks::ParameterLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrainPolicy {
    pub automation: AutomationMode,
    pub max_attempts: u32,
    /// Deadline per training + evaluation round; expiry counts as a failed attempt.
    pub attempt_timeout: Option<Duration>,
    /// Deadline per restart request; expiry counts as a failed restart.
    pub restart_timeout: Duration,
}

impl RetrainPolicy {
    pub fn new(automation: AutomationMode, retrain: &RetrainConfig) -> Self {
        Self {
            automation,
            max_attempts: retrain.max_attempts,
            attempt_timeout: retrain.attempt_timeout(),
            restart_timeout: retrain.restart_timeout(),
        }
    }
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self::new(AutomationMode::default(), &RetrainConfig::default())
    }
}

/// Everything one orchestration run did for a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationReport {
    pub parameter: Parameter,
    pub decision: RetrainDecision,
    /// Terminal state reached.
    pub state: OrchestratorState,
    /// States visited, starting with `Evaluating`.
    pub path: Vec<OrchestratorState>,
    pub initial: HealthCheckResult,
    /// Health after the last retraining attempt, if any attempt was scored.
    pub final_health: Option<HealthCheckResult>,
    pub attempts: Vec<AttemptRecord>,
    pub backup_taken: bool,
    pub restarts_requested: u32,
}

impl OrchestrationReport {
    pub fn succeeded(&self) -> bool {
        self.state == OrchestratorState::Succeeded
    }

    pub fn outcome(&self) -> RetrainOutcome {
        RetrainOutcome {
            parameter: self.parameter.clone(),
            decision: Some(self.decision),
            attempts_used: self.attempts.len() as u32,
            succeeded: self.succeeded(),
            error: None,
        }
    }
}

struct StateTrail {
    parameter: Parameter,
    path: Vec<OrchestratorState>,
}

impl StateTrail {
    fn new(parameter: &Parameter) -> Self {
        Self {
            parameter: parameter.clone(),
            path: vec![OrchestratorState::Evaluating],
        }
    }

    fn current(&self) -> OrchestratorState {
        self.path
            .last()
            .copied()
            .unwrap_or(OrchestratorState::Evaluating)
    }

    fn advance(&mut self, next: OrchestratorState) {
        let from = self.current();
        debug_assert!(
            from.can_transition_to(next),
            "illegal transition {from:?} -> {next:?}"
        );
        tracing::debug!(parameter = %self.parameter, ?from, to = ?next, "state transition");
        self.path.push(next);
    }
}

/// Drives evaluate -> decide -> backup -> retry -> deploy-or-revert for one
/// parameter at a time.
pub struct RetrainOrchestrator {
    evaluator: HealthEvaluator,
    executor: RetrainExecutor,
    store: Arc<dyn WeightStore>,
    deployer: Arc<dyn DeploymentController>,
    policy: RetrainPolicy,
    locks: ParameterLocks,
}

impl RetrainOrchestrator {
    pub fn new(
        evaluator: HealthEvaluator,
        executor: RetrainExecutor,
        store: Arc<dyn WeightStore>,
        deployer: Arc<dyn DeploymentController>,
        policy: RetrainPolicy,
    ) -> Self {
        Self {
            evaluator,
            executor,
            store,
            deployer,
            policy,
            locks: ParameterLocks::default(),
        }
    }

    pub fn policy(&self) -> &RetrainPolicy {
        &self.policy
    }

    pub async fn run(&self, parameter: &Parameter) -> DriftguardResult<OrchestrationReport> {
        let _guard = self.locks.acquire(parameter).await;
        let mut trail = StateTrail::new(parameter);

        let initial = self.evaluator.evaluate(parameter).await?;
        if initial.is_healthy {
            trail.advance(OrchestratorState::Healthy);
            tracing::info!(
                parameter = %parameter,
                mae = initial.mean_absolute_error,
                "model healthy, retraining skipped"
            );
            return Ok(self.report(trail, initial, None, Vec::new(), false, 0));
        }

        trail.advance(OrchestratorState::Unhealthy);
        tracing::warn!(
            parameter = %parameter,
            mae = initial.mean_absolute_error,
            "model health check failed"
        );

        if !self.policy.automation.is_authorized() {
            trail.advance(OrchestratorState::SkippedNoAutomation);
            tracing::warn!(
                parameter = %parameter,
                "automated retraining disabled, manual review required"
            );
            return Ok(self.report(trail, initial, None, Vec::new(), false, 0));
        }

        trail.advance(OrchestratorState::Retraining);
        let backup_taken = self.store.snapshot_latest_to_previous(parameter).await?;
        if backup_taken {
            tracing::info!(parameter = %parameter, "backed up latest weights to previous");
        } else {
            tracing::warn!(parameter = %parameter, "no latest weights to back up");
        }

        let mut attempts = Vec::new();
        let mut final_health = None;
        let mut restarts = 0;
        for attempt in 1..=self.policy.max_attempts {
            tracing::info!(
                parameter = %parameter,
                attempt,
                max_attempts = self.policy.max_attempts,
                "retraining attempt"
            );
            match self.attempt(parameter).await {
                Ok(result) => {
                    let mae = result.health.mean_absolute_error;
                    let healthy = result.health.is_healthy;
                    attempts.push(AttemptRecord {
                        attempt,
                        mae: Some(mae),
                        healthy,
                        error: None,
                    });
                    final_health = Some(result.health);
                    if healthy {
                        trail.advance(OrchestratorState::Succeeded);
                        tracing::info!(parameter = %parameter, attempt, mae, "health restored");
                        self.restart(parameter, &mut restarts).await;
                        return Ok(self.report(
                            trail,
                            initial,
                            final_health,
                            attempts,
                            backup_taken,
                            restarts,
                        ));
                    }
                    tracing::warn!(
                        parameter = %parameter,
                        attempt,
                        mae,
                        "retrained model still unhealthy"
                    );
                }
                Err(err @ DriftguardError::TrainingFailed { .. }) => {
                    tracing::warn!(parameter = %parameter, attempt, error = %err, "attempt failed");
                    attempts.push(AttemptRecord {
                        attempt,
                        mae: None,
                        healthy: false,
                        error: Some(err.to_string()),
                    });
                }
                Err(err) => {
                    tracing::error!(
                        parameter = %parameter,
                        attempt,
                        error = %err,
                        "unexpected fault during retraining, reverting"
                    );
                    if let Err(revert_err) = self.revert(parameter, &mut restarts).await {
                        tracing::error!(parameter = %parameter, error = %revert_err, "revert failed");
                    }
                    return Err(err);
                }
            }
        }

        trail.advance(OrchestratorState::Exhausted);
        tracing::error!(
            parameter = %parameter,
            attempts = self.policy.max_attempts,
            "model failed to converge, reverting to previous weights"
        );
        self.revert(parameter, &mut restarts).await?;
        Ok(self.report(
            trail,
            initial,
            final_health,
            attempts,
            backup_taken,
            restarts,
        ))
    }

    async fn attempt(&self, parameter: &Parameter) -> DriftguardResult<RetrainAttempt> {
        match self.policy.attempt_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.executor.execute(parameter))
                .await
                .unwrap_or_else(|_| {
                    Err(DriftguardError::training(
                        parameter,
                        format!("attempt exceeded {}s deadline", deadline.as_secs_f64()),
                    ))
                }),
            None => self.executor.execute(parameter).await,
        }
    }

    /// Restore "previous" into "latest" and have the workload reload it.
    async fn revert(&self, parameter: &Parameter, restarts: &mut u32) -> DriftguardResult<()> {
        let restored = self.store.restore_previous_to_latest(parameter).await?;
        if restored {
            tracing::info!(parameter = %parameter, "restored previous weights");
        } else {
            tracing::warn!(parameter = %parameter, "no previous weights, latest cleared");
        }
        self.restart(parameter, restarts).await;
        Ok(())
    }

    /// Best effort: a failed restart is logged and does not change the outcome.
    /// `restarts` counts requests, whether or not they were accepted.
    async fn restart(&self, parameter: &Parameter, restarts: &mut u32) {
        *restarts += 1;
        let deadline = self.policy.restart_timeout;
        match tokio::time::timeout(deadline, self.deployer.restart(parameter)).await {
            Ok(Ok(())) => tracing::info!(parameter = %parameter, "restart triggered"),
            Ok(Err(err)) => tracing::error!(parameter = %parameter, error = %err, "restart failed"),
            Err(_) => tracing::error!(
                parameter = %parameter,
                timeout_secs = deadline.as_secs_f64(),
                "restart request timed out"
            ),
        }
    }

    fn report(
        &self,
        trail: StateTrail,
        initial: HealthCheckResult,
        final_health: Option<HealthCheckResult>,
        attempts: Vec<AttemptRecord>,
        backup_taken: bool,
        restarts_requested: u32,
    ) -> OrchestrationReport {
        let state = trail.current();
        OrchestrationReport {
            parameter: trail.parameter,
            decision: state.decision().unwrap_or(RetrainDecision::RetrainAttempted),
            state,
            path: trail.path,
            initial,
            final_health,
            attempts,
            backup_taken,
            restarts_requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FAULTY_MODEL, HarnessBuilder, RecordingDeployer, TrainStep};

    fn t2m() -> Parameter {
        Parameter::new("T2M")
    }

    #[tokio::test]
    async fn healthy_model_is_skipped_without_touching_the_store() {
        let h = HarnessBuilder::new().model("T2M", 1).build().await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(report.decision, RetrainDecision::Skipped);
        assert_eq!(report.restarts_requested, 0);
        assert_eq!(
            report.path,
            vec![OrchestratorState::Evaluating, OrchestratorState::Healthy]
        );
        assert_eq!(h.store.mutation_count(&t2m()).await, 0);
        assert_eq!(h.trainer.calls(), 0);
        assert!(h.deployer.restarts().is_empty());
    }

    #[tokio::test]
    async fn unhealthy_model_without_automation_requires_manual_review() {
        let h = HarnessBuilder::new()
            .model("T2M", 7)
            .steps(vec![TrainStep::Model(1)])
            .manual()
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(report.decision, RetrainDecision::ManualRequired);
        assert_eq!(report.state, OrchestratorState::SkippedNoAutomation);
        assert_eq!(report.initial.mean_absolute_error, 7.0);
        assert_eq!(h.trainer.calls(), 0);
        assert!(h.deployer.restarts().is_empty());
        assert_eq!(h.store.mutation_count(&t2m()).await, 0);
        assert!(h.store.read_previous(&t2m()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_healthy_attempt_stops_the_loop_and_restarts_once() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![TrainStep::Model(1), TrainStep::Model(1)])
            .build()
            .await;
        let before = h.store.read_latest(&t2m()).await.unwrap();

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(report.decision, RetrainDecision::RetrainAttempted);
        assert!(report.succeeded());
        assert_eq!(report.outcome().attempts_used, 1);
        assert_eq!(h.trainer.calls(), 1);
        assert_eq!(h.deployer.restarts(), vec![t2m()]);
        assert_eq!(report.restarts_requested, 1);
        assert_eq!(h.store.read_previous(&t2m()).await.unwrap(), before);
        let latest = h.store.read_latest(&t2m()).await.unwrap().unwrap();
        assert_eq!(latest.payload, vec![1]);
    }

    #[tokio::test]
    async fn exhausted_retries_restore_the_pre_cycle_model() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![
                TrainStep::Model(5),
                TrainStep::Model(4),
                TrainStep::Model(3),
                TrainStep::Model(1),
            ])
            .build()
            .await;
        let before = h.store.read_latest(&t2m()).await.unwrap();

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(report.state, OrchestratorState::Exhausted);
        assert_eq!(report.decision, RetrainDecision::RetrainAttempted);
        assert!(!report.outcome().succeeded);
        assert_eq!(report.outcome().attempts_used, 3);
        assert_eq!(h.trainer.calls(), 3);
        assert_eq!(h.store.read_latest(&t2m()).await.unwrap(), before);
        assert_eq!(h.store.read_previous(&t2m()).await.unwrap(), before);
        assert_eq!(h.deployer.restarts(), vec![t2m()]);
        assert_eq!(report.restarts_requested, 1);
        assert_eq!(
            report.final_health.map(|r| r.mean_absolute_error),
            Some(3.0)
        );
        // Every failed artifact stays in the history.
        assert_eq!(h.store.versions(&t2m()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn training_failures_count_as_attempts() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![TrainStep::Fail, TrainStep::NanLoss, TrainStep::Model(0)])
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(report.attempts.len(), 3);
        assert!(report.attempts[0].error.is_some());
        assert!(report.attempts[1].error.is_some());
        assert_eq!(report.attempts[2].mae, Some(0.0));
        assert_eq!(h.deployer.restarts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_deadline_expiry_moves_to_the_next_attempt() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![TrainStep::Hang, TrainStep::Model(1)])
            .attempt_timeout_secs(60)
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(h.trainer.calls(), 2);
        assert!(
            report.attempts[0]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("deadline"))
        );
    }

    #[tokio::test]
    async fn missing_model_is_retrained() {
        let h = HarnessBuilder::new()
            .steps(vec![TrainStep::Model(1)])
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert!(report.initial.is_sentinel());
        assert!(!report.backup_taken);
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn exhaustion_without_prior_model_clears_latest() {
        let h = HarnessBuilder::new()
            .steps(vec![TrainStep::Model(8); 3])
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(report.state, OrchestratorState::Exhausted);
        assert!(h.store.read_latest(&t2m()).await.unwrap().is_none());
        assert_eq!(h.deployer.restarts().len(), 1);
    }

    #[tokio::test]
    async fn unexpected_fault_mid_loop_reverts_before_propagating() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![TrainStep::Model(FAULTY_MODEL), TrainStep::Model(1)])
            .build()
            .await;
        let before = h.store.read_latest(&t2m()).await.unwrap();

        let err = h.orchestrator.run(&t2m()).await.unwrap_err();

        assert!(matches!(err, DriftguardError::Internal { .. }));
        assert_eq!(h.trainer.calls(), 1);
        assert_eq!(h.store.read_latest(&t2m()).await.unwrap(), before);
        assert_eq!(h.deployer.restarts().len(), 1);
    }

    #[tokio::test]
    async fn restart_failure_does_not_change_the_outcome() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![TrainStep::Model(1)])
            .deployer(RecordingDeployer::failing())
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(report.state, OrchestratorState::Succeeded);
        assert_eq!(h.deployer.restarts().len(), 1);
        assert_eq!(report.restarts_requested, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_restart_times_out_without_changing_the_outcome() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![TrainStep::Model(1)])
            .deployer(RecordingDeployer::hanging())
            .restart_timeout_secs(30)
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(report.state, OrchestratorState::Succeeded);
        assert_eq!(report.restarts_requested, 1);
        assert_eq!(h.deployer.restarts(), vec![t2m()]);
    }

    #[tokio::test]
    async fn path_records_every_transition() {
        let h = HarnessBuilder::new()
            .model("T2M", 9)
            .steps(vec![TrainStep::Model(1)])
            .build()
            .await;

        let report = h.orchestrator.run(&t2m()).await.unwrap();

        assert_eq!(
            report.path,
            vec![
                OrchestratorState::Evaluating,
                OrchestratorState::Unhealthy,
                OrchestratorState::Retraining,
                OrchestratorState::Succeeded,
            ]
        );
    }
}
