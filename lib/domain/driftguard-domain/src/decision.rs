use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parameter::Parameter;

/// What the cycle decided for one parameter. Recorded once, never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrainDecision {
    Skipped,
    RetrainAttempted,
    ManualRequired,
}

impl RetrainDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "SKIPPED",
            Self::RetrainAttempted => "RETRAIN_ATTEMPTED",
            Self::ManualRequired => "MANUAL_REQUIRED",
        }
    }
}

impl fmt::Display for RetrainDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-parameter orchestrator states.
///
/// ```text
/// Evaluating -> Healthy | Unhealthy
/// Unhealthy  -> SkippedNoAutomation | Retraining
/// Retraining -> Succeeded | Exhausted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    Evaluating,
    Healthy,
    Unhealthy,
    SkippedNoAutomation,
    Retraining,
    Succeeded,
    Exhausted,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Healthy | Self::SkippedNoAutomation | Self::Succeeded | Self::Exhausted
        )
    }

    /// Decision for a terminal state; `None` while the machine is still running.
    pub fn decision(&self) -> Option<RetrainDecision> {
        match self {
            Self::Healthy => Some(RetrainDecision::Skipped),
            Self::SkippedNoAutomation => Some(RetrainDecision::ManualRequired),
            Self::Succeeded | Self::Exhausted => Some(RetrainDecision::RetrainAttempted),
            Self::Evaluating | Self::Unhealthy | Self::Retraining => None,
        }
    }

    pub fn can_transition_to(&self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self, next),
            (Evaluating, Healthy)
                | (Evaluating, Unhealthy)
                | (Unhealthy, SkippedNoAutomation)
                | (Unhealthy, Retraining)
                | (Retraining, Succeeded)
                | (Retraining, Exhausted)
        )
    }
}

/// Result of a single training + re-evaluation round inside the retry loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Re-evaluated MAE, absent when training itself failed or timed out.
    pub mae: Option<f64>,
    pub healthy: bool,
    pub error: Option<String>,
}

/// Summary of one parameter's cycle, consumed by the cycle runner and recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainOutcome {
    pub parameter: Parameter,
    /// `None` when the parameter's cycle faulted before reaching a terminal state.
    pub decision: Option<RetrainDecision>,
    pub attempts_used: u32,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl RetrainOutcome {
    pub fn failed(parameter: Parameter, error: impl Into<String>) -> Self {
        Self {
            parameter,
            decision: None,
            attempts_used: 0,
            succeeded: false,
            error: Some(error.into()),
        }
    }

    pub fn is_fault(&self) -> bool {
        self.decision.is_none()
    }
}
