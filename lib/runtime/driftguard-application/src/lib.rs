//! Health evaluation and conditional retraining runtime.
//!
//! `CycleRunner` drives `RetrainOrchestrator` once per configured parameter;
//! the orchestrator combines `HealthEvaluator`, `RetrainExecutor`, the weight
//! store and the deployment controller into the per-parameter state machine.

pub mod cycle;
pub mod evaluator;
pub mod executor;
pub mod locks;
pub mod orchestrator;

#[cfg(test)]
mod testkit;

pub use cycle::CycleRunner;
pub use evaluator::HealthEvaluator;
pub use executor::{RetrainAttempt, RetrainExecutor};
pub use locks::ParameterLocks;
pub use orchestrator::{OrchestrationReport, RetrainOrchestrator, RetrainPolicy};
