//! Scripted collaborators for runtime tests.
//!
//! Models are single-byte artifacts: `ScriptedPredictor` forecasts the byte
//! value as a normalized offset, so against a constant history the backtest
//! MAE equals that byte.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use driftguard_domain::{
    AutomationMode, DEFAULT_T_OUT, DriftguardError, EvaluationConfig, Observation, Parameter,
    RetrainConfig, RunRecord, WeightArtifact,
};
use driftguard_ports::{
    DeploymentController, InMemoryWeightStore, PortResult, Predictor, RunRecorder,
    TimeSeriesSource, Trainer, TrainingReport, WeightStore,
};

use crate::evaluator::HealthEvaluator;
use crate::executor::RetrainExecutor;
use crate::orchestrator::{RetrainOrchestrator, RetrainPolicy};

/// Payload byte whose evaluation raises an unanticipated fault.
pub const FAULTY_MODEL: u8 = 254;

pub struct FixedSource {
    values: Option<Vec<f64>>,
    fault_for: Option<Parameter>,
    panic_for: Option<Parameter>,
}

impl FixedSource {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: Some(values),
            fault_for: None,
            panic_for: None,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            values: None,
            fault_for: None,
            panic_for: None,
        }
    }

    pub fn fault_for(mut self, parameter: &str) -> Self {
        self.fault_for = Some(Parameter::new(parameter));
        self
    }

    pub fn panic_for(mut self, parameter: &str) -> Self {
        self.panic_for = Some(Parameter::new(parameter));
        self
    }
}

#[async_trait]
impl TimeSeriesSource for FixedSource {
    async fn fetch(&self, parameter: &Parameter, window_length: usize)
    -> PortResult<Vec<Observation>> {
        if self.panic_for.as_ref() == Some(parameter) {
            panic!("source exploded for {parameter}");
        }
        if self.fault_for.as_ref() == Some(parameter) {
            return Err(DriftguardError::internal("corrupt response"));
        }
        let Some(values) = &self.values else {
            return Err(DriftguardError::SourceUnavailable {
                parameter: parameter.clone(),
                message: "connection refused".to_string(),
            });
        };
        let start = Utc::now() - TimeDelta::days(values.len() as i64);
        let skip = values.len().saturating_sub(window_length);
        Ok(values
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, v)| Observation::new(start + TimeDelta::days(i as i64), *v))
            .collect())
    }
}

pub struct ConstantPredictor {
    value: f64,
    len: usize,
}

impl ConstantPredictor {
    pub fn new(value: f64) -> Self {
        Self::with_len(value, DEFAULT_T_OUT)
    }

    pub fn with_len(value: f64, len: usize) -> Self {
        Self { value, len }
    }
}

#[async_trait]
impl Predictor for ConstantPredictor {
    async fn forecast(&self, _parameter: &Parameter, _normalized_window: &[f64])
    -> PortResult<Vec<f64>> {
        Ok(vec![self.value; self.len])
    }
}

pub struct ScriptedPredictor {
    store: Arc<InMemoryWeightStore>,
}

impl ScriptedPredictor {
    pub fn new(store: Arc<InMemoryWeightStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Predictor for ScriptedPredictor {
    async fn forecast(&self, parameter: &Parameter, _normalized_window: &[f64])
    -> PortResult<Vec<f64>> {
        let artifact = self
            .store
            .read_latest(parameter)
            .await?
            .ok_or_else(|| DriftguardError::model_unavailable(parameter, "no latest weights"))?;
        match artifact.payload.first().copied() {
            Some(FAULTY_MODEL) => Err(DriftguardError::internal("tensor shape mismatch")),
            Some(error) => Ok(vec![f64::from(error); DEFAULT_T_OUT]),
            None => Err(DriftguardError::model_unavailable(parameter, "empty payload")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TrainStep {
    /// Writes a model whose backtest MAE is the given value.
    Model(u8),
    Fail,
    NanLoss,
    /// Never finishes on its own.
    Hang,
}

pub struct ScriptedTrainer {
    store: Arc<InMemoryWeightStore>,
    steps: Mutex<VecDeque<TrainStep>>,
    calls: AtomicUsize,
}

impl ScriptedTrainer {
    pub fn new(store: Arc<InMemoryWeightStore>, steps: Vec<TrainStep>) -> Self {
        Self {
            store,
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Trainer for ScriptedTrainer {
    async fn train(&self, parameter: &Parameter) -> PortResult<TrainingReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TrainStep::Fail);
        match step {
            TrainStep::Model(error) => {
                let version_id = self
                    .store
                    .write_latest(WeightArtifact::new(parameter.clone(), vec![error]))
                    .await?;
                Ok(TrainingReport {
                    version_id,
                    test_mse: 0.1,
                    test_mae: 0.2,
                })
            }
            TrainStep::Fail => Err(DriftguardError::internal("CUDA out of memory")),
            TrainStep::NanLoss => {
                let version_id = self
                    .store
                    .write_latest(WeightArtifact::new(parameter.clone(), vec![0]))
                    .await?;
                Ok(TrainingReport {
                    version_id,
                    test_mse: f64::NAN,
                    test_mae: f64::NAN,
                })
            }
            TrainStep::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(DriftguardError::internal("woke up"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Behaviour {
    #[default]
    Succeed,
    Fail,
    /// Never resolves.
    Hang,
}

#[derive(Default)]
pub struct RecordingDeployer {
    restarts: Mutex<Vec<Parameter>>,
    behaviour: Behaviour,
}

impl RecordingDeployer {
    pub fn failing() -> Self {
        Self {
            restarts: Mutex::new(Vec::new()),
            behaviour: Behaviour::Fail,
        }
    }

    pub fn hanging() -> Self {
        Self {
            restarts: Mutex::new(Vec::new()),
            behaviour: Behaviour::Hang,
        }
    }

    pub fn restarts(&self) -> Vec<Parameter> {
        self.restarts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeploymentController for RecordingDeployer {
    async fn restart(&self, parameter: &Parameter) -> PortResult<()> {
        self.restarts.lock().unwrap().push(parameter.clone());
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(DriftguardError::DeploymentRestartFailed {
                parameter: parameter.clone(),
                message: "deployment not found".to_string(),
            }),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    records: Mutex<Vec<RunRecord>>,
    behaviour: Behaviour,
}

impl RecordingRecorder {
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            behaviour: Behaviour::Fail,
        }
    }

    pub fn hanging() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            behaviour: Behaviour::Hang,
        }
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunRecorder for RecordingRecorder {
    async fn record(&self, record: &RunRecord) -> PortResult<()> {
        self.records.lock().unwrap().push(record.clone());
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(DriftguardError::RecorderUnavailable {
                message: "tracking server down".to_string(),
            }),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

/// Wired orchestrator over a constant history of 10.0.
pub struct Harness {
    pub store: Arc<InMemoryWeightStore>,
    pub trainer: Arc<ScriptedTrainer>,
    pub deployer: Arc<RecordingDeployer>,
    pub orchestrator: Arc<RetrainOrchestrator>,
}

pub struct HarnessBuilder {
    source: FixedSource,
    steps: Vec<TrainStep>,
    automation: AutomationMode,
    retrain: RetrainConfig,
    deployer: RecordingDeployer,
    seeded: Vec<(Parameter, u8)>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            source: FixedSource::new(vec![10.0; 75]),
            steps: Vec::new(),
            automation: AutomationMode::Auto,
            retrain: RetrainConfig::default(),
            deployer: RecordingDeployer::default(),
            seeded: Vec::new(),
        }
    }

    pub fn source(mut self, source: FixedSource) -> Self {
        self.source = source;
        self
    }

    /// Seed the "latest" model for `parameter` with the given backtest MAE.
    pub fn model(mut self, parameter: &str, mae: u8) -> Self {
        self.seeded.push((Parameter::new(parameter), mae));
        self
    }

    pub fn steps(mut self, steps: Vec<TrainStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn manual(mut self) -> Self {
        self.automation = AutomationMode::ManualConfirm;
        self
    }

    pub fn attempt_timeout_secs(mut self, secs: u64) -> Self {
        self.retrain.attempt_timeout_secs = Some(secs);
        self
    }

    pub fn restart_timeout_secs(mut self, secs: u64) -> Self {
        self.retrain.restart_timeout_secs = secs;
        self
    }

    pub fn deployer(mut self, deployer: RecordingDeployer) -> Self {
        self.deployer = deployer;
        self
    }

    pub async fn build(self) -> Harness {
        let store = Arc::new(InMemoryWeightStore::default());
        for (parameter, mae) in self.seeded {
            store
                .seed(WeightArtifact::new(parameter, vec![mae]))
                .await;
        }
        let trainer = Arc::new(ScriptedTrainer::new(store.clone(), self.steps));
        let deployer = Arc::new(self.deployer);
        let evaluator = HealthEvaluator::new(
            Arc::new(self.source),
            Arc::new(ScriptedPredictor::new(store.clone())),
            EvaluationConfig::default(),
        );
        let executor = RetrainExecutor::new(trainer.clone(), evaluator.clone());
        let orchestrator = Arc::new(RetrainOrchestrator::new(
            evaluator,
            executor,
            store.clone(),
            deployer.clone(),
            RetrainPolicy::new(self.automation, &self.retrain),
        ));
        Harness {
            store,
            trainer,
            deployer,
            orchestrator,
        }
    }
}
