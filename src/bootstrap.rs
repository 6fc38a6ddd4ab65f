use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use driftguard_adapter_deploy::KubectlDeploymentController;
use driftguard_adapter_fs::{CsvSeriesSource, FsWeightStore};
use driftguard_adapter_tracking::{JsonlRunRecorder, TracingRunRecorder};
use driftguard_application::{
    CycleRunner, HealthEvaluator, RetrainExecutor, RetrainOrchestrator, RetrainPolicy,
};
use driftguard_domain::{
    AutomationMode, DeploymentKind, DriftguardConfig, Parameter, RetrainOutcome, TrackingKind,
};
use driftguard_ml::{LinearTrainer, ModelRegistry};
use driftguard_ports::{
    DeploymentController, NullDeploymentController, PortSet, Predictor, RunRecorder,
    TimeSeriesSource, Trainer, WeightStore,
};

pub const CONFIG_PATH_ENV: &str = "DRIFTGUARD_CONFIG_PATH";
pub const ENABLE_RETRAINING_ENV: &str = "ENABLE_RETRAINING";

/// `$DRIFTGUARD_CONFIG_PATH`, then `~/.driftguard/config.yaml`, then
/// `driftguard-config.yaml` in the working directory.
pub fn config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(home) = env::var("HOME") {
        return Path::new(&home).join(".driftguard").join("config.yaml");
    }

    PathBuf::from("driftguard-config.yaml")
}

/// Load and validate the configuration. An explicitly named file must exist;
/// the fallback location may be absent, in which case defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<DriftguardConfig> {
    let config = match explicit {
        Some(path) => DriftguardConfig::load_from_path(path)?,
        None => DriftguardConfig::load_or_default(&config_path())?,
    };
    config.validate()?;
    Ok(config)
}

/// Reads an `ENABLE_RETRAINING` value. `true`, `1`, `yes` and `on` enable it
/// in any letter case; every other value, unknown ones included, leaves it off.
pub fn retraining_enabled(raw: &str) -> bool {
    let raw = raw.trim();
    ["true", "1", "yes", "on"]
        .iter()
        .any(|accepted| raw.eq_ignore_ascii_case(accepted))
}

/// `ENABLE_RETRAINING=true` (or the CLI flag) authorizes automatic retraining
/// regardless of the configured mode. Anything else leaves the config alone.
pub fn apply_retraining_override(config: &mut DriftguardConfig, enabled: bool) {
    if enabled {
        config.automation_mode = AutomationMode::Auto;
    }
}

pub fn build_ports(config: &DriftguardConfig) -> Result<PortSet> {
    let store: Arc<dyn WeightStore> = Arc::new(FsWeightStore::new(&config.storage.models_dir));
    let source: Arc<dyn TimeSeriesSource> = Arc::new(CsvSeriesSource::new(
        &config.source.data_dir,
        config.parameters.iter().cloned(),
        config.source.missing_sentinel,
    ));
    let predictor: Arc<dyn Predictor> = Arc::new(ModelRegistry::new(Arc::clone(&store)));
    let trainer: Arc<dyn Trainer> = Arc::new(LinearTrainer::new(
        Arc::clone(&source),
        Arc::clone(&store),
        config.training.clone(),
        config.evaluation.t_in,
        config.evaluation.t_out,
    ));

    let deployer: Arc<dyn DeploymentController> = match config.deployment.kind {
        DeploymentKind::Kubectl => Arc::new(KubectlDeploymentController::new(&config.deployment)),
        DeploymentKind::Noop => Arc::new(NullDeploymentController),
    };

    Ok(PortSet {
        source,
        predictor,
        trainer,
        store,
        deployer,
        recorder: build_recorder(config)?,
    })
}

fn build_recorder(config: &DriftguardConfig) -> Result<Arc<dyn RunRecorder>> {
    let tracking = &config.tracking;
    let recorder: Arc<dyn RunRecorder> = match tracking.kind {
        TrackingKind::Jsonl => Arc::new(JsonlRunRecorder::new(&tracking.runs_path)),
        TrackingKind::Log => Arc::new(TracingRunRecorder),
        #[cfg(feature = "mlflow")]
        TrackingKind::Mlflow => Arc::new(driftguard_adapter_tracking::MlflowRunRecorder::new(
            &tracking.mlflow_uri,
            tracking.experiment.clone(),
            std::time::Duration::from_secs(tracking.timeout_secs),
        )?),
        #[cfg(not(feature = "mlflow"))]
        TrackingKind::Mlflow => {
            anyhow::bail!("tracking.kind = mlflow requires the `mlflow` feature")
        }
    };
    Ok(recorder)
}

pub fn build_runner(config: &DriftguardConfig, ports: &PortSet) -> CycleRunner {
    let evaluator = HealthEvaluator::new(
        Arc::clone(&ports.source),
        Arc::clone(&ports.predictor),
        config.evaluation.clone(),
    );
    let executor = RetrainExecutor::new(Arc::clone(&ports.trainer), evaluator.clone());
    let orchestrator = RetrainOrchestrator::new(
        evaluator,
        executor,
        Arc::clone(&ports.store),
        Arc::clone(&ports.deployer),
        RetrainPolicy::new(config.automation_mode, &config.retrain),
    );
    CycleRunner::new(Arc::new(orchestrator), Arc::clone(&ports.recorder))
        .with_record_timeout(config.cycle.record_timeout())
}

/// Parameters to process: the requested subset, or every configured one.
pub fn select_parameters(config: &DriftguardConfig, requested: &[String]) -> Vec<Parameter> {
    if requested.is_empty() {
        return config.parameter_names();
    }
    requested
        .iter()
        .map(|name| {
            let parameter = Parameter::new(name.as_str());
            if config.spec_for(&parameter).is_none() {
                tracing::warn!(
                    parameter = %parameter,
                    "parameter is not configured, no clipping bounds apply"
                );
            }
            parameter
        })
        .collect()
}

/// Run one cycle, sequentially unless the config allows parallelism.
pub async fn run_cycle(
    config: &DriftguardConfig,
    runner: &CycleRunner,
    parameters: &[Parameter],
) -> Vec<RetrainOutcome> {
    if config.cycle.max_parallel > 1 {
        runner
            .run_concurrent(parameters, config.cycle.max_parallel)
            .await
    } else {
        runner.run(parameters).await
    }
}
