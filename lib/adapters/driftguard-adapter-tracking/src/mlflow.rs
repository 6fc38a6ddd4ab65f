use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use driftguard_domain::{DriftguardError, RunRecord};
use driftguard_ports::{PortResult, RunRecorder};

#[derive(Debug, Deserialize)]
struct ExperimentEnvelope {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct Experiment {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedExperiment {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    run: Run,
}

#[derive(Debug, Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
}

/// Logs each record as a finished MLflow run through the tracking REST API.
///
/// The experiment is looked up (or created) once and reused afterwards. Every
/// request is bounded by `timeout`, so a silent server surfaces as
/// `RecorderUnavailable` instead of stalling the cycle.
pub struct MlflowRunRecorder {
    client: reqwest::Client,
    base_url: String,
    experiment: String,
    experiment_id: OnceCell<String>,
}

impl MlflowRunRecorder {
    pub fn new(
        tracking_uri: &str,
        experiment: impl Into<String>,
        timeout: Duration,
    ) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            client,
            base_url: format!("{}/api/2.0/mlflow", tracking_uri.trim_end_matches('/')),
            experiment: experiment.into(),
            experiment_id: OnceCell::new(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn experiment_id(&self) -> PortResult<&str> {
        self.experiment_id
            .get_or_try_init(|| self.resolve_experiment())
            .await
            .map(String::as_str)
    }

    async fn resolve_experiment(&self) -> PortResult<String> {
        let response = self
            .client
            .get(self.url("experiments/get-by-name"))
            .query(&[("experiment_name", self.experiment.as_str())])
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            let found: ExperimentEnvelope = checked(response)
                .await?
                .json()
                .await
                .map_err(unavailable)?;
            return Ok(found.experiment.experiment_id);
        }

        tracing::info!(experiment = %self.experiment, "creating mlflow experiment");
        let created: CreatedExperiment = self
            .post("experiments/create", &json!({ "name": self.experiment }))
            .await?
            .json()
            .await
            .map_err(unavailable)?;
        Ok(created.experiment_id)
    }

    async fn post(&self, endpoint: &str, body: &Value) -> PortResult<reqwest::Response> {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(unavailable)?;
        checked(response).await
    }
}

#[async_trait]
impl RunRecorder for MlflowRunRecorder {
    async fn record(&self, record: &RunRecord) -> PortResult<()> {
        let experiment_id = self.experiment_id().await?;
        let started: RunEnvelope = self
            .post("runs/create", &create_run_body(experiment_id, record))
            .await?
            .json()
            .await
            .map_err(unavailable)?;
        let run_id = started.run.info.run_id;

        self.post("runs/log-batch", &log_batch_body(&run_id, record))
            .await?;
        self.post(
            "runs/update",
            &json!({
                "run_id": run_id,
                "status": "FINISHED",
                "end_time": chrono::Utc::now().timestamp_millis(),
            }),
        )
        .await?;
        tracing::debug!(run = %record.run_name, run_id = %run_id, "run logged to mlflow");
        Ok(())
    }
}

fn create_run_body(experiment_id: &str, record: &RunRecord) -> Value {
    json!({
        "experiment_id": experiment_id,
        "run_name": record.run_name,
        "start_time": record.recorded_at.timestamp_millis(),
        "tags": [{ "key": "mlflow.runName", "value": record.run_name }],
    })
}

fn log_batch_body(run_id: &str, record: &RunRecord) -> Value {
    let timestamp = record.recorded_at.timestamp_millis();
    // MLflow rejects NaN and infinities in JSON bodies.
    let metrics: Vec<Value> = record
        .metrics
        .iter()
        .filter(|(_, value)| value.is_finite())
        .map(|(key, value)| json!({ "key": key, "value": value, "timestamp": timestamp, "step": 0 }))
        .collect();
    let params: Vec<Value> = record
        .params
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    json!({ "run_id": run_id, "metrics": metrics, "params": params })
}

async fn checked(response: reqwest::Response) -> PortResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DriftguardError::RecorderUnavailable {
        message: format!("mlflow responded {status}: {body}"),
    })
}

fn unavailable(e: reqwest::Error) -> DriftguardError {
    DriftguardError::RecorderUnavailable {
        message: format!("mlflow request failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftguard_domain::{Parameter, RetrainDecision};
    use tokio::net::TcpListener;

    fn recorder(uri: &str) -> MlflowRunRecorder {
        MlflowRunRecorder::new(uri, "drift", Duration::from_millis(300)).unwrap()
    }

    fn record() -> RunRecord {
        RunRecord::new(
            Parameter::new("WS2M"),
            Some(RetrainDecision::RetrainAttempted),
            Some(3.5),
        )
        .with_param("retrain_success", false)
        .with_metric("final_mae", f64::NAN)
    }

    #[test]
    fn log_batch_carries_params_and_finite_metrics() {
        let body = log_batch_body("abc123", &record());
        assert_eq!(body["run_id"], "abc123");

        let metrics = body["metrics"].as_array().unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0]["key"], "backtest_mae");
        assert_eq!(metrics[0]["value"], 3.5);

        let params = body["params"].as_array().unwrap();
        assert!(params.contains(&json!({ "key": "retrain_decision", "value": "RETRAIN_ATTEMPTED" })));
        assert!(params.contains(&json!({ "key": "retrain_success", "value": "false" })));
    }

    #[test]
    fn create_run_names_the_run() {
        let record = record();
        let body = create_run_body("7", &record);
        assert_eq!(body["experiment_id"], "7");
        assert_eq!(body["run_name"], json!(record.run_name));
        assert!(
            body["run_name"]
                .as_str()
                .unwrap()
                .starts_with("WS2M_daily_retrain_")
        );
    }

    #[test]
    fn base_url_tolerates_trailing_slash() {
        let recorder = recorder("http://mlflow:5005/");
        assert_eq!(
            recorder.url("runs/create"),
            "http://mlflow:5005/api/2.0/mlflow/runs/create"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_recorder_unavailable() {
        let err = recorder("http://127.0.0.1:9")
            .record(&record())
            .await
            .unwrap_err();
        assert!(matches!(err, DriftguardError::RecorderUnavailable { .. }));
    }

    #[tokio::test]
    async fn silent_server_times_out_as_recorder_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let recorder = recorder(&format!("http://{addr}"));
        let result = tokio::time::timeout(Duration::from_secs(10), recorder.record(&record()))
            .await
            .expect("record must give up on its own");
        let err = result.unwrap_err();
        assert!(matches!(err, DriftguardError::RecorderUnavailable { .. }));
        server.abort();
    }
}
