use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use driftguard_domain::{DriftguardError, RunRecord};
use driftguard_ports::{PortResult, RunRecorder};

#[derive(Serialize)]
struct Entry<'a> {
    run_id: String,
    #[serde(flatten)]
    record: &'a RunRecord,
}

/// Appends one JSON object per run to a local file.
pub struct JsonlRunRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRunRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn unavailable(&self, e: impl std::fmt::Display) -> DriftguardError {
        DriftguardError::RecorderUnavailable {
            message: format!("{}: {e}", self.path.display()),
        }
    }
}

#[async_trait]
impl RunRecorder for JsonlRunRecorder {
    async fn record(&self, record: &RunRecord) -> PortResult<()> {
        let entry = Entry {
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            record,
        };
        let mut line = serde_json::to_vec(&entry).map_err(|e| self.unavailable(e))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.unavailable(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        file.write_all(&line).await.map_err(|e| self.unavailable(e))?;
        file.flush().await.map_err(|e| self.unavailable(e))?;
        tracing::debug!(run = %record.run_name, run_id = %entry.run_id, "run appended");
        Ok(())
    }
}
