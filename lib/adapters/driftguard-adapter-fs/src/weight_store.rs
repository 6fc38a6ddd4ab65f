use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use driftguard_domain::{DriftguardError, Parameter, VersionId, WeightArtifact};
use driftguard_ports::{PortResult, WeightStore};

/// On-disk form of a `WeightArtifact`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredArtifact {
    parameter: Parameter,
    version_id: VersionId,
    created_at: DateTime<Utc>,
    payload: String,
}

impl From<&WeightArtifact> for StoredArtifact {
    fn from(artifact: &WeightArtifact) -> Self {
        Self {
            parameter: artifact.parameter.clone(),
            version_id: artifact.version_id.clone(),
            created_at: artifact.created_at,
            payload: STANDARD.encode(&artifact.payload),
        }
    }
}

/// Weight store rooted at a models directory:
///
/// ```text
/// models/
///   latest_T2M.json
///   previous_T2M.json
///   v20250114_063000_T2M.json
/// ```
///
/// Slot files are replaced by writing a temp file and renaming it over the
/// target, so readers never observe a half-written artifact. Mutations of one
/// parameter are serialized by a per-parameter lock.
pub struct FsWeightStore {
    root: PathBuf,
    locks: Mutex<HashMap<Parameter, Arc<Mutex<()>>>>,
}

impl FsWeightStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn latest_path(&self, parameter: &Parameter) -> PathBuf {
        self.root.join(format!("latest_{parameter}.json"))
    }

    fn previous_path(&self, parameter: &Parameter) -> PathBuf {
        self.root.join(format!("previous_{parameter}.json"))
    }

    fn version_path(&self, parameter: &Parameter, version: &VersionId) -> PathBuf {
        self.root.join(format!("{version}_{parameter}.json"))
    }

    async fn lock(&self, parameter: &Parameter) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(parameter.clone()).or_default())
        };
        slot.lock_owned().await
    }

    async fn read_slot(
        &self,
        parameter: &Parameter,
        path: &Path,
    ) -> PortResult<Option<WeightArtifact>> {
        let Some(bytes) = read_optional(parameter, path).await? else {
            return Ok(None);
        };
        let stored: StoredArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| DriftguardError::storage(parameter, format!("{}: {e}", path.display())))?;
        let payload = STANDARD
            .decode(stored.payload.as_bytes())
            .map_err(|e| DriftguardError::storage(parameter, format!("{}: {e}", path.display())))?;
        Ok(Some(WeightArtifact {
            parameter: stored.parameter,
            version_id: stored.version_id,
            created_at: stored.created_at,
            payload,
        }))
    }

    /// Replace `to` with the bytes of `from`, or remove `to` when `from` is absent.
    async fn copy_slot(&self, parameter: &Parameter, from: &Path, to: &Path) -> PortResult<bool> {
        match read_optional(parameter, from).await? {
            Some(bytes) => {
                write_atomic(parameter, to, &bytes).await?;
                Ok(true)
            }
            None => {
                remove_optional(parameter, to).await?;
                Ok(false)
            }
        }
    }

    fn parse_version(&self, parameter: &Parameter, file_name: &str) -> Option<VersionId> {
        let stem = file_name.strip_suffix(&format!("_{parameter}.json"))?;
        let digits = stem.strip_prefix('v')?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '_') {
            return None;
        }
        Some(VersionId::new(stem))
    }
}

#[async_trait]
impl WeightStore for FsWeightStore {
    async fn write_latest(&self, mut artifact: WeightArtifact) -> PortResult<VersionId> {
        let parameter = artifact.parameter.clone();
        let _guard = self.lock(&parameter).await;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DriftguardError::storage(&parameter, e))?;

        let base = artifact.version_id.clone();
        let mut n = 0;
        while exists(&parameter, &self.version_path(&parameter, &artifact.version_id)).await? {
            n += 1;
            artifact.version_id = base.with_suffix(n);
        }

        let bytes = serde_json::to_vec_pretty(&StoredArtifact::from(&artifact))
            .map_err(|e| DriftguardError::storage(&parameter, e))?;
        write_atomic(
            &parameter,
            &self.version_path(&parameter, &artifact.version_id),
            &bytes,
        )
        .await?;
        write_atomic(&parameter, &self.latest_path(&parameter), &bytes).await?;
        tracing::debug!(parameter = %parameter, version = %artifact.version_id, "wrote latest weights");
        Ok(artifact.version_id)
    }

    async fn read_latest(&self, parameter: &Parameter) -> PortResult<Option<WeightArtifact>> {
        self.read_slot(parameter, &self.latest_path(parameter)).await
    }

    async fn read_previous(&self, parameter: &Parameter) -> PortResult<Option<WeightArtifact>> {
        self.read_slot(parameter, &self.previous_path(parameter)).await
    }

    async fn snapshot_latest_to_previous(&self, parameter: &Parameter) -> PortResult<bool> {
        let _guard = self.lock(parameter).await;
        let copied = self
            .copy_slot(
                parameter,
                &self.latest_path(parameter),
                &self.previous_path(parameter),
            )
            .await?;
        tracing::debug!(parameter = %parameter, copied, "snapshot latest -> previous");
        Ok(copied)
    }

    async fn restore_previous_to_latest(&self, parameter: &Parameter) -> PortResult<bool> {
        let _guard = self.lock(parameter).await;
        let copied = self
            .copy_slot(
                parameter,
                &self.previous_path(parameter),
                &self.latest_path(parameter),
            )
            .await?;
        tracing::debug!(parameter = %parameter, copied, "restore previous -> latest");
        Ok(copied)
    }

    async fn versions(&self, parameter: &Parameter) -> PortResult<Vec<VersionId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DriftguardError::storage(parameter, e)),
        };
        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DriftguardError::storage(parameter, e))?
        {
            if let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(|name| self.parse_version(parameter, name))
            {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }
}

async fn read_optional(parameter: &Parameter, path: &Path) -> PortResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DriftguardError::storage(
            parameter,
            format!("{}: {e}", path.display()),
        )),
    }
}

async fn remove_optional(parameter: &Parameter, path: &Path) -> PortResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DriftguardError::storage(
            parameter,
            format!("{}: {e}", path.display()),
        )),
    }
}

async fn exists(parameter: &Parameter, path: &Path) -> PortResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| DriftguardError::storage(parameter, e))
}

async fn write_atomic(parameter: &Parameter, path: &Path, bytes: &[u8]) -> PortResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DriftguardError::storage(parameter, e))?;
    let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(DriftguardError::storage(parameter, e));
    }
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        DriftguardError::storage(parameter, format!("{}: {e}", path.display()))
    })
}
