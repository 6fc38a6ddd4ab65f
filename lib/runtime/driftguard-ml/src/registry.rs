use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use driftguard_domain::{DriftguardError, Parameter, VersionId};
use driftguard_ports::{PortResult, Predictor, WeightStore};

use crate::forecaster::LinearForecaster;

struct CachedModel {
    version: VersionId,
    model: Arc<LinearForecaster>,
}

/// Serves forecasts from the "latest" slot of a weight store.
///
/// Decoded models are cached per parameter and reloaded whenever the stored
/// "latest" version changes, so a re-evaluation right after retraining or a
/// restore always scores the weights currently in the slot.
pub struct ModelRegistry {
    store: Arc<dyn WeightStore>,
    cache: RwLock<HashMap<Parameter, CachedModel>>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn WeightStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn cached_version(&self, parameter: &Parameter) -> Option<VersionId> {
        self.cache
            .read()
            .await
            .get(parameter)
            .map(|cached| cached.version.clone())
    }

    async fn model(&self, parameter: &Parameter) -> PortResult<Arc<LinearForecaster>> {
        let Some(version) = self.store.latest_version(parameter).await? else {
            self.cache.write().await.remove(parameter);
            return Err(DriftguardError::model_unavailable(
                parameter,
                "no weights in the latest slot",
            ));
        };

        if let Some(cached) = self.cache.read().await.get(parameter) {
            if cached.version == version {
                return Ok(Arc::clone(&cached.model));
            }
        }

        let artifact = self.store.read_latest(parameter).await?.ok_or_else(|| {
            DriftguardError::model_unavailable(parameter, "latest slot emptied during load")
        })?;
        let model = Arc::new(LinearForecaster::from_payload(parameter, &artifact.payload)?);
        tracing::info!(
            parameter = %parameter,
            version = %artifact.version_id,
            t_in = model.t_in(),
            t_out = model.t_out(),
            "loaded model"
        );
        self.cache.write().await.insert(
            parameter.clone(),
            CachedModel {
                version: artifact.version_id,
                model: Arc::clone(&model),
            },
        );
        Ok(model)
    }
}

#[async_trait]
impl Predictor for ModelRegistry {
    async fn forecast(
        &self,
        parameter: &Parameter,
        normalized_window: &[f64],
    ) -> PortResult<Vec<f64>> {
        let model = self.model(parameter).await?;
        model.predict(normalized_window).ok_or_else(|| {
            DriftguardError::model_unavailable(
                parameter,
                format!(
                    "model expects a {}-step window, got {}",
                    model.t_in(),
                    normalized_window.len()
                ),
            )
        })
    }
}
