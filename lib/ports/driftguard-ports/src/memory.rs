use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use driftguard_domain::{Parameter, VersionId, WeightArtifact};

use crate::{PortResult, WeightStore};

#[derive(Debug, Clone, Default)]
struct Slots {
    latest: Option<WeightArtifact>,
    previous: Option<WeightArtifact>,
    history: Vec<WeightArtifact>,
    mutations: usize,
}

/// Process-local weight store. Handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryWeightStore {
    slots: Mutex<HashMap<Parameter, Slots>>,
}

impl InMemoryWeightStore {
    /// Seed "latest" without counting it as a mutation.
    pub async fn seed(&self, artifact: WeightArtifact) {
        let mut slots = self.slots.lock().await;
        let entry = slots.entry(artifact.parameter.clone()).or_default();
        entry.history.push(artifact.clone());
        entry.latest = Some(artifact);
    }

    /// Number of slot mutations (writes, snapshots, restores) for `parameter`.
    pub async fn mutation_count(&self, parameter: &Parameter) -> usize {
        self.slots
            .lock()
            .await
            .get(parameter)
            .map_or(0, |slots| slots.mutations)
    }
}

#[async_trait]
impl WeightStore for InMemoryWeightStore {
    async fn write_latest(&self, mut artifact: WeightArtifact) -> PortResult<VersionId> {
        let mut slots = self.slots.lock().await;
        let entry = slots.entry(artifact.parameter.clone()).or_default();
        let base = artifact.version_id.clone();
        let mut n = 0;
        while entry
            .history
            .iter()
            .any(|existing| existing.version_id == artifact.version_id)
        {
            n += 1;
            artifact.version_id = base.with_suffix(n);
        }
        let version = artifact.version_id.clone();
        entry.history.push(artifact.clone());
        entry.latest = Some(artifact);
        entry.mutations += 1;
        Ok(version)
    }

    async fn read_latest(&self, parameter: &Parameter) -> PortResult<Option<WeightArtifact>> {
        Ok(self
            .slots
            .lock()
            .await
            .get(parameter)
            .and_then(|slots| slots.latest.clone()))
    }

    async fn read_previous(&self, parameter: &Parameter) -> PortResult<Option<WeightArtifact>> {
        Ok(self
            .slots
            .lock()
            .await
            .get(parameter)
            .and_then(|slots| slots.previous.clone()))
    }

    async fn snapshot_latest_to_previous(&self, parameter: &Parameter) -> PortResult<bool> {
        let mut slots = self.slots.lock().await;
        let entry = slots.entry(parameter.clone()).or_default();
        entry.previous = entry.latest.clone();
        entry.mutations += 1;
        Ok(entry.previous.is_some())
    }

    async fn restore_previous_to_latest(&self, parameter: &Parameter) -> PortResult<bool> {
        let mut slots = self.slots.lock().await;
        let entry = slots.entry(parameter.clone()).or_default();
        entry.latest = entry.previous.clone();
        entry.mutations += 1;
        Ok(entry.latest.is_some())
    }

    async fn versions(&self, parameter: &Parameter) -> PortResult<Vec<VersionId>> {
        Ok(self
            .slots
            .lock()
            .await
            .get(parameter)
            .map(|slots| {
                slots
                    .history
                    .iter()
                    .map(|artifact| artifact.version_id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(param: &str, version: &str, byte: u8) -> WeightArtifact {
        let mut artifact = WeightArtifact::new(Parameter::new(param), vec![byte]);
        artifact.version_id = VersionId::new(version);
        artifact
    }

    #[tokio::test]
    async fn restore_is_inverse_of_snapshot() {
        let store = InMemoryWeightStore::default();
        let p = Parameter::new("T2M");
        store.seed(artifact("T2M", "v1", 1)).await;

        assert!(store.snapshot_latest_to_previous(&p).await.unwrap());
        store.write_latest(artifact("T2M", "v2", 2)).await.unwrap();
        store.write_latest(artifact("T2M", "v3", 3)).await.unwrap();
        assert!(store.restore_previous_to_latest(&p).await.unwrap());

        let latest = store.read_latest(&p).await.unwrap().unwrap();
        assert_eq!(latest.payload, vec![1]);
        assert_eq!(
            store.versions(&p).await.unwrap(),
            vec![VersionId::new("v1"), VersionId::new("v2"), VersionId::new("v3")]
        );
    }

    #[tokio::test]
    async fn snapshot_of_missing_model_restores_to_missing() {
        let store = InMemoryWeightStore::default();
        let p = Parameter::new("WS2M");

        assert!(!store.snapshot_latest_to_previous(&p).await.unwrap());
        store.write_latest(artifact("WS2M", "v1", 9)).await.unwrap();
        assert!(!store.restore_previous_to_latest(&p).await.unwrap());
        assert!(store.read_latest(&p).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_versions_get_suffixed() {
        let store = InMemoryWeightStore::default();
        let first = store.write_latest(artifact("T2M", "v1", 1)).await.unwrap();
        let second = store.write_latest(artifact("T2M", "v1", 2)).await.unwrap();
        assert_eq!(first, VersionId::new("v1"));
        assert_eq!(second, VersionId::new("v1_001"));
        assert_eq!(store.mutation_count(&Parameter::new("T2M")).await, 2);
    }
}
