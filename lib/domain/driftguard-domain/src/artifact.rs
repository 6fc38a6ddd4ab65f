use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parameter::Parameter;

/// Timestamp-derived artifact version, e.g. `v20250114_063000`.
///
/// Ordered by timestamp, then by the numeric suffix that disambiguates
/// versions created within the same second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(format!("v{}", at.format("%Y%m%d_%H%M%S")))
    }

    /// Same timestamp, bumped so it does not collide with an existing version.
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}_{:03}", self.0, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(timestamp, suffix number, raw suffix)`; an unsuffixed id has suffix 0.
    fn sort_key(&self) -> (&str, u64, &str) {
        match self.0.match_indices('_').nth(1) {
            Some((at, _)) => {
                let suffix = &self.0[at + 1..];
                (&self.0[..at], suffix.parse().unwrap_or(u64::MAX), suffix)
            }
            None => (self.0.as_str(), 0, ""),
        }
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized model state for one parameter. The payload is opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightArtifact {
    pub parameter: Parameter,
    pub version_id: VersionId,
    pub created_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl WeightArtifact {
    pub fn new(parameter: Parameter, payload: Vec<u8>) -> Self {
        let created_at = Utc::now();
        Self {
            parameter,
            version_id: VersionId::from_timestamp(created_at),
            created_at,
            payload,
        }
    }
}
