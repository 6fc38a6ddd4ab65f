use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one monitored quantity. One model is kept per parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameter(String);

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used for file and deployment names.
    pub fn slug(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Configured parameter with the physical range its cleaned values are clipped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: Parameter,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ParameterSpec {
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: Parameter::new(name),
            min: None,
            max: None,
        }
    }

    pub fn clip(&self, value: f64) -> f64 {
        let value = match self.min {
            Some(min) if value < min => min,
            _ => value,
        };
        match self.max {
            Some(max) if value > max => max,
            _ => value,
        }
    }
}
