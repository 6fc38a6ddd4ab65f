//! Baseline forecasting model for driftguard.
//!
//! A direct multi-horizon linear model over the normalized look-back window,
//! plus the registry that serves it as a `Predictor` and the trainer that
//! fits it as a `Trainer`.

pub mod forecaster;
pub mod registry;
pub mod trainer;
pub mod window;

pub use forecaster::LinearForecaster;
pub use registry::ModelRegistry;
pub use trainer::LinearTrainer;
pub use window::WindowSet;
