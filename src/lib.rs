//! driftguard: scheduled health checks and guarded retraining for per-parameter
//! forecasting models.
//!
//! The workspace crates hold the domain, ports, runtime and adapters; this
//! crate wires them together from a `DriftguardConfig`.

pub mod bootstrap;
pub mod summary;

pub use driftguard_application as application;
pub use driftguard_domain as domain;
pub use driftguard_ports as ports;
