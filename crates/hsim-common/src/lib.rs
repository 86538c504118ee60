//! ---
//! hsim_section: "01-core-functionality"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Shared primitives and utilities for the HydroBench runtime."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
//! Shared primitives for the HydroBench workspace: settings loading,
//! tracing initialisation, and Prometheus metric handles consumed by the
//! daemon and the HTTP façade.

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{ApiSettings, DeviceDefaults, LoggingSettings, SimSettings, SimulationSettings};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{new_registry, DeviceMetrics, SharedRegistry};
