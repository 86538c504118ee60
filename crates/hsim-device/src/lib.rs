//! ---
//! hsim_section: "11-simulation"
//! hsim_subsection: "01-bootstrap"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Device simulation module exports and shared types."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
//! Simulation engine for a single hydroponic watering device.
//!
//! The engine is deliberately free of any I/O. Callers drive it through
//! [`SimulatedDevice::poll`] and read it through the snapshot accessors; the
//! HTTP façade and the polling loop live in sibling crates.

pub mod device;
pub mod error;
pub mod history;

pub use device::{ConfigUpdate, DeviceConfig, DeviceStatus, SimulatedDevice};
pub use error::DeviceError;
pub use history::{HistoryEntry, SampleHistory, HISTORY_CAPACITY};
