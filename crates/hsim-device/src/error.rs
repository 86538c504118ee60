//! ---
//! hsim_section: "11-simulation"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Typed errors raised by the device simulation engine."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors surfaced by [`crate::SimulatedDevice`].
///
/// The simulation path itself cannot fail; configuration validation is the
/// only fallible operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// A required numeric field was absent, not an integer, or not positive.
    #[error("invalid configuration: '{field}' must be a positive integer")]
    InvalidConfig { field: &'static str },
}
