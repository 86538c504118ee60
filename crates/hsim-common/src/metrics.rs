//! ---
//! hsim_section: "03-persistence-logging"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Prometheus metric handles for simulator processes."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use prometheus::{Gauge, IntCounter, IntGauge, Opts, Registry};

/// Shared registry type used across the daemon and the HTTP façade.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Counters and gauges describing one simulated device.
#[derive(Debug, Clone)]
pub struct DeviceMetrics {
    pub polls_total: IntCounter,
    pub watering_transitions_total: IntCounter,
    pub config_updates_total: IntCounter,
    pub temperature_c: Gauge,
    pub water_level: Gauge,
    pub history_entries: IntGauge,
    pub buffered_samples: IntGauge,
    pub last_reading_timestamp_seconds: IntGauge,
}

impl DeviceMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let polls_total = IntCounter::with_opts(Opts::new(
            "hsim_polls_total",
            "Simulation time steps executed.",
        ))?;
        let watering_transitions_total = IntCounter::with_opts(Opts::new(
            "hsim_watering_transitions_total",
            "Watering cycle state changes.",
        ))?;
        let config_updates_total = IntCounter::with_opts(Opts::new(
            "hsim_config_updates_total",
            "Accepted configuration updates.",
        ))?;
        let temperature_c = Gauge::with_opts(Opts::new(
            "hsim_temperature_celsius",
            "Current simulated temperature.",
        ))?;
        let water_level = Gauge::with_opts(Opts::new(
            "hsim_water_level",
            "Current simulated water level.",
        ))?;
        let history_entries = IntGauge::with_opts(Opts::new(
            "hsim_history_entries",
            "Aggregated entries held in the history ring.",
        ))?;
        let buffered_samples = IntGauge::with_opts(Opts::new(
            "hsim_buffered_samples",
            "Sensor samples awaiting the next watering aggregate.",
        ))?;
        let last_reading_timestamp_seconds = IntGauge::with_opts(Opts::new(
            "hsim_last_reading_timestamp_seconds",
            "Unix time of the most recent sensor sampling.",
        ))?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(watering_transitions_total.clone()))?;
        registry.register(Box::new(config_updates_total.clone()))?;
        registry.register(Box::new(temperature_c.clone()))?;
        registry.register(Box::new(water_level.clone()))?;
        registry.register(Box::new(history_entries.clone()))?;
        registry.register(Box::new(buffered_samples.clone()))?;
        registry.register(Box::new(last_reading_timestamp_seconds.clone()))?;

        Ok(Self {
            polls_total,
            watering_transitions_total,
            config_updates_total,
            temperature_c,
            water_level,
            history_entries,
            buffered_samples,
            last_reading_timestamp_seconds,
        })
    }
}
