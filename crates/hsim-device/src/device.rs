//! ---
//! hsim_section: "11-simulation"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "State machine modelling one simulated watering device."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::DeviceError;
use crate::history::{HistoryEntry, SampleHistory};

const DEFAULT_WATERING_INTERVAL_SECS: u64 = 60;
const DEFAULT_WATERING_DURATION_SECS: u64 = 30;

const INITIAL_TEMPERATURE_C: f64 = 20.0;
const INITIAL_WATER_LEVEL: f64 = 50.0;

const TEMPERATURE_MIN_C: f64 = 18.0;
const TEMPERATURE_MAX_C: f64 = 22.0;
const TEMPERATURE_NOISE_C: f64 = 0.1;

const WATER_DECAY_PER_TICK: f64 = 0.05;
const WATER_NOISE: f64 = 0.01;

const HISTORY_DUMP_INTERVAL_SECS: i64 = 60;

/// Sampling cadence while a watering cycle is active.
const ACTIVE_POLL_DELAY: Duration = Duration::from_millis(100);
/// Sampling cadence while the device sits idle.
const IDLE_POLL_DELAY: Duration = Duration::from_secs(60);

/// Effective device configuration.
///
/// Serialized field names are the wire contract consumed by dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Seconds between the end of one watering cycle and the start of the next.
    pub watering_interval: u64,
    /// Seconds a watering cycle stays active.
    pub watering_duration: u64,
    /// Operator-facing device name.
    pub name: String,
}

/// Partial configuration update as received from the network.
///
/// The numeric fields arrive as raw JSON values so that non-integers can be
/// detected and rejected instead of being silently coerced.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub watering_interval: Option<Value>,
    pub watering_duration: Option<Value>,
    pub name: Option<String>,
}

/// Instantaneous read model of the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceStatus {
    pub temperature_c: f64,
    pub water_level: f64,
    pub watering: bool,
    /// When the watering flag last changed state.
    pub last_transition: DateTime<Utc>,
}

/// A single simulated hydroponic watering device.
///
/// All state is process-local and owned by this struct; callers are expected
/// to wrap it in a mutex and drive [`SimulatedDevice::poll`] from a single
/// scheduler so that each time step is observed atomically.
#[derive(Debug)]
pub struct SimulatedDevice {
    config: DeviceConfig,
    default_config: DeviceConfig,
    temperature_c: f64,
    water_level: f64,
    watering: bool,
    last_transition: DateTime<Utc>,
    last_reading: DateTime<Utc>,
    last_history_dump: DateTime<Utc>,
    temperature_samples: Vec<f64>,
    water_level_samples: Vec<f64>,
    history: SampleHistory,
    rng: StdRng,
}

impl SimulatedDevice {
    /// Create a device with generated defaults and entropy-seeded noise.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_rng(StdRng::from_entropy(), now)
    }

    /// Create a device with a fixed noise seed for reproducible runs.
    pub fn with_seed(seed: u64, now: DateTime<Utc>) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), now)
    }

    fn with_rng(mut rng: StdRng, now: DateTime<Utc>) -> Self {
        let default_config = DeviceConfig {
            watering_interval: DEFAULT_WATERING_INTERVAL_SECS,
            watering_duration: DEFAULT_WATERING_DURATION_SECS,
            name: format!("hydro-{}", rng.gen_range(1000..10000)),
        };
        Self {
            config: default_config.clone(),
            default_config,
            temperature_c: INITIAL_TEMPERATURE_C,
            water_level: INITIAL_WATER_LEVEL,
            watering: false,
            last_transition: now,
            last_reading: now,
            last_history_dump: now,
            temperature_samples: Vec::new(),
            water_level_samples: Vec::new(),
            history: SampleHistory::default(),
            rng,
        }
    }

    /// Replace the configuration with an already-typed value.
    ///
    /// Used at startup when settings come from the operator rather than the
    /// network. The cycle clock is left untouched.
    pub fn apply_config(&mut self, config: DeviceConfig) -> Result<(), DeviceError> {
        if config.watering_interval == 0 {
            return Err(DeviceError::InvalidConfig {
                field: "watering_interval",
            });
        }
        if config.watering_duration == 0 {
            return Err(DeviceError::InvalidConfig {
                field: "watering_duration",
            });
        }
        self.config = config;
        Ok(())
    }

    /// Apply a partial update from the network, or reset to generated
    /// defaults when no update is supplied.
    ///
    /// Both duration fields are validated before either is written, so a
    /// rejected update leaves the previous configuration fully intact.
    /// `last_transition` is never rewritten here; new intervals take effect
    /// at the next transition check.
    pub fn configure(&mut self, update: Option<ConfigUpdate>) -> Result<(), DeviceError> {
        let Some(update) = update else {
            self.config = self.default_config.clone();
            info!(device = %self.config.name, "configuration reset to generated defaults");
            return Ok(());
        };

        let interval = require_positive_int(update.watering_interval.as_ref(), "watering_interval")?;
        let duration = require_positive_int(update.watering_duration.as_ref(), "watering_duration")?;
        let name = update
            .name
            .unwrap_or_else(|| self.default_config.name.clone());

        self.config = DeviceConfig {
            watering_interval: interval,
            watering_duration: duration,
            name,
        };
        info!(
            device = %self.config.name,
            interval_s = interval,
            duration_s = duration,
            "configuration applied"
        );
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Instantaneous sensor and cycle state.
    pub fn snapshot(&self) -> DeviceStatus {
        DeviceStatus {
            temperature_c: self.temperature_c,
            water_level: self.water_level,
            watering: self.watering,
            last_transition: self.last_transition,
        }
    }

    /// Copy of the aggregated history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_watering(&self) -> bool {
        self.watering
    }

    /// When the sensors were last sampled.
    pub fn last_reading(&self) -> DateTime<Utc> {
        self.last_reading
    }

    /// Number of sensor samples buffered for the next watering aggregate.
    pub fn buffered_samples(&self) -> usize {
        self.temperature_samples.len()
    }

    /// Force the watering cycle on, restarting the duration clock.
    pub fn start_watering(&mut self, now: DateTime<Utc>) {
        info!(device = %self.config.name, "watering forced on");
        self.watering = true;
        self.last_transition = now;
    }

    /// Force the watering cycle off, restarting the interval clock.
    pub fn stop_watering(&mut self, now: DateTime<Utc>) {
        info!(device = %self.config.name, "watering forced off");
        self.watering = false;
        self.last_transition = now;
    }

    /// Advance the simulation by one time step.
    ///
    /// Returns the delay the scheduler should wait before the next call:
    /// 100 ms during an active watering cycle, 60 s while idle.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Duration {
        self.update_sensors(now);
        self.check_watering(now);
        self.maybe_record_history(now);
        if self.watering {
            ACTIVE_POLL_DELAY
        } else {
            IDLE_POLL_DELAY
        }
    }

    fn update_sensors(&mut self, now: DateTime<Utc>) {
        let noise = self.rng.gen_range(-1.0..=1.0) * WATER_NOISE;
        self.water_level = (self.water_level - WATER_DECAY_PER_TICK + noise).max(0.0);

        let drift = self.rng.gen_range(-TEMPERATURE_NOISE_C..=TEMPERATURE_NOISE_C);
        self.temperature_c = (self.temperature_c + drift).clamp(TEMPERATURE_MIN_C, TEMPERATURE_MAX_C);
        self.last_reading = now;

        if self.watering {
            self.temperature_samples.push(self.temperature_c);
            self.water_level_samples.push(self.water_level);
        }
    }

    fn check_watering(&mut self, now: DateTime<Utc>) {
        let elapsed = now.signed_duration_since(self.last_transition);
        if self.watering {
            if elapsed > chrono::Duration::seconds(self.config.watering_duration as i64) {
                self.watering = false;
                self.last_transition = now;
                debug!(device = %self.config.name, "watering cycle finished");
            }
        } else if elapsed > chrono::Duration::seconds(self.config.watering_interval as i64) {
            self.watering = true;
            self.last_transition = now;
            debug!(device = %self.config.name, "watering cycle started");
        }
    }

    fn maybe_record_history(&mut self, now: DateTime<Utc>) {
        let since_dump = now.signed_duration_since(self.last_history_dump);
        if since_dump < chrono::Duration::seconds(HISTORY_DUMP_INTERVAL_SECS) {
            return;
        }

        // While watering the entry averages the samples buffered since the
        // previous dump. The buffers are empty when the cycle began on this
        // very tick; fall back to the instantaneous readings in that case.
        let entry = if self.watering && !self.temperature_samples.is_empty() {
            let entry = HistoryEntry {
                temperature_c: mean(&self.temperature_samples),
                water_level: mean(&self.water_level_samples),
            };
            self.temperature_samples.clear();
            self.water_level_samples.clear();
            entry
        } else {
            HistoryEntry {
                temperature_c: self.temperature_c,
                water_level: self.water_level,
            }
        };

        self.history.push(entry);
        self.last_history_dump = now;
        debug!(
            device = %self.config.name,
            temperature_c = entry.temperature_c,
            water_level = entry.water_level,
            "history entry recorded"
        );
    }
}

fn require_positive_int(value: Option<&Value>, field: &'static str) -> Result<u64, DeviceError> {
    value
        .and_then(Value::as_i64)
        .filter(|candidate| *candidate > 0)
        .map(|candidate| candidate as u64)
        .ok_or(DeviceError::InvalidConfig { field })
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        base_time() + chrono::Duration::seconds(seconds)
    }

    fn update(interval: Value, duration: Value, name: Option<&str>) -> ConfigUpdate {
        ConfigUpdate {
            watering_interval: Some(interval),
            watering_duration: Some(duration),
            name: name.map(str::to_owned),
        }
    }

    #[test]
    fn generated_defaults_are_applied() {
        let device = SimulatedDevice::with_seed(7, base_time());
        let config = device.config();
        assert_eq!(config.watering_interval, 60);
        assert_eq!(config.watering_duration, 30);
        assert!(config.name.starts_with("hydro-"));
    }

    #[test]
    fn configure_round_trips_valid_values() {
        let mut device = SimulatedDevice::with_seed(7, base_time());
        device
            .configure(Some(update(json!(120), json!(15), Some("bench-a"))))
            .unwrap();
        let config = device.config();
        assert_eq!(config.watering_interval, 120);
        assert_eq!(config.watering_duration, 15);
        assert_eq!(config.name, "bench-a");
    }

    #[test]
    fn configure_rejects_non_positive_values() {
        let mut device = SimulatedDevice::with_seed(7, base_time());
        let before = device.config().clone();

        let err = device
            .configure(Some(update(json!(-5), json!(10), Some("x"))))
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::InvalidConfig {
                field: "watering_interval"
            }
        );
        assert_eq!(device.config(), &before);

        let err = device
            .configure(Some(update(json!(10), json!(0), None)))
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::InvalidConfig {
                field: "watering_duration"
            }
        );
        assert_eq!(device.config(), &before);
    }

    #[test]
    fn configure_rejects_non_integers() {
        let mut device = SimulatedDevice::with_seed(7, base_time());
        let before = device.config().clone();

        for bad in [json!(2.5), json!("30"), json!(null), json!([30])] {
            let err = device
                .configure(Some(update(bad, json!(10), None)))
                .unwrap_err();
            assert_eq!(
                err,
                DeviceError::InvalidConfig {
                    field: "watering_interval"
                }
            );
            assert_eq!(device.config(), &before);
        }
    }

    #[test]
    fn configure_requires_both_durations() {
        let mut device = SimulatedDevice::with_seed(7, base_time());
        let err = device
            .configure(Some(ConfigUpdate {
                watering_interval: Some(json!(90)),
                watering_duration: None,
                name: None,
            }))
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::InvalidConfig {
                field: "watering_duration"
            }
        );
        // All-or-nothing: the valid interval must not have been written.
        assert_eq!(device.config().watering_interval, 60);
    }

    #[test]
    fn configure_without_name_falls_back_to_generated_default() {
        let mut device = SimulatedDevice::with_seed(7, base_time());
        let default_name = device.config().name.clone();
        device
            .configure(Some(update(json!(90), json!(20), Some("temporary"))))
            .unwrap();
        assert_eq!(device.config().name, "temporary");

        device
            .configure(Some(update(json!(91), json!(21), None)))
            .unwrap();
        assert_eq!(device.config().name, default_name);
    }

    #[test]
    fn configure_none_restores_defaults() {
        let mut device = SimulatedDevice::with_seed(7, base_time());
        device
            .configure(Some(update(json!(500), json!(250), Some("custom"))))
            .unwrap();
        device.configure(None).unwrap();
        let config = device.config();
        assert_eq!(config.watering_interval, 60);
        assert_eq!(config.watering_duration, 30);
        assert!(config.name.starts_with("hydro-"));
    }

    #[test]
    fn apply_config_rejects_zero_durations() {
        let mut device = SimulatedDevice::with_seed(7, base_time());
        let err = device
            .apply_config(DeviceConfig {
                watering_interval: 0,
                watering_duration: 30,
                name: "zero".into(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::InvalidConfig {
                field: "watering_interval"
            }
        );
    }

    #[test]
    fn sensor_bounds_hold_over_many_polls() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        for tick in 1..=500 {
            device.poll(at(tick));
            let status = device.snapshot();
            assert!(status.temperature_c >= TEMPERATURE_MIN_C);
            assert!(status.temperature_c <= TEMPERATURE_MAX_C);
            assert!(status.water_level >= 0.0);
        }
        // 500 ticks of 0.05 decay dwarf the +-0.01 noise.
        assert!(device.snapshot().water_level < INITIAL_WATER_LEVEL);
        assert_eq!(device.last_reading(), at(500));
    }

    #[test]
    fn watering_starts_only_after_interval_elapses() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        device.poll(at(30));
        assert!(!device.is_watering());

        // Exactly at the threshold the strict comparison keeps the cycle idle.
        device.poll(at(60));
        assert!(!device.is_watering());

        let delay = device.poll(at(61));
        assert!(device.is_watering());
        assert!(device.snapshot().watering);
        assert_eq!(device.snapshot().last_transition, at(61));
        assert_eq!(delay, Duration::from_millis(100));
    }

    #[test]
    fn watering_stops_after_duration_elapses() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        device.poll(at(61));
        assert!(device.is_watering());

        device.poll(at(61 + 30));
        assert!(device.is_watering());

        let delay = device.poll(at(61 + 31));
        assert!(!device.is_watering());
        assert_eq!(device.snapshot().last_transition, at(61 + 31));
        assert_eq!(delay, Duration::from_secs(60));
    }

    #[test]
    fn at_most_one_transition_per_poll() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        device
            .configure(Some(update(json!(1), json!(1), None)))
            .unwrap();

        // Far past both thresholds; only the idle->watering edge may fire.
        device.poll(at(1000));
        assert!(device.is_watering());
        assert_eq!(device.snapshot().last_transition, at(1000));

        // No time elapsed since the transition, so the cycle holds.
        device.poll(at(1000));
        assert!(device.is_watering());
    }

    #[test]
    fn configure_does_not_reset_cycle_clock() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        device
            .configure(Some(update(json!(5), json!(30), None)))
            .unwrap();
        // The transition clock still anchors at creation, so 10 elapsed
        // seconds already exceed the shortened interval.
        device.poll(at(10));
        assert!(device.is_watering());
    }

    #[test]
    fn idle_history_entry_is_instantaneous() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        device.poll(at(60));
        assert!(!device.is_watering());
        let status = device.snapshot();
        let history = device.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].temperature_c, status.temperature_c);
        assert_eq!(history[0].water_level, status.water_level);
        assert_eq!(device.buffered_samples(), 0);
    }

    #[test]
    fn watering_history_entry_averages_buffered_samples() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        device
            .configure(Some(update(json!(1), json!(1000), None)))
            .unwrap();
        device.poll(at(2));
        assert!(device.is_watering());
        assert_eq!(device.buffered_samples(), 0);

        let mut temperatures = Vec::new();
        let mut levels = Vec::new();
        for tick in [3, 4, 5] {
            device.poll(at(tick));
            let status = device.snapshot();
            temperatures.push(status.temperature_c);
            levels.push(status.water_level);
        }
        assert_eq!(device.buffered_samples(), 3);

        // The dump tick buffers one more sample before aggregating.
        device.poll(at(62));
        let status = device.snapshot();
        temperatures.push(status.temperature_c);
        levels.push(status.water_level);

        let history = device.history();
        assert_eq!(history.len(), 1);
        assert!((history[0].temperature_c - mean(&temperatures)).abs() < 1e-9);
        assert!((history[0].water_level - mean(&levels)).abs() < 1e-9);
        assert_eq!(device.buffered_samples(), 0);
    }

    #[test]
    fn watering_dump_with_empty_buffers_uses_instantaneous_readings() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        // The cycle starts and the dump fires on the same tick, before any
        // sample could be buffered.
        device.poll(at(61));
        assert!(device.is_watering());
        let status = device.snapshot();
        let history = device.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].temperature_c, status.temperature_c);
        assert_eq!(history[0].water_level, status.water_level);
    }

    #[test]
    fn manual_override_forces_cycle_state() {
        let mut device = SimulatedDevice::with_seed(42, base_time());
        device.start_watering(at(5));
        assert!(device.is_watering());
        assert_eq!(device.snapshot().last_transition, at(5));

        device.stop_watering(at(9));
        assert!(!device.is_watering());
        assert_eq!(device.snapshot().last_transition, at(9));
    }
}
