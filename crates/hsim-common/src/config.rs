//! ---
//! hsim_section: "04-configuration-orchestration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Settings loading and validation for simulator processes."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_watering_interval() -> u64 {
    60
}

fn default_watering_duration() -> u64 {
    30
}

fn default_listen_addr() -> IpAddr {
    "0.0.0.0".parse().expect("valid default listen address")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Settings for one simulator process.
///
/// Every section has complete defaults, so a missing settings file yields a
/// fully usable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimSettings {
    #[serde(default)]
    pub device: DeviceDefaults,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

impl SimSettings {
    pub const ENV_CONFIG_PATH: &str = "HSIM_CONFIG";

    /// Load settings from disk, respecting the `HSIM_CONFIG` override.
    ///
    /// Candidates are tried in order; when none exists the built-in defaults
    /// are returned, matching how the simulator is typically run on a
    /// developer workstation.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }

        debug!("no settings file found; using built-in defaults");
        Ok(Self::default())
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(settings_path = %path.display(), "loading settings");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read settings file {}", path.display()))?;
        let settings = toml::from_str::<SimSettings>(&contents)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.device.validate()
    }
}

impl std::str::FromStr for SimSettings {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let settings: SimSettings =
            toml::from_str(content).with_context(|| "failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Default watering schedule applied to a freshly started device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefaults {
    #[serde(default = "default_watering_interval")]
    pub watering_interval: u64,
    #[serde(default = "default_watering_duration")]
    pub watering_duration: u64,
    /// Fixed device name; a random one is generated when absent.
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceDefaults {
    pub fn validate(&self) -> Result<()> {
        if self.watering_interval == 0 {
            return Err(anyhow!("device.watering_interval must be a positive integer"));
        }
        if self.watering_duration == 0 {
            return Err(anyhow!("device.watering_duration must be a positive integer"));
        }
        Ok(())
    }
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            watering_interval: default_watering_interval(),
            watering_duration: default_watering_duration(),
            name: None,
        }
    }
}

/// HTTP façade settings. The port itself arrives as a startup argument so
/// the fleet launcher can assign consecutive ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_listen_addr")]
    pub listen: IpAddr,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Directory for rolling per-instance log files; stdout only when absent.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
        }
    }
}

/// Knobs that only affect the simulation itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Fixed seed for the sensor noise generator; entropy-seeded when absent.
    #[serde(default)]
    pub random_seed: Option<u64>,
}
