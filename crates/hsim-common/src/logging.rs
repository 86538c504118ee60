//! ---
//! hsim_section: "01-core-functionality"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Tracing initialisation for simulator processes."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingSettings;

const LOG_ENV: &str = "HSIM_LOG";

// The non-blocking file writer stops flushing once its guard drops, so the
// guard has to outlive the process.
static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for simulator processes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Initialise tracing for one simulator process.
///
/// A fleet run puts several daemons on one workstation, so each process logs
/// under its own identity: `instance` (the listen port for `hsimd`) becomes
/// part of the log file name and a field on the startup event. Stdout is
/// always on in the configured format; the rolling daily JSON file is only
/// written when `logging.directory` is set, since ad-hoc bench runs usually
/// want a terminal and nothing else.
pub fn init_tracing(
    service_name: &str,
    instance: Option<&str>,
    settings: &LoggingSettings,
) -> Result<()> {
    let stdout_layer = match settings.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
    };

    let file_layer = match &settings.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let stem = match instance {
                Some(instance) => format!("{service_name}-{instance}.log"),
                None => format!("{service_name}.log"),
            };
            let (writer, guard) = tracing_appender::non_blocking(daily(directory, stem));
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .json()
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        instance = instance.unwrap_or("-"),
        file_sink = settings.directory.is_some(),
        format = ?settings.format,
        "tracing initialised"
    );
    Ok(())
}

/// `HSIM_LOG` wins over `RUST_LOG` so a fleet run can be tuned without
/// touching the global variable; both absent defaults to `info`.
fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); falling back to info");
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}
