//! ---
//! hsim_section: "05-networking-external-interfaces"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "HTTP facade mapping requests onto the device engine."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
//! Thin HTTP façade over one [`SimulatedDevice`].
//!
//! Every handler acquires the device mutex for its full duration, so readers
//! never observe a partially applied poll step.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use hsim_common::metrics::{DeviceMetrics, SharedRegistry};
use hsim_device::{ConfigUpdate, DeviceConfig, DeviceError, SimulatedDevice};
use parking_lot::Mutex;
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Device handle shared between the façade and the polling loop.
pub type SharedDevice = Arc<Mutex<SimulatedDevice>>;

/// Wire representation of the status endpoint.
///
/// Field names are the contract the dashboard consumes; the transition
/// timestamp is exposed in milliseconds since epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub current_temp: f64,
    pub current_water_level: f64,
    pub is_watering: bool,
    pub last_watering_time: i64,
}

/// Confirmation payload for mutating endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

/// Shared state injected into the axum handlers.
struct ApiState {
    device: SharedDevice,
    registry: Option<SharedRegistry>,
    metrics: Option<Arc<DeviceMetrics>>,
}

/// Builder used to configure and spawn the device API server.
#[derive(Clone)]
pub struct ApiBuilder {
    listen: SocketAddr,
    device: SharedDevice,
    registry: Option<SharedRegistry>,
    metrics: Option<Arc<DeviceMetrics>>,
}

impl ApiBuilder {
    pub fn new(listen: SocketAddr, device: SharedDevice) -> Self {
        Self {
            listen,
            device,
            registry: None,
            metrics: None,
        }
    }

    /// Attach a Prometheus registry exposed at `/metrics` together with the
    /// device counters updated by the façade.
    pub fn with_metrics(mut self, registry: SharedRegistry, metrics: Arc<DeviceMetrics>) -> Self {
        self.registry = Some(registry);
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the API server and return a handle for graceful shutdown.
    pub async fn spawn(self) -> anyhow::Result<ApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "device api listening");

        let state = ApiState {
            device: self.device,
            registry: self.registry,
            metrics: self.metrics,
        };
        let router = Router::new()
            .route("/status", get(get_status))
            .route("/history", get(get_history))
            .route("/config", get(get_config).post(post_config))
            .route("/water", post(post_water))
            .route("/stop", post(post_stop))
            .route("/healthz", get(healthz))
            .route("/metrics", get(get_metrics))
            // Dashboards are served from another origin.
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(state));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "device api server exited with error");
            }
        });

        Ok(ApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`ApiBuilder::spawn`].
pub struct ApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ApiHandle {
    /// Retrieve the socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let status = state.device.lock().snapshot();
    Json(StatusResponse {
        current_temp: status.temperature_c,
        current_water_level: status.water_level,
        is_watering: status.watering,
        last_watering_time: status.last_transition.timestamp_millis(),
    })
}

async fn get_history(State(state): State<Arc<ApiState>>) -> Json<Vec<(f64, f64)>> {
    let entries = state.device.lock().history();
    Json(
        entries
            .into_iter()
            .map(|entry| (entry.temperature_c, entry.water_level))
            .collect(),
    )
}

async fn get_config(State(state): State<Arc<ApiState>>) -> Json<DeviceConfig> {
    Json(state.device.lock().config().clone())
}

async fn post_config(
    State(state): State<Arc<ApiState>>,
    Json(update): Json<ConfigUpdate>,
) -> Response {
    let result = state.device.lock().configure(Some(update));
    match result {
        Ok(()) => {
            if let Some(metrics) = &state.metrics {
                metrics.config_updates_total.inc();
            }
            Json(MessageResponse {
                message: "configuration updated".to_owned(),
            })
            .into_response()
        }
        Err(err @ DeviceError::InvalidConfig { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn post_water(State(state): State<Arc<ApiState>>) -> Json<MessageResponse> {
    state.device.lock().start_watering(Utc::now());
    Json(MessageResponse {
        message: "watering started".to_owned(),
    })
}

async fn post_stop(State(state): State<Arc<ApiState>>) -> Json<MessageResponse> {
    state.device.lock().stop_watering(Utc::now());
    Json(MessageResponse {
        message: "watering stopped".to_owned(),
    })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(registry) = &state.registry else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };

    let encoder = TextEncoder::new();
    let families = registry.gather();
    match encoder.encode_to_string(&families) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
