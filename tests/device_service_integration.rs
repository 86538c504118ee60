//! ---
//! hsim_section: "15-testing-qa-runbook"
//! hsim_subsection: "integration"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "End-to-end tests driving one device instance over HTTP."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
//! Drives a complete device instance (engine, shared state, HTTP façade)
//! the way the fleet runs it, with the simulation clock advanced manually
//! so cycle timing stays deterministic.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use hsim_api::{ApiBuilder, MessageResponse, SharedDevice, StatusResponse};
use hsim_common::metrics::{new_registry, DeviceMetrics};
use hsim_device::{DeviceConfig, SimulatedDevice};
use parking_lot::Mutex;
use serde_json::json;

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

async fn spawn_instance() -> (SharedDevice, hsim_api::ApiHandle, String) {
    let device: SharedDevice = Arc::new(Mutex::new(SimulatedDevice::with_seed(99, created_at())));
    let registry = new_registry();
    let metrics = Arc::new(DeviceMetrics::new(&registry).unwrap());
    let handle = ApiBuilder::new("127.0.0.1:0".parse().unwrap(), device.clone())
        .with_metrics(registry, metrics)
        .spawn()
        .await
        .unwrap();
    let base = format!("http://{}", handle.local_addr());
    (device, handle, base)
}

#[tokio::test]
async fn watering_cycle_is_visible_over_http() {
    let (device, handle, base) = spawn_instance().await;
    let client = reqwest::Client::new();

    // Fresh device: idle, cycle anchored at creation.
    let status: StatusResponse = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!status.is_watering);
    assert_eq!(status.last_watering_time, created_at().timestamp_millis());

    // Advance simulated time past the 60 s interval.
    {
        let mut device = device.lock();
        device.poll(created_at() + chrono::Duration::seconds(30));
        device.poll(created_at() + chrono::Duration::seconds(61));
    }

    let status: StatusResponse = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(status.is_watering);
    let expected_ms = (created_at() + chrono::Duration::seconds(61)).timestamp_millis();
    assert_eq!(status.last_watering_time, expected_ms);

    // The 30 s duration then brings the cycle back to idle.
    {
        let mut device = device.lock();
        device.poll(created_at() + chrono::Duration::seconds(61 + 31));
    }
    let status: StatusResponse = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!status.is_watering);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconfiguration_survives_invalid_updates() {
    let (_device, handle, base) = spawn_instance().await;
    let client = reqwest::Client::new();

    let accepted: MessageResponse = client
        .post(format!("{base}/config"))
        .json(&json!({
            "watering_interval": 300,
            "watering_duration": 45,
            "name": "greenhouse-7"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(accepted.message, "configuration updated");

    for payload in [
        json!({ "watering_interval": -5, "watering_duration": 10, "name": "x" }),
        json!({ "watering_interval": 1.5, "watering_duration": 10 }),
        json!({ "watering_duration": 10 }),
        json!({}),
    ] {
        let response = client
            .post(format!("{base}/config"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    let config: DeviceConfig = client
        .get(format!("{base}/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(config.watering_interval, 300);
    assert_eq!(config.watering_duration, 45);
    assert_eq!(config.name, "greenhouse-7");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn history_aggregates_watering_minutes() {
    let (device, handle, base) = spawn_instance().await;
    let client = reqwest::Client::new();

    // Long watering cycle so every buffered sample lands in one aggregate.
    client
        .post(format!("{base}/config"))
        .json(&json!({ "watering_interval": 1, "watering_duration": 600 }))
        .send()
        .await
        .unwrap();

    let expected = {
        let mut device = device.lock();
        device.poll(created_at() + chrono::Duration::seconds(2));
        assert!(device.is_watering());

        let mut temperatures = Vec::new();
        let mut levels = Vec::new();
        for tick in [10, 20, 30, 62] {
            device.poll(created_at() + chrono::Duration::seconds(tick));
            let status = device.snapshot();
            temperatures.push(status.temperature_c);
            levels.push(status.water_level);
        }
        let count = temperatures.len() as f64;
        (
            temperatures.iter().sum::<f64>() / count,
            levels.iter().sum::<f64>() / count,
        )
    };

    let history: Vec<(f64, f64)> = client
        .get(format!("{base}/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!((history[0].0 - expected.0).abs() < 1e-9);
    assert!((history[0].1 - expected.1).abs() < 1e-9);

    handle.shutdown().await.unwrap();
}
