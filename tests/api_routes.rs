//! HTTP surface driven through the router without a socket.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Datelike, Utc};
use common::{Garden, StubWeather};
use http_body_util::BodyExt;
use predictive_irrigation::{api, config::Config, domain::DeviceStatus, state::AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

async fn app(garden: &Garden) -> Router {
    let mut cfg = Config::default();
    cfg.training.n_trees = 25;
    let state = AppState::from_parts(cfg, Arc::new(StubWeather), garden.collaborators())
        .await
        .unwrap();
    api::router(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn wait_for_job(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, Method::GET, &format!("/api/v1/training/{job_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let state = body["data"]["status"].as_str().unwrap().to_string();
        if state == "succeeded" || state == "failed" {
            return body["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("training job {job_id} did not finish");
}

#[tokio::test]
async fn test_health() {
    let garden = Garden::new();
    let app = app(&garden).await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["trained_devices"], 0);
}

#[tokio::test]
async fn test_error_status_mapping() {
    let garden = Garden::new();
    let device_id = garden.add_device(DeviceStatus::Active);
    let app = app(&garden).await;

    let unknown = Uuid::new_v4();
    let (status, body) = send(&app, Method::POST, &format!("/api/v1/devices/{unknown}/train"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let uri = format!("/api/v1/devices/{device_id}/schedules?days=3");
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().starts_with("ModelNotFound"));

    let uri = format!("/api/v1/devices/{device_id}/schedules");
    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/v1/schedules?start=2026-02-01&end=2026-01-01", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/devices/{device_id}/prediction/today");
    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/training/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_range_is_success() {
    let garden = Garden::new();
    let app = app(&garden).await;

    let (status, body) = send(&app, Method::GET, "/api/v1/schedules?start=2020-01-01&end=2020-01-31", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_train_then_schedule() {
    let garden = Garden::new();
    let device_id = garden.add_device(DeviceStatus::Active);
    garden.record_history(device_id, 40, Utc::now());
    let app = app(&garden).await;

    let (status, body) = send(&app, Method::POST, &format!("/api/v1/devices/{device_id}/train"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "queued");
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let job = wait_for_job(&app, &job_id).await;
    assert_eq!(job["status"], "succeeded", "job: {job}");
    assert_eq!(job["metadata"]["training_samples"], 30);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/devices/{device_id}/model"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["device_id"], device_id.to_string());

    let uri = format!("/api/v1/devices/{device_id}/schedules?days=3");
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::CREATED);
    let rows = body["data"].as_array().unwrap().clone();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["scheduled_date"], Utc::now().date_naive().to_string());
    assert!(rows.iter().all(|r| r["water_amount"].as_f64().unwrap() >= 0.0));

    let id = rows[0]["id"].as_str().unwrap();
    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/schedules/{id}"),
        Some(json!({ "water_amount": 4.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["water_amount"], 4.0);

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/schedules/{id}"),
        Some(json!({ "water_amount": -1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/schedules/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/schedules/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/devices/{device_id}/schedules"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let uri = format!("/api/v1/devices/{device_id}/prediction/today");
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["irrigate"].is_boolean());
    assert_eq!(body["data"]["forecast_snapshot"]["forecast_text"], "Light Rain");

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/devices/{device_id}/forecast"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_inactive_device_training_fails_in_job() {
    let garden = Garden::new();
    let device_id = garden.add_device(DeviceStatus::Inactive);
    let app = app(&garden).await;

    let (status, body) = send(&app, Method::POST, &format!("/api/v1/devices/{device_id}/train"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let job = wait_for_job(&app, &job_id).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["kind"], "DeviceInactive");
}

#[tokio::test]
async fn test_device_history() {
    let garden = Garden::new();
    let device_id = garden.add_device(DeviceStatus::Active);
    garden.record_history(device_id, 5, Utc::now());
    let app = app(&garden).await;

    let end = Utc::now().date_naive() - chrono::Duration::days(1);
    let start = end - chrono::Duration::days(2);
    let uri = format!("/api/v1/devices/{device_id}/history?start={start}&end={end}");
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["device_id"], device_id.to_string());

    let days = body["data"]["days"].as_array().unwrap();
    assert_eq!(days.len(), 3);
    for (day, date) in days.iter().zip(start.iter_days()) {
        assert_eq!(day["date"], date.to_string());
        let soil = 30.0 + f64::from(date.day() % 7) * 4.0;
        assert_eq!(day["sensors"]["soil_moisture"].as_f64(), Some(soil));
        assert_eq!(
            day["rainfall_mm"].as_f64(),
            Some(StubWeather::day(date).rainfall_mm)
        );
    }

    let uri = format!("/api/v1/devices/{device_id}/history?start={end}&end={start}");
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("InvalidScheduleRange"));

    let uri = format!("/api/v1/devices/{device_id}/history?start=yesterday&end={end}");
    let (status, _) = send_raw(&app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = Uuid::new_v4();
    let uri = format!("/api/v1/devices/{unknown}/history?start={start}&end={end}");
    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Status of a GET whose body may not be JSON.
async fn send_raw(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}
