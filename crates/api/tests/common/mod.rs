#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use gridlab_api::config::{ServerConfig, StreamConfig};
use gridlab_api::router::build_app_router;
use gridlab_api::state::AppState;
use gridlab_cache::CacheConfig;
use gridlab_core::types::JobClass;
use gridlab_supervisor::{SupervisorConfig, WorkerCommand};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// An application wired against a scratch directory.
///
/// Only the forecast class has a worker: an `sh` script whose body is
/// chosen by the test.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub dir: TempDir,
}

/// Build a test `ServerConfig` rooted at `dir`.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and a 1-second stream keep-alive.
pub fn test_config(dir: &Path, worker_body: &str) -> ServerConfig {
    let script = dir.join("forecast.sh");
    std::fs::write(&script, format!("#!/bin/sh\n{worker_body}\n")).unwrap();

    let supervisor = SupervisorConfig::new(dir.join("jobs")).with_worker(
        JobClass::Forecast,
        WorkerCommand::new("sh", [script.display().to_string()]),
    );

    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        supervisor: SupervisorConfig {
            cancel_grace: Duration::from_secs(2),
            ..supervisor
        },
        stream: StreamConfig {
            keepalive_secs: 1,
            ..StreamConfig::default()
        },
        cache: CacheConfig {
            disk_dir: Some(dir.join("cache")),
            ..CacheConfig::default()
        },
    }
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app(worker_body: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), worker_body);
    let state = AppState::new(config.clone()).unwrap();
    let app = build_app_router(state.clone(), &config);
    TestApp { app, state, dir }
}

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body as text, failing if it does not end in time.
pub async fn body_text(response: Response<Body>, deadline: Duration) -> String {
    let bytes = tokio::time::timeout(deadline, response.into_body().collect())
        .await
        .expect("response body did not finish in time")
        .unwrap()
        .to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Submit a forecast job and return its id.
pub async fn submit_forecast(app: &Router, scenario_key: &str) -> String {
    let response = post_json(
        app.clone(),
        "/api/v1/jobs",
        serde_json::json!({
            "job_class": "forecast",
            "scenario_key": scenario_key,
            "config": { "horizon_hours": 24 },
        }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Poll job status until it is no longer `running`.
pub async fn wait_for_terminal(app: &Router, job_id: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let json = body_json(get(app.clone(), &format!("/api/v1/jobs/{job_id}")).await).await;
            if json["data"]["status"] != "running" {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}
