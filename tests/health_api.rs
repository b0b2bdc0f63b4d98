//! Probe and service information endpoints.

use serde_json::Value;

mod common;

#[tokio::test]
async fn test_liveness_and_readiness() {
    let server = common::start().await;

    let res = server.get("/health/live").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "alive");

    let res = server.get("/health/ready").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["cache"], "healthy");
    assert_eq!(body["checks"]["user_store"], "healthy");
}

#[tokio::test]
async fn test_startup_waits_for_minimum_uptime() {
    let mut config = common::test_config();
    config.health.minimum_startup_secs = 3600;
    let server = common::spawn_server(config).await;

    let res = server.get("/health/startup").await;
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "starting");

    let server = common::start().await;
    let res = server.get("/health/startup").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "started");
}

#[tokio::test]
async fn test_detailed_lists_every_component() {
    let server = common::start().await;
    let res = server.get("/health/detailed").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["environment"], "testing");
    let components: Vec<&str> = body["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["component"].as_str().unwrap())
        .collect();
    assert_eq!(
        components,
        ["cache", "event_bus", "user_store", "jobs", "circuit_breakers"]
    );
}

#[tokio::test]
async fn test_single_component() {
    let server = common::start().await;

    let res = server.get("/health/components/event_bus").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["component"], "event_bus");

    let res = server.get("/health/components/database").await;
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert!(body["available_components"].as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn test_open_circuit_reports_degraded() {
    let server = common::start().await;
    let breaker = server.state.breakers.get("weather_api");
    for _ in 0..6 {
        let _ = breaker.call(async { Err::<(), _>("timeout") }).await;
    }

    let res = server.get("/health/components/circuit_breakers").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["details"]["open_circuits"][0], "weather_api");

    // Degraded does not fail readiness.
    assert_eq!(server.get("/health/ready").await.status(), 200);
}

#[tokio::test]
async fn test_service_root_and_api_info() {
    let server = common::start().await;

    let body: Value = server.get("/").await.json().await.unwrap();
    assert_eq!(body["status"], "running");
    assert_eq!(body["health_check"], "/health/live");

    let body: Value = server.get("/api/v1").await.json().await.unwrap();
    assert_eq!(body["status"], "operational");

    let res = server.get("/api/v1/status").await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let body: Value = server.get("/api/v1/version").await.json().await.unwrap();
    assert_eq!(body["api_version"], "1.0.0");
    assert_eq!(body["features"]["background_jobs"], false);
}

#[tokio::test]
async fn test_request_id_and_security_headers() {
    let server = common::start().await;

    let res = server.get("/health/live").await;
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert_eq!(res.headers()["x-frame-options"], "DENY");

    let res = server
        .client
        .get(server.url("/health/live"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-me");
}

#[tokio::test]
async fn test_placeholder_modules_answer_not_implemented() {
    let server = common::start().await;
    for path in ["/api/v1/plants", "/api/v1/care/schedules/42", "/api/v1/weather/current"] {
        let res = server.get(path).await;
        assert_eq!(res.status(), 501, "{path}");
    }
    let body: Value = server.get("/api/v1/ai/chat").await.json().await.unwrap();
    assert_eq!(body["module"], "ai");
}

#[tokio::test]
async fn test_metrics_disabled_without_recorder() {
    let server = common::start().await;
    assert_eq!(server.get("/metrics").await.status(), 404);
}
