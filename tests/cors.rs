//! Cross-origin handling for browser clients.

use reqwest::Method;

mod common;

const ALLOWED: &str = "http://localhost:3000";

#[tokio::test]
async fn test_preflight_from_configured_origin() {
    let server = common::start().await;

    let res = server
        .client
        .request(Method::OPTIONS, server.url("/api/v1/version"))
        .header("origin", ALLOWED)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let headers = res.headers();
    assert_eq!(headers["access-control-allow-origin"], ALLOWED);
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST"));
    assert!(methods.contains("PATCH"));
    assert_eq!(headers["access-control-allow-headers"], "*");
}

#[tokio::test]
async fn test_preflight_from_unknown_origin() {
    let server = common::start().await;

    let res = server
        .client
        .request(Method::OPTIONS, server.url("/api/v1/version"))
        .header("origin", "https://evil.example")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();

    assert!(!res.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_simple_request_carries_origin() {
    let server = common::start().await;

    let res = server
        .client
        .get(server.url("/api/v1/version"))
        .header("origin", ALLOWED)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["access-control-allow-origin"], ALLOWED);
    // Router-level headers still apply underneath CORS.
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");

    let res = server
        .client
        .get(server.url("/api/v1/version"))
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(!res.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_configured_origin_list_is_used() {
    let mut config = common::test_config();
    config.server.cors_origins = vec!["https://app.plantcare.example".to_string()];
    let server = common::spawn_server(config).await;

    let res = server
        .client
        .get(server.url("/health/live"))
        .header("origin", "https://app.plantcare.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers()["access-control-allow-origin"],
        "https://app.plantcare.example"
    );

    let res = server
        .client
        .get(server.url("/health/live"))
        .header("origin", ALLOWED)
        .send()
        .await
        .unwrap();
    assert!(!res.headers().contains_key("access-control-allow-origin"));
}
