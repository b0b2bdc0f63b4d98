//! Admin API: key checks, user management and operational controls.

use reqwest::Method;
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_admin_requires_key() {
    let server = common::start().await;

    let res = server.get("/admin/dashboard").await;
    assert_eq!(res.status(), 401);

    let res = server
        .client
        .get(server.url("/admin/dashboard"))
        .bearer_auth("wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = server.admin(Method::GET, "/admin/dashboard").send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["environment"], "testing");
}

#[tokio::test]
async fn test_admin_not_mounted_when_disabled() {
    let mut config = common::test_config();
    config.admin.enabled = false;
    let server = common::spawn_server(config).await;
    let res = server.admin(Method::GET, "/admin/dashboard").send().await.unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_list_and_suspend_users() {
    let server = common::start().await;
    let (user_id, token) = server.signup("thyme@example.com").await;
    server.signup("mint@example.com").await;

    let page: Value = server
        .admin(Method::GET, "/admin/users?search=thyme")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["users"][0]["id"], user_id.as_str());

    let detail: Value = server
        .admin(Method::GET, &format!("/admin/users/{user_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["subscription"]["tier"], "free");

    let res = server
        .admin(Method::PUT, &format!("/admin/users/{user_id}/status"))
        .json(&json!({ "status": "suspended", "reason": "spam" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["status"], "suspended");

    // Suspended accounts cannot log in again.
    let res = server
        .client
        .post(server.url("/api/v1/auth/login"))
        .json(&json!({ "email": "thyme@example.com", "password": common::PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    drop(token);

    let res = server
        .admin(Method::PUT, &format!("/admin/users/{user_id}/status"))
        .json(&json!({ "status": "deleted" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);

    let res = server
        .admin(Method::GET, "/admin/users/no-such-user")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_rate_limit_rule_management() {
    let server = common::start().await;

    let res = server
        .admin(Method::POST, "/admin/rate-limits/rules")
        .json(&json!({
            "name": "custom_rule",
            "requests": 2,
            "window_secs": 60,
            "algorithm": "fixed_window",
            "scope": "user",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    let rules: Value = server
        .admin(Method::GET, "/admin/rate-limits")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rules["enabled"], true);
    assert!(rules["rules"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["name"] == "custom_rule"));

    let res = server
        .admin(Method::DELETE, "/admin/rate-limits/rules/custom_rule")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
    let res = server
        .admin(Method::DELETE, "/admin/rate-limits/rules/custom_rule")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = server
        .admin(Method::POST, "/admin/rate-limits/rules")
        .json(&json!({
            "name": "broken",
            "requests": 0,
            "window_secs": 60,
            "algorithm": "fixed_window",
            "scope": "user",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);
}

#[tokio::test]
async fn test_circuit_breaker_reset() {
    let server = common::start().await;
    let breaker = server.state.breakers.get("payment_gateway");
    for _ in 0..3 {
        let _ = breaker.call(async { Err::<(), _>("declined") }).await;
    }

    let breakers: Value = server
        .admin(Method::GET, "/admin/circuit-breakers")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let gateway = breakers
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["name"] == "payment_gateway")
        .unwrap();
    assert_eq!(gateway["state"], "open");

    let res = server
        .admin(Method::POST, "/admin/circuit-breakers/payment_gateway/reset")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
    assert!(server.state.breakers.open_circuits().is_empty());

    let res = server
        .admin(Method::POST, "/admin/circuit-breakers/unknown/reset")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_cache_clear_by_pattern() {
    let server = common::start().await;
    server.state.cache.set("user_profile:1", json!("a"), None);
    server.state.cache.set("user_profile:2", json!("b"), None);
    server.state.cache.set("weather:paris", json!("c"), None);

    let body: Value = server
        .admin(Method::DELETE, "/admin/cache?pattern=user_profile:*")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["removed"], 2);
    assert!(server.state.cache.exists("weather:paris"));
}

#[tokio::test]
async fn test_events_recorded_and_replayed() {
    let server = common::start().await;
    server.signup("clover@example.com").await;

    let stats: Value = server
        .admin(Method::GET, "/admin/events")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(stats["stats"]["total_events"].as_u64().unwrap() >= 2);

    let events: Value = server
        .admin(Method::GET, "/admin/events/replay?event_type=user.registered")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(events.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_trigger_job() {
    let server = common::start().await;

    let res = server
        .admin(Method::POST, "/admin/jobs/cleanup_old_data/trigger")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);
    let job: Value = res.json().await.unwrap();
    assert_eq!(job["task"], "cleanup_old_data");
    assert_eq!(job["queue"], "low_priority");

    let res = server
        .admin(Method::POST, "/admin/jobs/send_care_reminders/trigger")
        .json(&json!({ "queue": "medium_priority" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);
    let job: Value = res.json().await.unwrap();
    assert_eq!(job["queue"], "medium_priority");

    let stats: Value = server
        .admin(Method::GET, "/admin/jobs")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["enabled"], false);
    assert_eq!(stats["queued"]["low_priority"], 1);
    assert_eq!(stats["queued"]["medium_priority"], 1);

    let res = server
        .admin(Method::POST, "/admin/jobs/water_the_garden/trigger")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}
