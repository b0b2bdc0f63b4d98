//! Registration, login, tokens and the caller's account.

use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_register_login_and_me() {
    let server = common::start().await;

    let res = server.register("Fern@Example.com").await;
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["email"], "fern@example.com");
    assert_eq!(body["user"]["status"], "pending");
    assert!(body["user"].get("password_hash").is_none());

    let login = server.login("fern@example.com").await;
    assert_eq!(login["token_type"], "bearer");
    let token = login["access_token"].as_str().unwrap();

    let res = server.get_auth("/api/v1/users/me", token).await;
    assert_eq!(res.status(), 200);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["email"], "fern@example.com");
    assert!(me["last_login_at"].is_string());
}

#[tokio::test]
async fn test_duplicate_and_weak_registration() {
    let server = common::start().await;
    assert_eq!(server.register("moss@example.com").await.status(), 201);

    let res = server.register("MOSS@example.com").await;
    assert_eq!(res.status(), 409);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "RESOURCE_ALREADY_EXISTS");

    let res = server
        .client
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({ "email": "ivy@example.com", "password": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let res = server
        .client
        .post(server.url("/api/v1/auth/register"))
        .json(&json!({ "email": "fern@example.com", "password": "Sunflower42" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["error"]["details"]["errors"][0],
        "Password must contain at least one special character"
    );
}

#[tokio::test]
async fn test_bad_credentials_rejected() {
    let server = common::start().await;
    server.register("cactus@example.com").await;

    let res = server
        .client
        .post(server.url("/api/v1/auth/login"))
        .json(&json!({ "email": "cactus@example.com", "password": "Wrong1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
}

#[tokio::test]
async fn test_protected_routes_need_a_valid_token() {
    let server = common::start().await;

    let res = server.get("/api/v1/users/me").await;
    assert_eq!(res.status(), 401);

    let res = server.get_auth("/api/v1/users/me", "not-a-jwt").await;
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_refresh_token_flow() {
    let server = common::start().await;
    server.register("palm@example.com").await;
    let login = server.login("palm@example.com").await;

    let res = server
        .client
        .post(server.url("/api/v1/auth/refresh"))
        .json(&json!({ "refresh_token": login["refresh_token"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let pair: Value = res.json().await.unwrap();
    let token = pair["access_token"].as_str().unwrap();
    assert_eq!(server.get_auth("/api/v1/users/me", token).await.status(), 200);

    // An access token is not accepted as a refresh token.
    let res = server
        .client
        .post(server.url("/api/v1/auth/refresh"))
        .json(&json!({ "refresh_token": login["access_token"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn test_verify_email_activates_account() {
    let server = common::start().await;
    let (_, token) = server.signup("orchid@example.com").await;

    let res = server.post_auth("/api/v1/auth/verify-email", &token, json!({})).await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["email_verified"], true);
    assert_eq!(body["user"]["status"], "active");
}

#[tokio::test]
async fn test_profile_read_and_update() {
    let server = common::start().await;
    let (user_id, token) = server.signup("basil@example.com").await;

    let res = server.get_auth("/api/v1/users/me/profile", &token).await;
    assert_eq!(res.status(), 200);
    let profile: Value = res.json().await.unwrap();
    assert_eq!(profile["user_id"], user_id.as_str());

    let res = server
        .client
        .patch(server.url("/api/v1/users/me/profile"))
        .bearer_auth(&token)
        .json(&json!({ "display_name": "Basil", "bio": "Herbs on the balcony" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let profile: Value = res.json().await.unwrap();
    assert_eq!(profile["display_name"], "Basil");

    let profile: Value = server
        .get_auth("/api/v1/users/me/profile", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(profile["bio"], "Herbs on the balcony");
}

#[tokio::test]
async fn test_free_plant_slots() {
    let server = common::start().await;
    let (_, token) = server.signup("aloe@example.com").await;

    let slots: Value = server
        .get_auth("/api/v1/users/me/plant-slots", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(slots["remaining_plant_slots"], 5);
    assert_eq!(slots["can_add_plant"], true);

    let res = server
        .client
        .put(server.url("/api/v1/users/me/plant-count"))
        .bearer_auth(&token)
        .json(&json!({ "count": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = server
        .client
        .put(server.url("/api/v1/users/me/plant-count"))
        .bearer_auth(&token)
        .json(&json!({ "count": 6 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BUSINESS_LOGIC_ERROR");

    let stats: Value = server
        .get_auth("/api/v1/users/me/statistics", &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["plant_count"], 5);
    assert_eq!(stats["can_add_plant"], false);
}
