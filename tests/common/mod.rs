//! Shared utilities for integration tests.

#![allow(dead_code)]

use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use plant_care::config::{AppConfig, Environment};
use plant_care::security::rate_limit::{Algorithm, RateLimitRule, Scope};
use plant_care::{AppState, HttpServer, Shutdown};

pub const ADMIN_KEY: &str = "test-admin-key";
pub const PASSWORD: &str = "Sunflower#42";

/// Configuration for an in-process server: admin on, no background jobs,
/// registration limit raised so tests can create several users.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.environment = Environment::Testing;
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.jobs.enabled = false;
    config.health.minimum_startup_secs = 0;
    config.rate_limit.rules.push(RateLimitRule::new(
        "auth_register",
        100,
        3600,
        Algorithm::FixedWindow,
        Scope::Ip,
    ));
    config
}

/// A running server bound to an ephemeral port. Shut down on drop.
pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub state: AppState,
    shutdown: Shutdown,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_server(config: AppConfig) -> TestServer {
    spawn_server_with_metrics(config, None).await
}

/// Like [`spawn_server`], exposing `handle` at `/metrics`.
pub async fn spawn_server_with_metrics(
    config: AppConfig,
    handle: Option<PrometheusHandle>,
) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = AppState::new(config, handle);
    let shutdown = Shutdown::new();
    state.spawn_background(&shutdown);

    let server = HttpServer::new(state.clone());
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        state,
        shutdown,
    }
}

pub async fn start() -> TestServer {
    spawn_server(test_config()).await
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub fn admin(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(ADMIN_KEY)
    }

    pub async fn register(&self, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, email: &str) -> Value {
        let res = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200, "login failed for {email}");
        res.json().await.unwrap()
    }

    /// Register and log in, returning `(user_id, access_token)`.
    pub async fn signup(&self, email: &str) -> (String, String) {
        let res = self.register(email).await;
        assert_eq!(res.status(), 201, "registration failed for {email}");
        let body = self.login(email).await;
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["access_token"].as_str().unwrap().to_string(),
        )
    }
}
