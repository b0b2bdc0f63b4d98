//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router (service root, health probes, `/metrics`, `/api/v1`, `/admin`)
//! - Wire middleware (tracing, request id, CORS, security headers, body limit,
//!   timeout, rate limiting, metrics)
//! - Serve on a listener until shutdown

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, Request},
    middleware,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::handlers::{self, system};
use crate::http::middleware::{rate_limit_middleware, track_metrics};
use crate::http::AppState;
use crate::lifecycle::Shutdown;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Added to every response unless a handler already set them.
const SECURITY_HEADERS: [(&str, &str); 7] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("content-security-policy", "default-src 'self'"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
];

/// HTTP server for the plant care API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = build_router(state.clone());
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut shutdown_rx = shutdown.subscribe();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the full application router.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let config = state.config();

    let api = handlers::api_v1().layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit_middleware,
    ));

    let mut app = Router::new()
        .route("/", get(system::service_root))
        .route("/metrics", get(system::metrics))
        .nest("/health", crate::health::router())
        .nest("/api/v1", api);

    if config.admin.enabled {
        tracing::info!("Admin API enabled at /admin");
        app = app.nest("/admin", crate::admin::router(state.clone()));
    }

    let mut app: Router = app
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state);
    for (name, value) in SECURITY_HEADERS {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }
    app = app.layer(SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-plant-care-version"),
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    ));

    let request_id = HeaderName::from_static(X_REQUEST_ID);
    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::new(request_id))
            .layer(DefaultBodyLimit::max(config.server.max_body_size))
            .layer(RequestBodyLimitLayer::new(config.server.max_body_size))
            // CORS needs a `Default` response body, so it sits inside the limit.
            .layer(cors_layer(&config.server.cors_origins))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            ))),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
