//! Shared application state.

use arc_swap::ArcSwap;
use metrics_exporter_prometheus::PrometheusHandle;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{spawn_sweeper, Cache};
use crate::config::AppConfig;
use crate::events::EventBus;
use crate::integrations::ApiRotation;
use crate::jobs::{register_builtin_tasks, JobScheduler, TaskContext, WorkerPool};
use crate::lifecycle::Shutdown;
use crate::resilience::CircuitBreakerRegistry;
use crate::security::{RateLimiter, TokenService};
use crate::users::{
    InMemorySubscriptionRepository, InMemoryUserRepository, SubscriptionService, UserService,
};

/// Every long-lived component, built once at startup.
pub struct AppContext {
    /// Current configuration. Swapped whole on reload.
    pub config: ArcSwap<AppConfig>,
    pub cache: Cache,
    pub rate_limiter: Arc<RateLimiter>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub rotation: Arc<ApiRotation>,
    pub events: Arc<EventBus>,
    pub tokens: Arc<TokenService>,
    pub users: Arc<UserService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub jobs: Arc<JobScheduler>,
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

/// Cheaply cloneable handle passed to every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppContext>,
}

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AppState {
    pub fn new(config: AppConfig, metrics: Option<PrometheusHandle>) -> Self {
        let cache = Cache::new();
        let user_ttl = Duration::from_secs(config.cache.ttl_user_data_secs);

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit.rules));
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breakers.clone(),
            cache.clone(),
        ));
        let rotation = Arc::new(ApiRotation::new(cache.clone(), config.api_rotation.clone()));
        let events = Arc::new(EventBus::new(config.event_bus.clone()));
        let tokens = Arc::new(TokenService::new(&config.security));

        let user_repo = Arc::new(InMemoryUserRepository::new());
        let subscription_repo = Arc::new(InMemorySubscriptionRepository::new());
        let users = Arc::new(UserService::new(
            user_repo.clone(),
            subscription_repo.clone(),
            tokens.clone(),
            events.clone(),
            cache.clone(),
            config.security.password.clone(),
            user_ttl,
        ));
        let subscriptions = Arc::new(SubscriptionService::new(
            subscription_repo,
            user_repo,
            events.clone(),
            cache.clone(),
            user_ttl,
        ));

        let jobs = Arc::new(JobScheduler::new(config.jobs.clone()));
        register_builtin_tasks(
            &jobs,
            TaskContext {
                cache: cache.clone(),
                rate_limiter: rate_limiter.clone(),
                rotation: rotation.clone(),
                users: users.clone(),
                subscriptions: subscriptions.clone(),
                events: events.clone(),
            },
        );

        Self {
            inner: Arc::new(AppContext {
                config: ArcSwap::from_pointee(config),
                cache,
                rate_limiter,
                breakers,
                rotation,
                events,
                tokens,
                users,
                subscriptions,
                jobs,
                metrics,
                started_at: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.inner.config.load_full()
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Swap in a reloaded configuration and apply its live parts.
    pub fn apply_config(&self, config: AppConfig) {
        self.inner.rate_limiter.replace_rules(&config.rate_limit.rules);
        tracing::info!(
            rate_limit_rules = config.rate_limit.rules.len(),
            rate_limiting = config.rate_limit.enabled,
            admin_enabled = config.admin.enabled,
            "Configuration reloaded"
        );
        self.inner.config.store(Arc::new(config));
    }

    /// Start the cache sweeper, beat loop and worker pool.
    pub fn spawn_background(&self, shutdown: &Shutdown) {
        let config = self.config();
        spawn_sweeper(
            self.inner.cache.clone(),
            Duration::from_secs(config.cache.purge_interval_secs.max(1)),
            shutdown,
        );
        if !config.jobs.enabled {
            tracing::info!("Background jobs disabled");
            return;
        }
        tokio::spawn(self.inner.jobs.clone().run(shutdown.subscribe()));
        tokio::spawn(WorkerPool::new(self.inner.jobs.clone()).run(shutdown.subscribe()));
    }
}
