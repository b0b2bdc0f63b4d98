//! Shared cache subsystem.
//!
//! # Data Flow
//! ```text
//! Writers:
//!     API rotation (usage counters, provider stats)
//!     Circuit breakers (open-state mirror)
//!     Users (profile/subscription snapshots)
//!         ↓
//! store.rs (DashMap, per-key TTL)
//!         ↓
//! Sweeper task purges expired keys every `purge_interval_secs`
//! ```

pub mod store;

pub use store::{glob_match, Cache, CacheStats};

use std::time::Duration;

use crate::lifecycle::Shutdown;

/// Well-known key layouts.
pub mod keys {
    pub fn api_usage(user_id: &str, provider: &str) -> String {
        format!("api_usage:{user_id}:{provider}")
    }

    pub fn api_stats(provider: &str, user_id: &str) -> String {
        format!("api_stats:{provider}:{user_id}")
    }

    /// UTC date of the last daily usage reset.
    pub fn api_usage_reset() -> String {
        "api_rotation:last_reset".to_string()
    }

    /// Provider-wide health, aggregated across users.
    pub fn api_health(provider: &str) -> String {
        format!("api_health:{provider}")
    }

    pub fn circuit_breaker(name: &str) -> String {
        format!("circuit_breaker:{name}")
    }

    pub fn user_profile(user_id: &str) -> String {
        format!("user_profile:{user_id}")
    }

    pub fn subscription(user_id: &str) -> String {
        format!("subscription:{user_id}")
    }
}

/// Periodically purge expired entries until shutdown.
pub fn spawn_sweeper(cache: Cache, interval: Duration, shutdown: &Shutdown) {
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = cache.len(), "Purged expired cache entries");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Cache sweeper stopping");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sweeper_purges_and_stops() {
        let cache = Cache::new();
        let shutdown = Shutdown::new();
        cache.set("a", json!(1), Some(Duration::from_millis(5)));
        cache.set("b", json!(1), None);

        spawn_sweeper(cache.clone(), Duration::from_millis(20), &shutdown);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.len(), 1);

        shutdown.trigger();
    }

    #[test]
    fn test_key_layouts() {
        assert_eq!(keys::api_usage("u1", "plantnet"), "api_usage:u1:plantnet");
        assert_eq!(keys::api_stats("plantnet", "u1"), "api_stats:plantnet:u1");
        assert_eq!(keys::circuit_breaker("weather_api"), "circuit_breaker:weather_api");
    }
}
