//! Provider selection, fallback and usage tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::cache::{keys, Cache};
use crate::config::ApiRotationConfig;
use crate::integrations::providers::{ApiLimits, ApiProvider, ApiTier, ServiceType};
use crate::observability::metrics;

/// Weight of the newest sample in the moving averages.
const EMA_ALPHA: f64 = 0.1;

const MAX_FALLBACKS: usize = 3;

/// Result of one call to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallOutcome {
    pub success: bool,
    /// Seconds.
    pub response_time: f64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Rolling statistics for a provider, per user or provider-wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageStats {
    pub provider: ApiProvider,
    pub daily_usage: u64,
    pub monthly_usage: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub is_healthy: bool,
}

impl ApiUsageStats {
    pub fn new(provider: ApiProvider) -> Self {
        Self {
            provider,
            daily_usage: 0,
            monthly_usage: 0,
            success_rate: 1.0,
            avg_response_time: 0.0,
            last_error: None,
            last_success: None,
            consecutive_failures: 0,
            is_healthy: true,
        }
    }

    fn apply(&mut self, outcome: &ApiCallOutcome, unhealthy_after: u32, now: DateTime<Utc>) {
        if outcome.success {
            self.consecutive_failures = 0;
            self.last_success = Some(now);
            self.is_healthy = true;
            self.success_rate = ema(self.success_rate, 1.0);
            self.avg_response_time = ema(self.avg_response_time, outcome.response_time);
        } else {
            self.consecutive_failures += 1;
            self.last_error = Some(
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            );
            if self.consecutive_failures >= unhealthy_after {
                self.is_healthy = false;
            }
            self.success_rate = ema(self.success_rate, 0.0);
        }
    }
}

fn ema(previous: f64, sample: f64) -> f64 {
    (1.0 - EMA_ALPHA) * previous + EMA_ALPHA * sample
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub daily_usage: u64,
    pub daily_limit_free: u64,
    pub daily_limit_premium: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub providers: BTreeMap<String, ProviderUsage>,
}

/// Chooses among interchangeable providers for a user.
///
/// All state lives in the shared cache, so clones of the cache seen by
/// other components (jobs, admin) observe the same counters.
pub struct ApiRotation {
    cache: Cache,
    config: ApiRotationConfig,
}

impl ApiRotation {
    pub fn new(cache: Cache, config: ApiRotationConfig) -> Self {
        Self { cache, config }
    }

    /// Best eligible provider, or `None` when every one is excluded or over its limit.
    pub fn best_provider(
        &self,
        service: ServiceType,
        user_id: &str,
        tier: ApiTier,
        exclude: &[ApiProvider],
    ) -> Option<ApiProvider> {
        let mut candidates: Vec<(ApiLimits, ApiUsageStats)> = service
            .providers()
            .iter()
            .filter(|p| !exclude.contains(p))
            .filter(|p| self.is_within_limits(**p, user_id, tier))
            .map(|p| (p.limits(), self.provider_stats(*p, user_id)))
            .collect();

        if candidates.is_empty() {
            tracing::warn!(
                service = service.as_str(),
                user_id = %user_id,
                tier = ?tier,
                "No providers within limits"
            );
            return None;
        }

        candidates.sort_by(|(la, a), (lb, b)| {
            la.priority
                .cmp(&lb.priority)
                .then((!a.is_healthy).cmp(&!b.is_healthy))
                .then(a.consecutive_failures.cmp(&b.consecutive_failures))
                .then(b.success_rate.total_cmp(&a.success_rate))
                .then(a.avg_response_time.total_cmp(&b.avg_response_time))
        });

        let best = candidates[0].1.provider;
        tracing::debug!(service = service.as_str(), provider = %best, user_id = %user_id, "Selected API provider");
        Some(best)
    }

    /// Up to three providers to try after `primary`, in preference order.
    pub fn fallback_providers(
        &self,
        service: ServiceType,
        user_id: &str,
        tier: ApiTier,
        primary: Option<ApiProvider>,
    ) -> Vec<ApiProvider> {
        let mut exclude: Vec<ApiProvider> = primary.into_iter().collect();
        let mut fallbacks = Vec::new();
        while fallbacks.len() < MAX_FALLBACKS {
            match self.best_provider(service, user_id, tier, &exclude) {
                Some(provider) => {
                    fallbacks.push(provider);
                    exclude.push(provider);
                }
                None => break,
            }
        }
        fallbacks
    }

    /// Count the call against the user's daily usage and fold it into the stats.
    pub fn record_usage(&self, provider: ApiProvider, user_id: &str, outcome: &ApiCallOutcome) {
        let usage_ttl = Duration::from_secs(self.config.usage_ttl_secs);
        let stats_ttl = Duration::from_secs(self.config.stats_ttl_secs);
        let now = Utc::now();

        let daily = self
            .cache
            .increment(&keys::api_usage(user_id, provider.as_str()), 1, Some(usage_ttl));

        let mut stats = self.provider_stats(provider, user_id);
        stats.daily_usage = daily.max(0) as u64;
        stats.monthly_usage += 1;
        stats.apply(outcome, self.config.unhealthy_after_failures, now);
        self.save(&keys::api_stats(provider.as_str(), user_id), &stats, stats_ttl);

        let health_key = keys::api_health(provider.as_str());
        let mut overall = self
            .cache
            .get_json::<ApiUsageStats>(&health_key)
            .unwrap_or_else(|| ApiUsageStats::new(provider));
        overall.apply(outcome, self.config.unhealthy_after_failures, now);
        self.save(&health_key, &overall, stats_ttl);

        metrics::record_api_call(provider.as_str(), outcome.success);
        tracing::info!(
            api = %provider,
            user_id = %user_id,
            success = outcome.success,
            status_code = ?outcome.status_code,
            response_time = outcome.response_time,
            daily_usage = stats.daily_usage,
            "External API call"
        );
    }

    /// Provider-wide health. No data counts as healthy.
    pub fn check_health(&self, provider: ApiProvider) -> bool {
        self.check_health_at(provider, Utc::now())
    }

    pub fn check_health_at(&self, provider: ApiProvider, now: DateTime<Utc>) -> bool {
        let Some(stats) = self
            .cache
            .get_json::<ApiUsageStats>(&keys::api_health(provider.as_str()))
        else {
            return true;
        };
        let recent_success = stats
            .last_success
            .map_or(true, |at| (now - at).num_seconds() < 3600);
        stats.success_rate >= 0.5 && stats.consecutive_failures < 5 && recent_success
    }

    pub fn usage_report(&self, user_id: &str, service: Option<ServiceType>) -> UsageReport {
        let providers: Vec<ApiProvider> = match service {
            Some(service) => service.providers().to_vec(),
            None => ServiceType::ALL
                .iter()
                .flat_map(|s| s.providers().iter().copied())
                .collect(),
        };

        let providers = providers
            .into_iter()
            .map(|provider| {
                let limits = provider.limits();
                let stats = self.provider_stats(provider, user_id);
                (
                    provider.as_str().to_string(),
                    ProviderUsage {
                        daily_usage: self.daily_usage(provider, user_id),
                        daily_limit_free: limits.free_daily_limit,
                        daily_limit_premium: limits.premium_daily_limit,
                        success_rate: stats.success_rate,
                        avg_response_time: stats.avg_response_time,
                        is_healthy: stats.is_healthy,
                        consecutive_failures: stats.consecutive_failures,
                        last_success: stats.last_success,
                    },
                )
            })
            .collect();

        UsageReport {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            providers,
        }
    }

    /// Clear every user's daily counters. Returns how many were cleared.
    pub fn reset_daily_usage(&self) -> usize {
        let cleared = self.cache.delete_pattern("api_usage:*");
        tracing::info!(cleared, "Daily API usage counters reset");
        cleared
    }

    /// Clear the daily counters if the UTC day changed since the last reset.
    /// `None` when they were already reset today.
    pub fn rotate_daily_usage(&self, now: DateTime<Utc>) -> Option<usize> {
        let today = now.date_naive().to_string();
        let key = keys::api_usage_reset();
        let last = self.cache.get(&key);
        if last.as_ref().and_then(|v| v.as_str()) == Some(today.as_str()) {
            tracing::debug!(date = %today, "Daily API usage already reset");
            return None;
        }
        self.cache.set(key, serde_json::Value::String(today), None);
        Some(self.reset_daily_usage())
    }

    pub fn daily_usage(&self, provider: ApiProvider, user_id: &str) -> u64 {
        self.cache
            .get(&keys::api_usage(user_id, provider.as_str()))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    pub fn provider_stats(&self, provider: ApiProvider, user_id: &str) -> ApiUsageStats {
        self.cache
            .get_json(&keys::api_stats(provider.as_str(), user_id))
            .unwrap_or_else(|| ApiUsageStats::new(provider))
    }

    fn is_within_limits(&self, provider: ApiProvider, user_id: &str, tier: ApiTier) -> bool {
        self.daily_usage(provider, user_id) < provider.limits().daily_limit(tier)
    }

    fn save(&self, key: &str, stats: &ApiUsageStats, ttl: Duration) {
        if let Err(e) = self.cache.set_json(key.to_string(), stats, Some(ttl)) {
            tracing::error!(key = %key, error = %e, "Failed to store API stats");
        }
    }
}
