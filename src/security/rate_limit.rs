//! Multi-algorithm rate limiter with tier-aware limits.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use crate::observability::metrics;

/// Counting strategy of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
    LeakyBucket,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::LeakyBucket => "leaky_bucket",
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::SlidingWindow
    }
}

/// What the identifier of a rule represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    #[default]
    User,
    Ip,
    ApiKey,
    Endpoint,
    Feature,
}

/// A named limit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateLimitRule {
    pub name: String,
    pub requests: u32,
    pub window_secs: u64,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub burst_allowance: u32,
    #[serde(default = "default_penalty")]
    pub penalty_multiplier: f64,
    /// Identifiers (user ids, IPs) that are never limited.
    #[serde(default)]
    pub exceptions: Vec<String>,
}

fn default_penalty() -> f64 {
    1.0
}

impl RateLimitRule {
    pub fn new(
        name: impl Into<String>,
        requests: u32,
        window_secs: u64,
        algorithm: Algorithm,
        scope: Scope,
    ) -> Self {
        Self {
            name: name.into(),
            requests,
            window_secs,
            algorithm,
            scope,
            burst_allowance: 0,
            penalty_multiplier: 1.0,
            exceptions: Vec::new(),
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst_allowance = burst;
        self
    }

    pub fn with_penalty(mut self, multiplier: f64) -> Self {
        self.penalty_multiplier = multiplier;
        self
    }
}

/// The built-in rule set.
pub fn default_rules() -> Vec<RateLimitRule> {
    use Algorithm::*;
    vec![
        RateLimitRule::new("api_general", 1000, 3600, SlidingWindow, Scope::User).with_burst(50),
        RateLimitRule::new("auth_login", 5, 300, FixedWindow, Scope::Ip).with_penalty(2.0),
        RateLimitRule::new("auth_register", 3, 3600, FixedWindow, Scope::Ip),
        RateLimitRule::new("password_reset", 3, 3600, FixedWindow, Scope::User),
        RateLimitRule::new("plant_identification", 5, 3600, TokenBucket, Scope::User)
            .with_burst(2),
        RateLimitRule::new("ai_chat", 10, 3600, SlidingWindow, Scope::User).with_burst(3),
        RateLimitRule::new("file_upload", 20, 3600, LeakyBucket, Scope::User).with_burst(5),
        RateLimitRule::new("plant_creation", 10, 3600, SlidingWindow, Scope::User),
        RateLimitRule::new("community_post", 5, 3600, SlidingWindow, Scope::User),
        RateLimitRule::new("community_comment", 20, 3600, SlidingWindow, Scope::User),
        RateLimitRule::new("ip_global", 10000, 3600, SlidingWindow, Scope::Ip).with_penalty(5.0),
    ]
}

/// Caller tier used to scale limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    #[default]
    Free,
    PremiumMonthly,
    PremiumYearly,
    Expert,
    Admin,
    Service,
}

impl UserTier {
    pub fn multiplier(&self) -> f64 {
        match self {
            UserTier::Free => 1.0,
            UserTier::PremiumMonthly | UserTier::PremiumYearly => 5.0,
            UserTier::Expert => 3.0,
            UserTier::Admin => 100.0,
            UserTier::Service => 1000.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Free => "free",
            UserTier::PremiumMonthly => "premium_monthly",
            UserTier::PremiumYearly => "premium_yearly",
            UserTier::Expert => "expert",
            UserTier::Admin => "admin",
            UserTier::Service => "service",
        }
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(UserTier::Free),
            "premium" | "premium_monthly" => Ok(UserTier::PremiumMonthly),
            "premium_yearly" => Ok(UserTier::PremiumYearly),
            "expert" => Ok(UserTier::Expert),
            "admin" => Ok(UserTier::Admin),
            "service" => Ok(UserTier::Service),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Features with per-tier base limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PlantIdentification,
    AiChat,
    FileUpload,
    CareReminders,
    AnalyticsQueries,
}

impl Feature {
    /// Base `(requests, window_secs)` for a tier, before the tier multiplier.
    ///
    /// Admin and service tiers have no entry and fall back to the rule.
    pub fn limit(&self, tier: UserTier) -> Option<(u32, u64)> {
        let (free, premium, expert, window) = match self {
            Feature::PlantIdentification => (5, 50, 100, 3600),
            Feature::AiChat => (10, 200, 500, 3600),
            Feature::FileUpload => (20, 500, 1000, 3600),
            Feature::CareReminders => (100, 1000, 2000, 86400),
            Feature::AnalyticsQueries => (0, 50, 200, 3600),
        };
        match tier {
            UserTier::Free => Some((free, window)),
            UserTier::PremiumMonthly | UserTier::PremiumYearly => Some((premium, window)),
            UserTier::Expert => Some((expert, window)),
            UserTier::Admin | UserTier::Service => None,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub current_usage: u64,
    pub limit: u64,
    /// Unix seconds at which the caller regains capacity.
    pub reset_time: u64,
    pub retry_after: Option<u64>,
    pub window_secs: u64,
    pub algorithm: Algorithm,
}

impl RateLimitDecision {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            current_usage: 0,
            limit: 0,
            reset_time: 0,
            retry_after: None,
            window_secs: 0,
            algorithm: Algorithm::default(),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current_usage)
    }

    /// Response headers describing this decision.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit".to_string(), self.limit.to_string()),
            ("X-RateLimit-Remaining".to_string(), self.remaining().to_string()),
            ("X-RateLimit-Reset".to_string(), self.reset_time.to_string()),
            ("X-RateLimit-Window".to_string(), self.window_secs.to_string()),
            (
                "X-RateLimit-Algorithm".to_string(),
                self.algorithm.as_str().to_string(),
            ),
        ];
        if let Some(retry) = self.retry_after.filter(|r| *r > 0) {
            headers.push(("Retry-After".to_string(), retry.to_string()));
        }
        headers
    }
}

/// Per-(rule, identifier) counter state.
#[derive(Debug)]
enum Counter {
    Sliding(VecDeque<f64>),
    Fixed { window_start: u64, count: u64 },
    Bucket { tokens: f64, last_refill: f64 },
    Leaky { level: f64, last_leak: f64 },
}

#[derive(Debug)]
struct Slot {
    counter: Counter,
    last_seen: f64,
    window_secs: u64,
}

/// In-memory rate limiter.
///
/// Rules can be swapped at runtime; counter state survives a rule swap and
/// is dropped by [`RateLimiter::purge_idle`] once idle for a window.
pub struct RateLimiter {
    rules: RwLock<HashMap<String, RateLimitRule>>,
    slots: DashMap<(String, String), Slot>,
}

impl RateLimiter {
    /// Built-in rules with `overrides` merged over them by name.
    pub fn new(overrides: &[RateLimitRule]) -> Self {
        let limiter = Self {
            rules: RwLock::new(HashMap::new()),
            slots: DashMap::new(),
        };
        limiter.replace_rules(overrides);
        limiter
    }

    /// Rebuild the rule set from the defaults plus `overrides`.
    pub fn replace_rules(&self, overrides: &[RateLimitRule]) {
        let mut rules: HashMap<String, RateLimitRule> = default_rules()
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        for rule in overrides {
            rules.insert(rule.name.clone(), rule.clone());
        }
        *self.rules.write().expect("rate limit rules lock poisoned") = rules;
    }

    pub fn add_rule(&self, rule: RateLimitRule) {
        tracing::info!(rule = %rule.name, requests = rule.requests, window = rule.window_secs, "Rate limit rule added");
        self.rules
            .write()
            .expect("rate limit rules lock poisoned")
            .insert(rule.name.clone(), rule);
    }

    pub fn remove_rule(&self, name: &str) -> bool {
        let removed = self
            .rules
            .write()
            .expect("rate limit rules lock poisoned")
            .remove(name)
            .is_some();
        if removed {
            self.slots.retain(|(rule, _), _| rule != name);
            tracing::info!(rule = %name, "Rate limit rule removed");
        }
        removed
    }

    pub fn rule(&self, name: &str) -> Option<RateLimitRule> {
        self.rules
            .read()
            .expect("rate limit rules lock poisoned")
            .get(name)
            .cloned()
    }

    /// All rules, sorted by name.
    pub fn rules(&self) -> Vec<RateLimitRule> {
        let mut rules: Vec<_> = self
            .rules
            .read()
            .expect("rate limit rules lock poisoned")
            .values()
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    /// Check and, when allowed, record one request.
    pub fn check(
        &self,
        rule_name: &str,
        identifier: &str,
        tier: UserTier,
        feature: Option<Feature>,
        custom_limit: Option<u32>,
    ) -> RateLimitDecision {
        self.check_at(rule_name, identifier, tier, feature, custom_limit, now_secs())
    }

    pub fn check_at(
        &self,
        rule_name: &str,
        identifier: &str,
        tier: UserTier,
        feature: Option<Feature>,
        custom_limit: Option<u32>,
        now: f64,
    ) -> RateLimitDecision {
        let Some(rule) = self.rule(rule_name) else {
            tracing::warn!(rule = %rule_name, "Rate limit rule not found");
            return RateLimitDecision::unlimited();
        };

        let limit = effective_limit(&rule, tier, feature, custom_limit);

        if rule.exceptions.iter().any(|e| e == identifier) {
            return RateLimitDecision {
                allowed: true,
                current_usage: 0,
                limit,
                reset_time: now as u64 + rule.window_secs,
                retry_after: None,
                window_secs: rule.window_secs,
                algorithm: rule.algorithm,
            };
        }

        let decision = self.evaluate(&rule, identifier, limit, now, true);

        if !decision.allowed {
            metrics::record_rate_limited(&rule.name);
            tracing::warn!(
                rule = %rule.name,
                identifier = %identifier,
                tier = %tier,
                current_usage = decision.current_usage,
                limit = decision.limit,
                "Rate limit exceeded"
            );
            if decision.current_usage > decision.limit * 2 {
                crate::security_event!(
                    "rate_limit_abuse",
                    rule = %rule.name,
                    identifier = %identifier,
                    usage = decision.current_usage,
                    limit = decision.limit,
                    "Possible rate limit abuse"
                );
            }
        }

        decision
    }

    /// Current standing without recording a request.
    pub fn status(&self, rule_name: &str, identifier: &str, tier: UserTier) -> Option<RateLimitDecision> {
        let rule = self.rule(rule_name)?;
        let limit = effective_limit(&rule, tier, None, None);
        Some(self.evaluate(&rule, identifier, limit, now_secs(), false))
    }

    /// Forget all state for an identifier under a rule.
    pub fn reset(&self, rule_name: &str, identifier: &str) -> bool {
        let removed = self
            .slots
            .remove(&(rule_name.to_string(), identifier.to_string()))
            .is_some();
        if removed {
            tracing::info!(rule = %rule_name, identifier = %identifier, "Rate limit reset");
        }
        removed
    }

    /// Drop counters untouched for longer than their window plus a minute.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(now_secs())
    }

    pub fn purge_idle_at(&self, now: f64) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now - slot.last_seen <= (slot.window_secs + 60) as f64);
        before.saturating_sub(self.slots.len())
    }

    /// Number of tracked (rule, identifier) pairs.
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }

    fn evaluate(
        &self,
        rule: &RateLimitRule,
        identifier: &str,
        limit: u64,
        now: f64,
        record: bool,
    ) -> RateLimitDecision {
        let window = rule.window_secs.max(1);
        let window_f = window as f64;
        let key = (rule.name.clone(), identifier.to_string());

        let mut slot = self.slots.entry(key).or_insert_with(|| Slot {
            counter: Counter::new(rule.algorithm, limit, now),
            last_seen: now,
            window_secs: window,
        });
        slot.window_secs = window;
        if !counter_matches(&slot.counter, rule.algorithm) {
            slot.counter = Counter::new(rule.algorithm, limit, now);
        }
        if record {
            slot.last_seen = now;
        }

        let mut decision = RateLimitDecision {
            allowed: true,
            current_usage: 0,
            limit,
            reset_time: 0,
            retry_after: None,
            window_secs: rule.window_secs,
            algorithm: rule.algorithm,
        };

        match &mut slot.counter {
            Counter::Sliding(stamps) => {
                let start = now - window_f;
                while stamps.front().is_some_and(|t| *t <= start) {
                    stamps.pop_front();
                }
                let usage = stamps.len() as u64;
                decision.reset_time = (now + window_f) as u64;
                if usage >= limit {
                    decision.allowed = false;
                    decision.current_usage = usage;
                    decision.retry_after = Some(window);
                } else if record {
                    stamps.push_back(now);
                    decision.current_usage = usage + 1;
                } else {
                    decision.current_usage = usage;
                }
            }
            Counter::Fixed { window_start, count } => {
                let current = now as u64;
                let start = (current / window) * window;
                if *window_start != start {
                    *window_start = start;
                    *count = 0;
                }
                let reset = start + window;
                decision.reset_time = reset;
                if *count >= limit {
                    decision.allowed = false;
                    decision.current_usage = *count;
                    decision.retry_after = Some(reset - current);
                } else if record {
                    *count += 1;
                    decision.current_usage = *count;
                } else {
                    decision.current_usage = *count;
                }
            }
            Counter::Bucket { tokens, last_refill } => {
                let capacity = limit as f64;
                let refill_rate = capacity / window_f;
                let elapsed = (now - *last_refill).max(0.0);
                let mut available = (*tokens + elapsed * refill_rate).min(capacity);
                decision.reset_time = (now + (capacity - available) / refill_rate) as u64;
                if available < 1.0 {
                    decision.allowed = false;
                    decision.retry_after = Some((1.0 / refill_rate).ceil() as u64);
                } else if record {
                    available -= 1.0;
                }
                if record {
                    *tokens = available;
                    *last_refill = now;
                }
                decision.current_usage = (capacity - available).max(0.0) as u64;
            }
            Counter::Leaky { level, last_leak } => {
                let leak_rate = limit as f64 / window_f;
                let elapsed = (now - *last_leak).max(0.0);
                let mut current = (*level - elapsed * leak_rate).max(0.0);
                decision.reset_time = (now + current / leak_rate) as u64;
                if current >= limit as f64 {
                    decision.allowed = false;
                    decision.retry_after = Some((1.0 / leak_rate).ceil() as u64);
                } else if record {
                    current += 1.0;
                }
                if record {
                    *level = current;
                    *last_leak = now;
                }
                decision.current_usage = current as u64;
            }
        }

        decision
    }
}

impl Counter {
    fn new(algorithm: Algorithm, limit: u64, now: f64) -> Self {
        match algorithm {
            Algorithm::SlidingWindow => Counter::Sliding(VecDeque::new()),
            Algorithm::FixedWindow => Counter::Fixed {
                window_start: 0,
                count: 0,
            },
            Algorithm::TokenBucket => Counter::Bucket {
                tokens: limit as f64,
                last_refill: now,
            },
            Algorithm::LeakyBucket => Counter::Leaky {
                level: 0.0,
                last_leak: now,
            },
        }
    }
}

fn counter_matches(counter: &Counter, algorithm: Algorithm) -> bool {
    matches!(
        (counter, algorithm),
        (Counter::Sliding(_), Algorithm::SlidingWindow)
            | (Counter::Fixed { .. }, Algorithm::FixedWindow)
            | (Counter::Bucket { .. }, Algorithm::TokenBucket)
            | (Counter::Leaky { .. }, Algorithm::LeakyBucket)
    )
}

/// Limit after custom override, feature table and tier multiplier. Never below 1.
pub fn effective_limit(
    rule: &RateLimitRule,
    tier: UserTier,
    feature: Option<Feature>,
    custom_limit: Option<u32>,
) -> u64 {
    if let Some(custom) = custom_limit.filter(|c| *c > 0) {
        return u64::from(custom);
    }

    let base = feature
        .and_then(|f| f.limit(tier))
        .map(|(requests, _)| requests)
        .unwrap_or(rule.requests);

    ((f64::from(base) * tier.multiplier()) as u64).max(1)
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
