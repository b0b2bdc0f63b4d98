//! Subscription operations and usage metering.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{keys, Cache};
use crate::error::{AppError, AppResult};
use crate::events::{DomainEvent, EventBus, EventPriority, EventType};
use crate::users::repository::{SubscriptionRepository, UserRepository};
use crate::users::subscription::{
    PaymentMethod, Subscription, SubscriptionStatus, SubscriptionTier, UsageType,
};
use crate::users::user::{User, UserRole};

#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub usage_type: UsageType,
    pub used: u32,
    /// `None` means unlimited.
    pub remaining: Option<u32>,
}

pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    users: Arc<dyn UserRepository>,
    events: Arc<EventBus>,
    cache: Cache,
    snapshot_ttl: Duration,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        users: Arc<dyn UserRepository>,
        events: Arc<EventBus>,
        cache: Cache,
        snapshot_ttl: Duration,
    ) -> Self {
        Self {
            subscriptions,
            users,
            events,
            cache,
            snapshot_ttl,
        }
    }

    pub async fn get(&self, user_id: &str) -> AppResult<Subscription> {
        let key = keys::subscription(user_id);
        if let Some(sub) = self.cache.get_json::<Subscription>(&key) {
            return Ok(sub);
        }
        let sub = self
            .subscriptions
            .get_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Subscription", user_id))?;
        self.cache_snapshot(&sub);
        Ok(sub)
    }

    fn cache_snapshot(&self, sub: &Subscription) {
        if let Err(e) = self
            .cache
            .set_json(keys::subscription(&sub.user_id), sub, Some(self.snapshot_ttl))
        {
            tracing::warn!(error = %e, "Failed to cache subscription");
        }
    }

    /// Persist and mirror tier and premium flag onto the user.
    async fn save(&self, sub: &Subscription) -> AppResult<()> {
        self.subscriptions.save(sub).await?;
        self.cache_snapshot(sub);

        if let Some(mut user) = self.users.get(&sub.user_id).await? {
            if sync_user(&mut user, sub) {
                self.users.update(&user).await?;
                self.cache.delete(&keys::user_profile(&user.id));
            }
        }
        Ok(())
    }

    async fn load_for_change(&self, user_id: &str) -> AppResult<Subscription> {
        self.subscriptions
            .get_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Subscription", user_id))
    }

    async fn require_active_user(&self, user_id: &str) -> AppResult<User> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))?;
        if !user.is_active() {
            return Err(AppError::BusinessRule(
                "Cannot upgrade inactive user to premium".into(),
            ));
        }
        Ok(user)
    }

    pub async fn start_trial(
        &self,
        user_id: &str,
        tier: SubscriptionTier,
        days: i64,
    ) -> AppResult<Subscription> {
        self.require_active_user(user_id).await?;
        let mut sub = self.load_for_change(user_id).await?;
        if !tier.is_paid() {
            return Err(AppError::BusinessRule("Cannot start trial for free tier".into()));
        }
        if sub.is_trial {
            return Err(AppError::BusinessRule("Trial already started".into()));
        }
        let previous = sub.tier;
        if previous != tier {
            sub.upgrade_tier(tier, tier.monthly_price())?;
        }
        sub.start_trial(days)?;
        self.save(&sub).await?;
        self.publish_change(&sub, previous).await;
        Ok(sub)
    }

    pub async fn upgrade(&self, user_id: &str, tier: SubscriptionTier) -> AppResult<Subscription> {
        self.require_active_user(user_id).await?;
        let mut sub = self.load_for_change(user_id).await?;
        let previous = sub.tier;
        if tier.is_paid() {
            sub.upgrade_tier(tier, tier.monthly_price())?;
        } else {
            sub.downgrade_tier(tier, 0.0)?;
        }
        self.save(&sub).await?;
        self.publish_change(&sub, previous).await;
        if tier.is_paid() {
            self.events
                .emit(
                    EventType::SubscriptionActivated,
                    user_id,
                    json!({ "tier": tier, "subscription_id": sub.subscription_id }),
                )
                .await;
        }
        Ok(sub)
    }

    pub async fn cancel(
        &self,
        user_id: &str,
        reason: Option<String>,
        immediate: bool,
    ) -> AppResult<Subscription> {
        let mut sub = self.load_for_change(user_id).await?;
        let previous = sub.tier;
        sub.cancel(reason, immediate)?;
        self.save(&sub).await?;
        self.publish_change(&sub, previous).await;
        Ok(sub)
    }

    pub async fn reactivate(&self, user_id: &str) -> AppResult<Subscription> {
        let mut sub = self.load_for_change(user_id).await?;
        let previous = sub.tier;
        sub.reactivate()?;
        self.save(&sub).await?;
        self.publish_change(&sub, previous).await;
        Ok(sub)
    }

    pub async fn record_payment(
        &self,
        user_id: &str,
        amount: f64,
        method: PaymentMethod,
    ) -> AppResult<Subscription> {
        let mut sub = self.load_for_change(user_id).await?;
        sub.record_payment(amount, method);
        self.save(&sub).await?;
        Ok(sub)
    }

    pub async fn record_payment_failure(&self, user_id: &str) -> AppResult<Subscription> {
        let mut sub = self.load_for_change(user_id).await?;
        let previous = sub.tier;
        sub.record_payment_failure();
        self.save(&sub).await?;
        self.events
            .publish(
                DomainEvent::for_user(
                    EventType::PaymentFailed,
                    user_id,
                    json!({
                        "subscription_id": sub.subscription_id,
                        "failure_count": sub.failed_payment_count,
                        "status": sub.status,
                    }),
                ),
                EventPriority::Critical,
                None,
            )
            .await;
        self.publish_change(&sub, previous).await;
        Ok(sub)
    }

    /// Count `amount` units of usage, refusing once the period limit is reached.
    pub async fn track_usage(
        &self,
        user_id: &str,
        usage: UsageType,
        amount: u32,
    ) -> AppResult<UsageSnapshot> {
        let mut sub = self.load_for_change(user_id).await?;
        if let Some(limit) = sub.limits.usage_limit(usage) {
            let current = sub.usage(usage);
            if current.saturating_add(amount) > limit {
                tracing::info!(user_id, usage_type = usage.as_str(), current, limit, "Usage limit reached");
                return Err(AppError::UsageLimitExceeded {
                    usage_type: usage.as_str().to_string(),
                    current: u64::from(current),
                    limit: u64::from(limit),
                });
            }
        }
        sub.track_usage(usage, amount);
        self.subscriptions.save(&sub).await?;
        self.cache_snapshot(&sub);
        Ok(UsageSnapshot {
            usage_type: usage,
            used: sub.usage(usage),
            remaining: sub.usage_remaining(usage),
        })
    }

    /// Apply time-based transitions to every subscription. Returns how many changed.
    pub async fn expire_due(&self) -> AppResult<usize> {
        let mut changed = 0;
        for user_id in self.subscriptions.user_ids().await? {
            let Some(mut sub) = self.subscriptions.get_by_user(&user_id).await? else {
                continue;
            };
            let previous = sub.tier;
            if sub.check_and_update_status() {
                self.save(&sub).await?;
                self.publish_change(&sub, previous).await;
                changed += 1;
            }
        }
        if changed > 0 {
            tracing::info!(changed, "Subscription statuses updated");
        }
        Ok(changed)
    }

    async fn publish_change(&self, sub: &Subscription, previous: SubscriptionTier) {
        if previous == sub.tier {
            return;
        }
        self.events
            .emit(
                EventType::UserSubscriptionChanged,
                &sub.user_id,
                json!({ "from": previous, "to": sub.tier, "status": sub.status }),
            )
            .await;
    }
}

/// Returns whether the user changed.
fn sync_user(user: &mut User, sub: &Subscription) -> bool {
    let premium = sub.tier.is_paid() && sub.status != SubscriptionStatus::Expired;
    let tier = if premium { sub.tier.as_str() } else { "free" };
    if user.is_premium == premium && user.subscription_tier == tier {
        return false;
    }
    if premium {
        user.is_premium = true;
        user.subscription_tier = tier.to_string();
        if user.role == UserRole::User {
            user.role = UserRole::Premium;
        }
    } else {
        user.is_premium = false;
        user.subscription_tier = "free".to_string();
        if user.role == UserRole::Premium {
            user.role = UserRole::User;
        }
    }
    user.updated_at = chrono::Utc::now();
    true
}
