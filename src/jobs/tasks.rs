//! Periodic tasks backed by in-crate services.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::Cache;
use crate::events::{DomainEvent, EventBus, EventPriority, EventType};
use crate::integrations::ApiRotation;
use crate::jobs::scheduler::{JobScheduler, Task};
use crate::security::RateLimiter;
use crate::users::{SubscriptionService, UserService};

/// Clears per-user daily API usage counters on the first run of each UTC day.
pub struct RotateApiUsage {
    pub rotation: Arc<ApiRotation>,
}

#[async_trait]
impl Task for RotateApiUsage {
    fn name(&self) -> &str {
        "rotate_api_usage"
    }

    async fn run(&self) -> Result<Value, String> {
        let cleared = self.rotation.rotate_daily_usage(Utc::now());
        Ok(json!({
            "rotated": cleared.is_some(),
            "cleared_counters": cleared.unwrap_or(0),
        }))
    }
}

/// Drops expired cache entries and idle rate-limit state.
pub struct CleanupOldData {
    pub cache: Cache,
    pub rate_limiter: Arc<RateLimiter>,
}

#[async_trait]
impl Task for CleanupOldData {
    fn name(&self) -> &str {
        "cleanup_old_data"
    }

    async fn run(&self) -> Result<Value, String> {
        let cache_entries = self.cache.purge_expired();
        let rate_limit_slots = self.rate_limiter.purge_idle();
        tracing::info!(cache_entries, rate_limit_slots, "Old data cleaned up");
        Ok(json!({
            "cache_entries_purged": cache_entries,
            "rate_limit_slots_purged": rate_limit_slots,
        }))
    }
}

pub struct ExpireSubscriptions {
    pub subscriptions: Arc<SubscriptionService>,
}

#[async_trait]
impl Task for ExpireSubscriptions {
    fn name(&self) -> &str {
        "expire_subscriptions"
    }

    fn max_retries(&self) -> u32 {
        2
    }

    async fn run(&self) -> Result<Value, String> {
        let changed = self
            .subscriptions
            .expire_due()
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "subscriptions_updated": changed }))
    }
}

/// Publishes a care reminder for every active user who wants them.
pub struct SendCareReminders {
    pub users: Arc<UserService>,
    pub events: Arc<EventBus>,
}

#[async_trait]
impl Task for SendCareReminders {
    fn name(&self) -> &str {
        "send_care_reminders"
    }

    async fn run(&self) -> Result<Value, String> {
        let recipients = self
            .users
            .reminder_recipients()
            .await
            .map_err(|e| e.to_string())?;
        let mut failed = 0;
        for user_id in &recipients {
            let event = DomainEvent::for_user(
                EventType::CareReminderSent,
                user_id.clone(),
                json!({ "channel": "scheduled" }),
            );
            if !self.events.publish(event, EventPriority::High, None).await.succeeded() {
                failed += 1;
            }
        }
        Ok(json!({ "reminders_sent": recipients.len(), "failed": failed }))
    }
}

/// Publishes a snapshot of user and cache figures.
pub struct ProcessAnalytics {
    pub users: Arc<UserService>,
    pub cache: Cache,
    pub events: Arc<EventBus>,
}

#[async_trait]
impl Task for ProcessAnalytics {
    fn name(&self) -> &str {
        "process_analytics"
    }

    async fn run(&self) -> Result<Value, String> {
        let users_by_status = self
            .users
            .count_by_status()
            .await
            .map_err(|e| e.to_string())?;
        let cache = self.cache.stats();
        let snapshot = json!({
            "users_by_status": users_by_status,
            "total_users": users_by_status.values().sum::<usize>(),
            "cache": cache,
        });
        self.events
            .publish(
                DomainEvent::new(EventType::AnalyticsInsightGenerated, snapshot.clone()),
                EventPriority::Low,
                None,
            )
            .await;
        Ok(snapshot)
    }
}

/// Everything the built-in tasks need.
pub struct TaskContext {
    pub cache: Cache,
    pub rate_limiter: Arc<RateLimiter>,
    pub rotation: Arc<ApiRotation>,
    pub users: Arc<UserService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub events: Arc<EventBus>,
}

/// Register every built-in task with `scheduler`.
pub fn register_builtin_tasks(scheduler: &JobScheduler, ctx: TaskContext) {
    scheduler.register(Arc::new(RotateApiUsage {
        rotation: ctx.rotation,
    }));
    scheduler.register(Arc::new(CleanupOldData {
        cache: ctx.cache.clone(),
        rate_limiter: ctx.rate_limiter,
    }));
    scheduler.register(Arc::new(ExpireSubscriptions {
        subscriptions: ctx.subscriptions,
    }));
    scheduler.register(Arc::new(SendCareReminders {
        users: ctx.users.clone(),
        events: ctx.events.clone(),
    }));
    scheduler.register(Arc::new(ProcessAnalytics {
        users: ctx.users,
        cache: ctx.cache,
        events: ctx.events,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiRotationConfig;
    use crate::integrations::{ApiCallOutcome, ApiProvider};
    use crate::security::UserTier;
    use crate::users::service::tests::{service, PASSWORD};
    use crate::users::RegisterRequest;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rotate_api_usage_once_per_day() {
        let cache = Cache::new();
        let rotation = Arc::new(ApiRotation::new(cache.clone(), ApiRotationConfig::default()));
        rotation.record_usage(
            ApiProvider::Plantnet,
            "u1",
            &ApiCallOutcome {
                success: true,
                response_time: 0.12,
                status_code: Some(200),
                error: None,
            },
        );
        assert_eq!(rotation.daily_usage(ApiProvider::Plantnet, "u1"), 1);

        let task = RotateApiUsage { rotation: rotation.clone() };
        let result = task.run().await.unwrap();
        assert_eq!(result["rotated"], true);
        assert_eq!(result["cleared_counters"], 1);
        assert_eq!(rotation.daily_usage(ApiProvider::Plantnet, "u1"), 0);

        // A second run the same day keeps today's usage.
        rotation.record_usage(
            ApiProvider::Plantnet,
            "u1",
            &ApiCallOutcome {
                success: true,
                response_time: 0.12,
                status_code: Some(200),
                error: None,
            },
        );
        let result = task.run().await.unwrap();
        assert_eq!(result["rotated"], false);
        assert_eq!(rotation.daily_usage(ApiProvider::Plantnet, "u1"), 1);
    }

    #[tokio::test]
    async fn test_cleanup_purges_expired_entries() {
        let cache = Cache::new();
        cache.set("short", json!(1), Some(Duration::from_millis(1)));
        cache.set("long", json!(2), None);
        let limiter = Arc::new(RateLimiter::new(&[]));
        limiter.check("api_general", "u1", UserTier::Free, None, None);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let task = CleanupOldData {
            cache: cache.clone(),
            rate_limiter: limiter,
        };
        let result = task.run().await.unwrap();
        assert_eq!(result["cache_entries_purged"], 1);
        assert!(cache.exists("long"));
    }

    #[tokio::test]
    async fn test_care_reminders_go_to_active_users() {
        let (users, events) = service();
        let users = Arc::new(users);
        let active = users
            .register(RegisterRequest {
                email: "fern@example.com".into(),
                password: PASSWORD.into(),
                display_name: None,
            })
            .await
            .unwrap();
        users.verify_email(&active.id).await.unwrap();
        users
            .register(RegisterRequest {
                email: "moss@example.com".into(),
                password: PASSWORD.into(),
                display_name: None,
            })
            .await
            .unwrap();

        let task = SendCareReminders {
            users: users.clone(),
            events: events.clone(),
        };
        let result = task.run().await.unwrap();
        assert_eq!(result["reminders_sent"], 1);

        let sent = events.replay(Some(EventType::CareReminderSent), None, None, 10);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id.as_deref(), Some(active.id.as_str()));
    }

    #[tokio::test]
    async fn test_analytics_snapshot_counts_users() {
        let (users, events) = service();
        let users = Arc::new(users);
        users
            .register(RegisterRequest {
                email: "sage@example.com".into(),
                password: PASSWORD.into(),
                display_name: None,
            })
            .await
            .unwrap();

        let task = ProcessAnalytics {
            users,
            cache: Cache::new(),
            events: events.clone(),
        };
        let snapshot = task.run().await.unwrap();
        assert_eq!(snapshot["total_users"], 1);
        assert_eq!(snapshot["users_by_status"]["pending"], 1);
        assert_eq!(
            events
                .replay(Some(EventType::AnalyticsInsightGenerated), None, None, 10)
                .len(),
            1
        );
    }
}
