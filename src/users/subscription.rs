//! Subscription tiers, limits and billing lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::users::DomainError;

pub const BILLING_PERIOD_DAYS: i64 = 30;
pub const DEFAULT_TRIAL_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Premium,
    Expert,
    Family,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Expert => "expert",
            SubscriptionTier::Family => "family",
        }
    }

    /// List price per month in USD.
    pub fn monthly_price(&self) -> f64 {
        match self {
            SubscriptionTier::Free => 0.0,
            SubscriptionTier::Premium => 9.99,
            SubscriptionTier::Expert => 19.99,
            SubscriptionTier::Family => 14.99,
        }
    }

    pub fn is_paid(&self) -> bool {
        *self != SubscriptionTier::Free
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionTier::Free),
            "premium" => Ok(SubscriptionTier::Premium),
            "expert" => Ok(SubscriptionTier::Expert),
            "family" => Ok(SubscriptionTier::Family),
            other => Err(format!("unknown subscription tier '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    /// Still valid until the end of the period.
    Cancelled,
    Expired,
    /// Payment failed, grace period.
    PastDue,
    Paused,
    Trialing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
    Upi,
    Wallet,
}

/// Metered usage kinds with per-period limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    PlantIdentifications,
    AiChatMessages,
    ExpertConsultations,
}

impl UsageType {
    pub const ALL: [UsageType; 3] = [
        UsageType::PlantIdentifications,
        UsageType::AiChatMessages,
        UsageType::ExpertConsultations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::PlantIdentifications => "plant_identifications",
            UsageType::AiChatMessages => "ai_chat_messages",
            UsageType::ExpertConsultations => "expert_consultations",
        }
    }
}

impl FromStr for UsageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsageType::ALL
            .iter()
            .find(|u| u.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown usage type '{s}'"))
    }
}

/// Feature limits of a tier. `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionLimits {
    pub max_plants: Option<u32>,
    pub max_plant_photos_per_plant: u32,
    pub plant_identifications_per_month: Option<u32>,
    pub ai_chat_messages_per_month: Option<u32>,
    pub expert_consultations_per_month: Option<u32>,
    pub max_storage_gb: Option<f64>,
    pub can_post_in_community: bool,
    pub can_ask_experts: bool,
    pub priority_expert_response: bool,
    pub weather_integration: bool,
    pub care_analytics: bool,
    pub growth_tracking: bool,
    pub automated_care_schedules: bool,
    pub family_sharing: bool,
    pub can_export_data: bool,
    pub automated_backups: bool,
}

impl SubscriptionLimits {
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        let paid = tier.is_paid();
        let (photos, ai_chat, consultations, storage) = match tier {
            SubscriptionTier::Free => (5, Some(10), Some(1), Some(0.5)),
            SubscriptionTier::Premium => (50, Some(500), Some(5), Some(10.0)),
            SubscriptionTier::Expert => (100, None, None, Some(50.0)),
            SubscriptionTier::Family => (50, Some(1000), Some(10), Some(25.0)),
        };
        Self {
            max_plants: (!paid).then_some(5),
            max_plant_photos_per_plant: photos,
            plant_identifications_per_month: (!paid).then_some(3),
            ai_chat_messages_per_month: ai_chat,
            expert_consultations_per_month: consultations,
            max_storage_gb: storage,
            can_post_in_community: true,
            can_ask_experts: true,
            priority_expert_response: paid,
            weather_integration: true,
            care_analytics: paid,
            growth_tracking: true,
            automated_care_schedules: paid,
            family_sharing: matches!(tier, SubscriptionTier::Expert | SubscriptionTier::Family),
            can_export_data: paid,
            automated_backups: paid,
        }
    }

    pub fn usage_limit(&self, usage: UsageType) -> Option<u32> {
        match usage {
            UsageType::PlantIdentifications => self.plant_identifications_per_month,
            UsageType::AiChatMessages => self.ai_chat_messages_per_month,
            UsageType::ExpertConsultations => self.expert_consultations_per_month,
        }
    }
}

/// A user's subscription. Every user has exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: String,
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub price_per_month: f64,
    pub currency: String,
    pub payment_method: Option<PaymentMethod>,
    pub started_at: DateTime<Utc>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub is_trial: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancellation_reason: Option<String>,
    pub usage_this_period: BTreeMap<UsageType, u32>,
    pub limits: SubscriptionLimits,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub next_payment_due: Option<DateTime<Utc>>,
    pub failed_payment_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn free(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            subscription_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            tier: SubscriptionTier::Free,
            status: SubscriptionStatus::Active,
            price_per_month: 0.0,
            currency: "USD".to_string(),
            payment_method: None,
            started_at: now,
            current_period_start: now,
            current_period_end: now + Duration::days(BILLING_PERIOD_DAYS),
            trial_start: None,
            trial_end: None,
            is_trial: false,
            cancelled_at: None,
            cancel_at_period_end: false,
            cancellation_reason: None,
            usage_this_period: BTreeMap::new(),
            limits: SubscriptionLimits::for_tier(SubscriptionTier::Free),
            last_payment_at: None,
            next_payment_due: None,
            failed_payment_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn fall_back_to_free(&mut self) {
        self.status = SubscriptionStatus::Expired;
        self.tier = SubscriptionTier::Free;
        self.limits = SubscriptionLimits::for_tier(SubscriptionTier::Free);
    }

    fn start_billing_period(&mut self, now: DateTime<Utc>) {
        self.current_period_start = now;
        self.current_period_end = now + Duration::days(BILLING_PERIOD_DAYS);
        self.next_payment_due = Some(self.current_period_end);
        self.usage_this_period.clear();
    }

    /// Trial of a paid tier. The tier must already be set.
    pub fn start_trial(&mut self, days: i64) -> Result<(), DomainError> {
        if self.is_trial {
            return Err(DomainError::Rule("Trial already started".into()));
        }
        if self.tier == SubscriptionTier::Free {
            return Err(DomainError::Rule("Cannot start trial for free tier".into()));
        }
        let now = Utc::now();
        self.trial_start = Some(now);
        self.trial_end = Some(now + Duration::days(days));
        self.is_trial = true;
        self.status = SubscriptionStatus::Trialing;
        self.updated_at = now;
        tracing::info!(subscription_id = %self.subscription_id, user_id = %self.user_id, trial_days = days, "Trial started");
        Ok(())
    }

    pub fn end_trial(&mut self, convert_to_paid: bool) -> Result<(), DomainError> {
        if !self.is_trial {
            return Err(DomainError::Rule("No active trial to end".into()));
        }
        let now = Utc::now();
        self.is_trial = false;
        if convert_to_paid {
            self.status = SubscriptionStatus::Active;
            self.start_billing_period(now);
        } else {
            self.fall_back_to_free();
        }
        self.updated_at = now;
        tracing::info!(subscription_id = %self.subscription_id, converted = convert_to_paid, "Trial ended");
        Ok(())
    }

    pub fn upgrade_tier(&mut self, tier: SubscriptionTier, price: f64) -> Result<(), DomainError> {
        if tier == self.tier {
            return Err(DomainError::Rule("Already on this tier".into()));
        }
        let old = self.tier;
        self.tier = tier;
        self.price_per_month = price;
        self.limits = SubscriptionLimits::for_tier(tier);
        self.status = SubscriptionStatus::Active;
        self.usage_this_period.clear();
        self.updated_at = Utc::now();
        tracing::info!(subscription_id = %self.subscription_id, old_tier = %old, new_tier = %tier, "Subscription upgraded");
        Ok(())
    }

    /// Usage counters survive a downgrade.
    pub fn downgrade_tier(&mut self, tier: SubscriptionTier, price: f64) -> Result<(), DomainError> {
        if tier == self.tier {
            return Err(DomainError::Rule("Already on this tier".into()));
        }
        let old = self.tier;
        self.tier = tier;
        self.price_per_month = price;
        self.limits = SubscriptionLimits::for_tier(tier);
        self.updated_at = Utc::now();
        tracing::info!(subscription_id = %self.subscription_id, old_tier = %old, new_tier = %tier, "Subscription downgraded");
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<String>, immediate: bool) -> Result<(), DomainError> {
        if self.status == SubscriptionStatus::Cancelled {
            return Err(DomainError::Rule("Subscription already cancelled".into()));
        }
        let now = Utc::now();
        self.cancelled_at = Some(now);
        self.cancellation_reason = reason;
        if immediate {
            self.fall_back_to_free();
        } else {
            self.status = SubscriptionStatus::Cancelled;
            self.cancel_at_period_end = true;
        }
        self.updated_at = now;
        tracing::info!(subscription_id = %self.subscription_id, immediate, "Subscription cancelled");
        Ok(())
    }

    pub fn reactivate(&mut self) -> Result<(), DomainError> {
        if !matches!(
            self.status,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        ) {
            return Err(DomainError::Rule(
                "Can only reactivate cancelled or expired subscriptions".into(),
            ));
        }
        let now = Utc::now();
        self.status = SubscriptionStatus::Active;
        self.cancelled_at = None;
        self.cancel_at_period_end = false;
        self.cancellation_reason = None;
        self.failed_payment_count = 0;
        if self.current_period_end <= now {
            self.start_billing_period(now);
        }
        self.updated_at = now;
        tracing::info!(subscription_id = %self.subscription_id, "Subscription reactivated");
        Ok(())
    }

    pub fn record_payment(&mut self, amount: f64, method: PaymentMethod) {
        let now = Utc::now();
        self.last_payment_at = Some(now);
        self.payment_method = Some(method);
        self.failed_payment_count = 0;
        self.start_billing_period(now);
        if self.status == SubscriptionStatus::PastDue {
            self.status = SubscriptionStatus::Active;
        }
        self.updated_at = now;
        tracing::info!(subscription_id = %self.subscription_id, amount, "Payment recorded");
    }

    /// First failure puts the subscription past due; the third expires it.
    pub fn record_payment_failure(&mut self) {
        self.failed_payment_count += 1;
        if self.failed_payment_count == 1 {
            self.status = SubscriptionStatus::PastDue;
        } else if self.failed_payment_count >= 3 {
            self.fall_back_to_free();
        }
        self.updated_at = Utc::now();
        tracing::warn!(
            subscription_id = %self.subscription_id,
            failure_count = self.failed_payment_count,
            "Payment failed"
        );
    }

    /// Apply time-based transitions. Returns whether anything changed.
    pub fn check_and_update_status(&mut self) -> bool {
        self.check_and_update_status_at(Utc::now())
    }

    pub fn check_and_update_status_at(&mut self, now: DateTime<Utc>) -> bool {
        let period_over = now > self.current_period_end;
        if self.is_trial && self.trial_end.is_some_and(|end| now > end) {
            self.is_trial = false;
            self.fall_back_to_free();
        } else if self.status == SubscriptionStatus::Active && period_over && self.tier.is_paid() {
            self.fall_back_to_free();
        } else if self.status == SubscriptionStatus::Cancelled && self.cancel_at_period_end && period_over {
            self.fall_back_to_free();
        } else if self.status == SubscriptionStatus::Active && period_over {
            self.start_billing_period(now);
        } else {
            return false;
        }
        self.updated_at = now;
        true
    }

    pub fn track_usage(&mut self, usage: UsageType, amount: u32) {
        *self.usage_this_period.entry(usage).or_insert(0) += amount;
        self.updated_at = Utc::now();
    }

    pub fn usage(&self, usage: UsageType) -> u32 {
        self.usage_this_period.get(&usage).copied().unwrap_or(0)
    }

    /// True while usage is below the limit.
    pub fn check_usage_limit(&self, usage: UsageType) -> bool {
        match self.limits.usage_limit(usage) {
            Some(limit) => self.usage(usage) < limit,
            None => true,
        }
    }

    /// `None` means unlimited.
    pub fn usage_remaining(&self, usage: UsageType) -> Option<u32> {
        self.limits
            .usage_limit(usage)
            .map(|limit| limit.saturating_sub(self.usage(usage)))
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    pub fn is_premium(&self) -> bool {
        self.tier.is_paid()
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        let l = &self.limits;
        match feature {
            "unlimited_plants" => l.max_plants.is_none(),
            "ai_chat" => l.ai_chat_messages_per_month.is_some(),
            "expert_consultations" => l.expert_consultations_per_month.is_some(),
            "priority_support" => l.priority_expert_response,
            "care_analytics" => l.care_analytics,
            "automated_schedules" => l.automated_care_schedules,
            "family_sharing" => l.family_sharing,
            "data_export" => l.can_export_data,
            "automated_backups" => l.automated_backups,
            "weather_integration" => l.weather_integration,
            _ => false,
        }
    }

    pub fn days_until_renewal(&self) -> Option<i64> {
        if !self.is_active() {
            return None;
        }
        Some((self.current_period_end - Utc::now()).num_days().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn premium() -> Subscription {
        let mut sub = Subscription::free("u1");
        sub.upgrade_tier(SubscriptionTier::Premium, 9.99).unwrap();
        sub
    }

    #[test]
    fn test_tier_limits() {
        let free = SubscriptionLimits::for_tier(SubscriptionTier::Free);
        assert_eq!(free.max_plants, Some(5));
        assert_eq!(free.plant_identifications_per_month, Some(3));
        assert!(!free.care_analytics);

        let expert = SubscriptionLimits::for_tier(SubscriptionTier::Expert);
        assert_eq!(expert.ai_chat_messages_per_month, None);
        assert!(expert.family_sharing);
        assert!(!SubscriptionLimits::for_tier(SubscriptionTier::Premium).family_sharing);
    }

    #[test]
    fn test_trial_lifecycle() {
        let mut sub = Subscription::free("u1");
        assert!(sub.start_trial(14).is_err());

        let mut sub2 = premium();
        sub2.start_trial(14).unwrap();
        assert_eq!(sub2.status, SubscriptionStatus::Trialing);
        assert!(sub2.start_trial(14).is_err());
        sub2.end_trial(false).unwrap();
        assert_eq!(sub2.tier, SubscriptionTier::Free);
        assert_eq!(sub2.status, SubscriptionStatus::Expired);

        sub.tier = SubscriptionTier::Family;
        sub.start_trial(7).unwrap();
        sub.end_trial(true).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.next_payment_due.is_some());
    }

    #[test]
    fn test_payment_failures_escalate() {
        let mut sub = premium();
        sub.record_payment_failure();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        sub.record_payment_failure();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        sub.record_payment_failure();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
        assert_eq!(sub.tier, SubscriptionTier::Free);

        let mut sub = premium();
        sub.record_payment_failure();
        sub.record_payment(9.99, PaymentMethod::CreditCard);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.failed_payment_count, 0);
    }

    #[test]
    fn test_cancel_and_reactivate() {
        let mut sub = premium();
        assert!(sub.reactivate().is_err());
        sub.cancel(Some("too expensive".into()), false).unwrap();
        assert!(sub.cancel_at_period_end);
        assert_eq!(sub.tier, SubscriptionTier::Premium);
        assert!(sub.cancel(None, false).is_err());
        sub.reactivate().unwrap();
        assert!(sub.cancellation_reason.is_none());

        sub.cancel(None, true).unwrap();
        assert_eq!(sub.tier, SubscriptionTier::Free);
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    #[test]
    fn test_status_transitions_over_time() {
        let mut sub = premium();
        let later = sub.current_period_end + Duration::days(1);
        assert!(!sub.check_and_update_status_at(Utc::now()));
        assert!(sub.check_and_update_status_at(later));
        assert_eq!(sub.tier, SubscriptionTier::Free);

        let mut sub = premium();
        sub.cancel(None, false).unwrap();
        let later = sub.current_period_end + Duration::seconds(1);
        assert!(sub.check_and_update_status_at(later));
        assert_eq!(sub.status, SubscriptionStatus::Expired);

        let mut free = Subscription::free("u2");
        free.track_usage(UsageType::AiChatMessages, 4);
        let later = free.current_period_end + Duration::seconds(1);
        assert!(free.check_and_update_status_at(later));
        assert_eq!(free.status, SubscriptionStatus::Active);
        assert_eq!(free.usage(UsageType::AiChatMessages), 0);
    }

    #[test]
    fn test_usage_tracking() {
        let mut sub = Subscription::free("u1");
        assert!(sub.check_usage_limit(UsageType::PlantIdentifications));
        sub.track_usage(UsageType::PlantIdentifications, 3);
        assert!(!sub.check_usage_limit(UsageType::PlantIdentifications));
        assert_eq!(sub.usage_remaining(UsageType::PlantIdentifications), Some(0));

        let sub = premium();
        assert_eq!(sub.usage_remaining(UsageType::PlantIdentifications), None);
        assert!(sub.has_feature("unlimited_plants"));
        assert!(!sub.has_feature("teleportation"));
        assert!(sub.days_until_renewal().is_some_and(|d| d >= 29));
    }
}
