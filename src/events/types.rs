//! Domain event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "user.registered")]
    UserRegistered,
    #[serde(rename = "user.email_verified")]
    UserEmailVerified,
    #[serde(rename = "user.activated")]
    UserActivated,
    #[serde(rename = "user.deactivated")]
    UserDeactivated,
    #[serde(rename = "user.suspended")]
    UserSuspended,
    #[serde(rename = "user.subscription_changed")]
    UserSubscriptionChanged,
    #[serde(rename = "user.login")]
    UserLogin,
    #[serde(rename = "plant.added")]
    PlantAdded,
    #[serde(rename = "plant.identified")]
    PlantIdentified,
    #[serde(rename = "plant.photo_uploaded")]
    PlantPhotoUploaded,
    #[serde(rename = "care.task_completed")]
    CareTaskCompleted,
    #[serde(rename = "care.task_overdue")]
    CareTaskOverdue,
    #[serde(rename = "care.reminder_sent")]
    CareReminderSent,
    #[serde(rename = "health.alert_triggered")]
    HealthAlertTriggered,
    #[serde(rename = "health.diagnosis_completed")]
    HealthDiagnosisCompleted,
    #[serde(rename = "growth.milestone_achieved")]
    GrowthMilestoneAchieved,
    #[serde(rename = "growth.photo_added")]
    GrowthPhotoAdded,
    #[serde(rename = "community.post_created")]
    CommunityPostCreated,
    #[serde(rename = "community.expert_advice_provided")]
    CommunityExpertAdviceProvided,
    #[serde(rename = "ai.recommendation_generated")]
    AiRecommendationGenerated,
    #[serde(rename = "weather.alert_issued")]
    WeatherAlertIssued,
    #[serde(rename = "analytics.insight_generated")]
    AnalyticsInsightGenerated,
    #[serde(rename = "subscription.activated")]
    SubscriptionActivated,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserRegistered => "user.registered",
            EventType::UserEmailVerified => "user.email_verified",
            EventType::UserActivated => "user.activated",
            EventType::UserDeactivated => "user.deactivated",
            EventType::UserSuspended => "user.suspended",
            EventType::UserSubscriptionChanged => "user.subscription_changed",
            EventType::UserLogin => "user.login",
            EventType::PlantAdded => "plant.added",
            EventType::PlantIdentified => "plant.identified",
            EventType::PlantPhotoUploaded => "plant.photo_uploaded",
            EventType::CareTaskCompleted => "care.task_completed",
            EventType::CareTaskOverdue => "care.task_overdue",
            EventType::CareReminderSent => "care.reminder_sent",
            EventType::HealthAlertTriggered => "health.alert_triggered",
            EventType::HealthDiagnosisCompleted => "health.diagnosis_completed",
            EventType::GrowthMilestoneAchieved => "growth.milestone_achieved",
            EventType::GrowthPhotoAdded => "growth.photo_added",
            EventType::CommunityPostCreated => "community.post_created",
            EventType::CommunityExpertAdviceProvided => "community.expert_advice_provided",
            EventType::AiRecommendationGenerated => "ai.recommendation_generated",
            EventType::WeatherAlertIssued => "weather.alert_issued",
            EventType::AnalyticsInsightGenerated => "analytics.insight_generated",
            EventType::SubscriptionActivated => "subscription.activated",
            EventType::PaymentFailed => "payment.failed",
        }
    }

    /// Modules interested in this event type.
    pub fn target_modules(&self) -> &'static [&'static str] {
        match self {
            EventType::UserRegistered => &["analytics_insights", "notification_communication"],
            EventType::UserSubscriptionChanged => &["payment_subscription", "analytics_insights"],
            EventType::PlantAdded => &["care_management", "analytics_insights", "ai_smart_features"],
            EventType::PlantIdentified => &["care_management", "content_management"],
            EventType::PlantPhotoUploaded => &["growth_tracking", "ai_smart_features"],
            EventType::CareTaskCompleted => &["analytics_insights", "growth_tracking"],
            EventType::CareTaskOverdue => &["notification_communication", "analytics_insights"],
            EventType::CareReminderSent => &["analytics_insights"],
            EventType::HealthAlertTriggered => &["notification_communication", "care_management"],
            EventType::HealthDiagnosisCompleted => &["care_management", "ai_smart_features"],
            EventType::GrowthMilestoneAchieved => &["notification_communication", "community_social"],
            EventType::GrowthPhotoAdded => &["ai_smart_features", "analytics_insights"],
            EventType::CommunityPostCreated => &["notification_communication", "analytics_insights"],
            EventType::CommunityExpertAdviceProvided => &["notification_communication"],
            EventType::AiRecommendationGenerated => &["care_management", "analytics_insights"],
            EventType::WeatherAlertIssued => &["care_management", "notification_communication"],
            EventType::AnalyticsInsightGenerated => &["notification_communication"],
            EventType::SubscriptionActivated => &["user_management", "analytics_insights"],
            EventType::PaymentFailed => &["notification_communication", "user_management"],
            _ => &[],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    /// Analytics and other non-critical updates.
    Low,
    #[default]
    Normal,
    /// Care reminders, health alerts.
    High,
    /// Security events, payment failures.
    Critical,
}

impl EventPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPriority::Low => "low",
            EventPriority::Normal => "normal",
            EventPriority::High => "high",
            EventPriority::Critical => "critical",
        }
    }
}

/// An event flowing through the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub data: Value,
}

impl DomainEvent {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            user_id: None,
            correlation_id: None,
            metadata: Map::new(),
            data,
        }
    }

    pub fn for_user(event_type: EventType, user_id: impl Into<String>, data: Value) -> Self {
        let mut event = Self::new(event_type, data);
        event.user_id = Some(user_id.into());
        event
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
