//! Extended profile, preferences and notification settings.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::users::DomainError;

const MAX_BIO_CHARS: usize = 500;
const EXPERIENCE_LEVELS: &[&str] = &["beginner", "intermediate", "advanced", "expert"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementUnit {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    #[default]
    Public,
    Friends,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    WateringReminder,
    FertilizingReminder,
    RepottingReminder,
    PlantHealthAlert,
    CommunityUpdates,
    ExpertResponses,
    WeeklySummary,
    Promotional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub watering_reminders: bool,
    pub fertilizing_reminders: bool,
    pub repotting_reminders: bool,
    pub health_alerts: bool,
    pub growth_milestones: bool,
    pub community_updates: bool,
    pub expert_responses: bool,
    pub weekly_summary: bool,
    pub promotional: bool,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub sms_notifications: bool,
    /// "HH:MM", local to `timezone`.
    pub quiet_hours_start: String,
    pub quiet_hours_end: String,
    pub timezone: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            watering_reminders: true,
            fertilizing_reminders: true,
            repotting_reminders: true,
            health_alerts: true,
            growth_milestones: true,
            community_updates: true,
            expert_responses: true,
            weekly_summary: true,
            promotional: false,
            email_notifications: true,
            push_notifications: true,
            sms_notifications: false,
            quiet_hours_start: "22:00".to_string(),
            quiet_hours_end: "08:00".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl NotificationSettings {
    pub fn is_enabled(&self, kind: NotificationType) -> bool {
        match kind {
            NotificationType::WateringReminder => self.watering_reminders,
            NotificationType::FertilizingReminder => self.fertilizing_reminders,
            NotificationType::RepottingReminder => self.repotting_reminders,
            NotificationType::PlantHealthAlert => self.health_alerts,
            NotificationType::CommunityUpdates => self.community_updates,
            NotificationType::ExpertResponses => self.expert_responses,
            NotificationType::WeeklySummary => self.weekly_summary,
            NotificationType::Promotional => self.promotional,
        }
    }

    /// Any care reminder channel switched on.
    pub fn wants_care_reminders(&self) -> bool {
        self.watering_reminders || self.fertilizing_reminders || self.repotting_reminders
    }

    /// Whether `time` falls in the quiet window. Windows may wrap midnight.
    pub fn in_quiet_hours(&self, time: NaiveTime) -> bool {
        let (Ok(start), Ok(end)) = (
            NaiveTime::parse_from_str(&self.quiet_hours_start, "%H:%M"),
            NaiveTime::parse_from_str(&self.quiet_hours_end, "%H:%M"),
        ) else {
            return false;
        };
        if start <= end {
            time >= start && time < end
        } else {
            time >= start || time < end
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("quiet_hours_start", &self.quiet_hours_start),
            ("quiet_hours_end", &self.quiet_hours_end),
        ] {
            if NaiveTime::parse_from_str(value, "%H:%M").is_err() {
                return Err(DomainError::InvalidInput {
                    field,
                    message: format!("'{value}' is not a HH:MM time"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub measurement_unit: MeasurementUnit,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Days before a care task is due to send the reminder.
    pub care_reminder_advance_days: u32,
    pub default_watering_frequency: u32,
    pub theme: String,
    pub language: String,
    pub profile_visibility: PrivacyLevel,
    pub share_plant_collection: bool,
    pub share_care_progress: bool,
    pub allow_expert_contact: bool,
    pub expert_specialties: Vec<String>,
    pub expert_available_for_consultation: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            measurement_unit: MeasurementUnit::Metric,
            location: None,
            latitude: None,
            longitude: None,
            care_reminder_advance_days: 1,
            default_watering_frequency: 7,
            theme: "light".to_string(),
            language: "en".to_string(),
            profile_visibility: PrivacyLevel::Public,
            share_plant_collection: true,
            share_care_progress: true,
            allow_expert_contact: true,
            expert_specialties: Vec::new(),
            expert_available_for_consultation: false,
        }
    }
}

impl UserPreferences {
    pub fn update_location(
        &mut self,
        location: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), DomainError> {
        check_coordinates(latitude, longitude)?;
        self.location = Some(location.to_string());
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        tracing::info!(location, "User location updated");
        Ok(())
    }

    pub fn add_expert_specialty(&mut self, specialty: &str) {
        let specialty = specialty.trim();
        if !specialty.is_empty() && !self.expert_specialties.iter().any(|s| s == specialty) {
            self.expert_specialties.push(specialty.to_string());
        }
    }

    pub fn remove_expert_specialty(&mut self, specialty: &str) {
        self.expert_specialties.retain(|s| s != specialty);
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            check_coordinates(lat, lon)?;
        }
        if self.care_reminder_advance_days > 30 {
            return Err(DomainError::InvalidInput {
                field: "care_reminder_advance_days",
                message: "must be at most 30".into(),
            });
        }
        Ok(())
    }
}

fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), DomainError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(DomainError::InvalidInput {
            field: "latitude",
            message: "Latitude must be between -90 and 90".into(),
        });
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(DomainError::InvalidInput {
            field: "longitude",
            message: "Longitude must be between -180 and 180".into(),
        });
    }
    Ok(())
}

/// Public-facing profile attached to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub profile_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub experience_level: String,
    pub favorite_plant_types: Vec<String>,
    pub gardening_goals: Vec<String>,
    pub preferences: UserPreferences,
    pub notification_settings: NotificationSettings,
    pub follower_count: u32,
    pub following_count: u32,
    pub is_verified_expert: bool,
    pub expert_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub experience_level: Option<String>,
    pub favorite_plant_types: Option<Vec<String>>,
    pub gardening_goals: Option<Vec<String>>,
    pub preferences: Option<UserPreferences>,
    pub notification_settings: Option<NotificationSettings>,
}

impl Profile {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            profile_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            display_name: None,
            first_name: None,
            last_name: None,
            bio: None,
            avatar_url: None,
            experience_level: "beginner".to_string(),
            favorite_plant_types: Vec::new(),
            gardening_goals: Vec::new(),
            preferences: UserPreferences::default(),
            notification_settings: NotificationSettings::default(),
            follower_count: 0,
            following_count: 0,
            is_verified_expert: false,
            expert_rating: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate everything first, then apply, so a rejected update changes nothing.
    pub fn apply(&mut self, update: ProfileUpdate) -> Result<(), DomainError> {
        if let Some(bio) = &update.bio {
            if bio.chars().count() > MAX_BIO_CHARS {
                return Err(DomainError::InvalidInput {
                    field: "bio",
                    message: format!("Bio cannot exceed {MAX_BIO_CHARS} characters"),
                });
            }
        }
        if let Some(url) = &update.avatar_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DomainError::InvalidInput {
                    field: "avatar_url",
                    message: "Invalid avatar URL format".into(),
                });
            }
        }
        if let Some(level) = &update.experience_level {
            if !EXPERIENCE_LEVELS.contains(&level.as_str()) {
                return Err(DomainError::InvalidInput {
                    field: "experience_level",
                    message: format!("Must be one of: {}", EXPERIENCE_LEVELS.join(", ")),
                });
            }
        }
        if let Some(preferences) = &update.preferences {
            preferences.validate()?;
        }
        if let Some(settings) = &update.notification_settings {
            settings.validate()?;
        }

        let trimmed = |s: String| {
            let s = s.trim().to_string();
            (!s.is_empty()).then_some(s)
        };
        if let Some(v) = update.display_name {
            self.display_name = trimmed(v);
        }
        if let Some(v) = update.first_name {
            self.first_name = trimmed(v);
        }
        if let Some(v) = update.last_name {
            self.last_name = trimmed(v);
        }
        if let Some(v) = update.bio {
            self.bio = trimmed(v);
        }
        if let Some(v) = update.avatar_url {
            self.avatar_url = Some(v);
        }
        if let Some(v) = update.experience_level {
            self.experience_level = v;
        }
        if let Some(types) = update.favorite_plant_types {
            self.favorite_plant_types.clear();
            for t in types {
                let t = t.trim().to_lowercase();
                if !t.is_empty() && !self.favorite_plant_types.contains(&t) {
                    self.favorite_plant_types.push(t);
                }
            }
        }
        if let Some(goals) = update.gardening_goals {
            self.gardening_goals = goals
                .into_iter()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect();
            self.gardening_goals.dedup();
        }
        if let Some(v) = update.preferences {
            self.preferences = v;
        }
        if let Some(v) = update.notification_settings {
            self.notification_settings = v;
        }
        self.updated_at = Utc::now();
        tracing::info!(profile_id = %self.profile_id, user_id = %self.user_id, "Profile updated");
        Ok(())
    }

    pub fn verify_as_expert(&mut self, rating: f64) -> Result<(), DomainError> {
        if !(1.0..=5.0).contains(&rating) {
            return Err(DomainError::InvalidInput {
                field: "expert_rating",
                message: "Expert rating must be between 1.0 and 5.0".into(),
            });
        }
        self.is_verified_expert = true;
        self.expert_rating = Some(rating);
        self.experience_level = "expert".to_string();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// display name, then first/last name, then a generic fallback.
    pub fn display(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let full = full.trim();
        if full.is_empty() {
            "Plant Lover".to_string()
        } else {
            full.to_string()
        }
    }

    pub fn is_public(&self) -> bool {
        self.preferences.profile_visibility == PrivacyLevel::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_bounds() {
        let mut prefs = UserPreferences::default();
        assert!(prefs.update_location("Oslo", 59.9, 10.7).is_ok());
        assert!(prefs.update_location("Nowhere", 91.0, 0.0).is_err());
        assert!(prefs.update_location("Nowhere", 0.0, -180.5).is_err());
        assert_eq!(prefs.location.as_deref(), Some("Oslo"));
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        let settings = NotificationSettings::default();
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(settings.in_quiet_hours(t(23, 0)));
        assert!(settings.in_quiet_hours(t(7, 59)));
        assert!(!settings.in_quiet_hours(t(8, 0)));
        assert!(!settings.in_quiet_hours(t(12, 0)));
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut profile = Profile::new("u1");
        let bad = ProfileUpdate {
            display_name: Some("Fern Fan".into()),
            experience_level: Some("wizard".into()),
            ..ProfileUpdate::default()
        };
        assert!(profile.apply(bad).is_err());
        assert_eq!(profile.display_name, None);

        let good = ProfileUpdate {
            display_name: Some("  Fern Fan ".into()),
            favorite_plant_types: Some(vec!["Succulents".into(), "succulents".into()]),
            ..ProfileUpdate::default()
        };
        profile.apply(good).unwrap();
        assert_eq!(profile.display(), "Fern Fan");
        assert_eq!(profile.favorite_plant_types, vec!["succulents"]);
    }

    #[test]
    fn test_display_fallbacks() {
        let mut profile = Profile::new("u1");
        assert_eq!(profile.display(), "Plant Lover");
        profile.first_name = Some("Ada".into());
        assert_eq!(profile.display(), "Ada");
    }

    #[test]
    fn test_expert_specialties_dedup() {
        let mut prefs = UserPreferences::default();
        prefs.add_expert_specialty("orchids");
        prefs.add_expert_specialty("orchids");
        prefs.add_expert_specialty("");
        assert_eq!(prefs.expert_specialties.len(), 1);
        prefs.remove_expert_specialty("orchids");
        assert!(prefs.expert_specialties.is_empty());
    }

    #[test]
    fn test_expert_rating_range() {
        let mut profile = Profile::new("u1");
        assert!(profile.verify_as_expert(6.0).is_err());
        profile.verify_as_expert(4.5).unwrap();
        assert_eq!(profile.experience_level, "expert");
    }
}
