//! User account entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::security::rate_limit::UserTier;
use crate::users::DomainError;

/// Plants a free account may own.
pub const FREE_PLANT_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Premium,
    Expert,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Premium => "premium",
            UserRole::Expert => "expert",
            UserRole::Admin => "admin",
        }
    }

    /// Position in the hierarchy user < premium < expert < admin.
    pub fn rank(&self) -> u8 {
        match self {
            UserRole::User => 1,
            UserRole::Premium => 2,
            UserRole::Expert => 3,
            UserRole::Admin => 4,
        }
    }

    /// Name used by the permission matrix.
    pub fn permission_role(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Premium => "premium_user",
            UserRole::Expert => "expert",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "premium" | "premium_user" => Ok(UserRole::Premium),
            "expert" => Ok(UserRole::Expert),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    #[default]
    Pending,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
            UserStatus::Pending => "pending",
            UserStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "suspended" => Ok(UserStatus::Suspended),
            "pending" => Ok(UserStatus::Pending),
            "deleted" => Ok(UserStatus::Deleted),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub email_verified: bool,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub plant_count: u32,
    pub subscription_tier: String,
    pub is_premium: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl User {
    /// New pending account. The email is normalized to lowercase.
    pub fn new(email: &str, password_hash: String) -> Result<Self, DomainError> {
        let email = email.trim().to_ascii_lowercase();
        validate_email(&email)?;
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash,
            email_verified: false,
            phone: None,
            role: UserRole::User,
            status: UserStatus::Pending,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            email_confirmed_at: None,
            plant_count: 0,
            subscription_tier: "free".to_string(),
            is_premium: false,
            metadata: Map::new(),
        })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn activate(&mut self) -> Result<(), DomainError> {
        if !self.email_verified {
            return Err(DomainError::Rule(
                "Cannot activate user without email verification".into(),
            ));
        }
        self.status = UserStatus::Active;
        self.touch();
        tracing::info!(user_id = %self.id, "User activated");
        Ok(())
    }

    pub fn deactivate(&mut self, reason: Option<&str>) {
        self.status = UserStatus::Inactive;
        self.touch();
        if let Some(reason) = reason {
            self.metadata
                .insert("deactivation_reason".into(), Value::from(reason));
            self.metadata
                .insert("deactivated_at".into(), Value::from(Utc::now().to_rfc3339()));
        }
        tracing::info!(user_id = %self.id, reason = ?reason, "User deactivated");
    }

    pub fn suspend(
        &mut self,
        reason: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), DomainError> {
        if reason.trim().is_empty() {
            return Err(DomainError::InvalidInput {
                field: "reason",
                message: "Suspension reason is required".into(),
            });
        }
        self.status = UserStatus::Suspended;
        self.touch();
        self.metadata
            .insert("suspension_reason".into(), Value::from(reason));
        self.metadata
            .insert("suspended_at".into(), Value::from(Utc::now().to_rfc3339()));
        if let Some(until) = until {
            self.metadata
                .insert("suspended_until".into(), Value::from(until.to_rfc3339()));
        }
        tracing::warn!(user_id = %self.id, reason, "User suspended");
        Ok(())
    }

    /// Pending accounts become active once their email is confirmed.
    pub fn verify_email(&mut self) {
        let now = Utc::now();
        self.email_verified = true;
        self.email_confirmed_at = Some(now);
        self.updated_at = now;
        if self.status == UserStatus::Pending {
            self.status = UserStatus::Active;
        }
        tracing::info!(user_id = %self.id, "Email verified");
    }

    pub fn record_login(&mut self) {
        let now = Utc::now();
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn upgrade_to_premium(&mut self) -> Result<(), DomainError> {
        if self.status != UserStatus::Active {
            return Err(DomainError::Rule("Cannot upgrade inactive user to premium".into()));
        }
        self.role = UserRole::Premium;
        self.subscription_tier = "premium".to_string();
        self.is_premium = true;
        self.touch();
        tracing::info!(user_id = %self.id, "User upgraded to premium");
        Ok(())
    }

    pub fn downgrade_from_premium(&mut self) {
        self.role = UserRole::User;
        self.subscription_tier = "free".to_string();
        self.is_premium = false;
        self.touch();
        tracing::info!(user_id = %self.id, "User downgraded from premium");
    }

    pub fn promote_to_expert(&mut self) -> Result<(), DomainError> {
        if self.status != UserStatus::Active {
            return Err(DomainError::Rule("Cannot promote inactive user to expert".into()));
        }
        self.role = UserRole::Expert;
        self.touch();
        tracing::info!(user_id = %self.id, "User promoted to expert");
        Ok(())
    }

    pub fn update_plant_count(&mut self, count: u32) -> Result<(), DomainError> {
        if !self.is_premium && count > FREE_PLANT_LIMIT {
            return Err(DomainError::Rule(format!(
                "Free tier limited to {FREE_PLANT_LIMIT} plants. Upgrade to premium for unlimited plants."
            )));
        }
        self.plant_count = count;
        self.touch();
        Ok(())
    }

    pub fn can_add_plant(&self) -> bool {
        self.is_premium || self.plant_count < FREE_PLANT_LIMIT
    }

    /// `None` means unlimited.
    pub fn remaining_plant_slots(&self) -> Option<u32> {
        if self.is_premium {
            None
        } else {
            Some(FREE_PLANT_LIMIT.saturating_sub(self.plant_count))
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Role at or above `role`.
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role.rank() >= role.rank()
    }

    /// Tier used to scale rate limits.
    pub fn rate_tier(&self) -> UserTier {
        match self.role {
            UserRole::Admin => UserTier::Admin,
            UserRole::Expert => UserTier::Expert,
            _ if self.is_premium => UserTier::PremiumMonthly,
            _ => UserTier::Free,
        }
    }
}

/// Minimal shape check: a local part, `@`, and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let invalid = |message: &str| DomainError::InvalidInput {
        field: "email",
        message: message.to_string(),
    };
    if email.is_empty() {
        return Err(invalid("Email is required"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid("Invalid email format"));
    };
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid("Invalid email format"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("Grower@Example.com", "hash".into()).unwrap()
    }

    #[test]
    fn test_new_user_is_pending_and_normalized() {
        let u = user();
        assert_eq!(u.email, "grower@example.com");
        assert_eq!(u.status, UserStatus::Pending);
        assert!(uuid::Uuid::parse_str(&u.id).is_ok());
        assert!(User::new("not-an-email", "h".into()).is_err());
        assert!(User::new("a@nodot", "h".into()).is_err());
    }

    #[test]
    fn test_activation_requires_verified_email() {
        let mut u = user();
        assert!(u.activate().is_err());
        u.verify_email();
        assert_eq!(u.status, UserStatus::Active);
        assert!(u.email_confirmed_at.is_some());
        u.deactivate(Some("vacation"));
        assert_eq!(u.metadata["deactivation_reason"], "vacation");
        assert!(u.activate().is_ok());
    }

    #[test]
    fn test_verify_email_keeps_suspension() {
        let mut u = user();
        u.suspend("spam", None).unwrap();
        u.verify_email();
        assert_eq!(u.status, UserStatus::Suspended);
        assert!(u.suspend("  ", None).is_err());
    }

    #[test]
    fn test_premium_and_plant_limits() {
        let mut u = user();
        assert!(u.upgrade_to_premium().is_err());
        u.verify_email();

        u.update_plant_count(5).unwrap();
        assert!(!u.can_add_plant());
        assert_eq!(u.remaining_plant_slots(), Some(0));
        assert!(u.update_plant_count(6).is_err());

        u.upgrade_to_premium().unwrap();
        assert_eq!(u.rate_tier(), UserTier::PremiumMonthly);
        u.update_plant_count(40).unwrap();
        assert!(u.can_add_plant());
        assert_eq!(u.remaining_plant_slots(), None);
    }

    #[test]
    fn test_role_hierarchy() {
        let mut u = user();
        u.verify_email();
        u.promote_to_expert().unwrap();
        assert!(u.has_role(UserRole::Premium));
        assert!(!u.has_role(UserRole::Admin));
        assert_eq!(u.role.permission_role(), "expert");
        assert_eq!("premium_user".parse::<UserRole>().unwrap(), UserRole::Premium);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let value = serde_json::to_value(user()).unwrap();
        assert!(value.get("password_hash").is_none());
    }
}
