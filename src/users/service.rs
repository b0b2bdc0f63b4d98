//! Account lifecycle: registration, login, verification, role changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{keys, Cache};
use crate::config::PasswordPolicyConfig;
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, EventType};
use crate::observability::metrics;
use crate::security::password::{hash_password, validate_strength, verify_password};
use crate::security::tokens::{Principal, TokenKind, TokenPair, TokenService};
use crate::users::profile::{Profile, ProfileUpdate};
use crate::users::repository::{SubscriptionRepository, UserFilter, UserPage, UserRepository};
use crate::users::subscription::Subscription;
use crate::users::user::{User, UserRole, UserStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatistics {
    pub user_id: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub subscription_tier: String,
    pub is_premium: bool,
    pub plant_count: u32,
    pub remaining_plant_slots: Option<u32>,
    pub can_add_plant: bool,
    pub account_age_days: i64,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// User-facing account operations.
pub struct UserService {
    users: Arc<dyn UserRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    tokens: Arc<TokenService>,
    events: Arc<EventBus>,
    cache: Cache,
    password_policy: PasswordPolicyConfig,
    profile_ttl: Duration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        tokens: Arc<TokenService>,
        events: Arc<EventBus>,
        cache: Cache,
        password_policy: PasswordPolicyConfig,
        profile_ttl: Duration,
    ) -> Self {
        Self {
            users,
            subscriptions,
            tokens,
            events,
            cache,
            password_policy,
            profile_ttl,
        }
    }

    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.users
    }

    pub fn subscription_repository(&self) -> &Arc<dyn SubscriptionRepository> {
        &self.subscriptions
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<User> {
        validate_strength(&self.password_policy, &request.password)?;

        if self.users.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::AlreadyExists {
                resource: "User",
                identifier: request.email.trim().to_ascii_lowercase(),
            });
        }

        let password = request.password;
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))??;

        let user = User::new(&request.email, hash)?;
        let mut profile = Profile::new(&user.id);
        if let Some(name) = request.display_name {
            profile.apply(ProfileUpdate {
                display_name: Some(name),
                ..ProfileUpdate::default()
            })?;
        }
        self.users.create(user.clone(), profile).await?;
        self.subscriptions.save(&Subscription::free(&user.id)).await?;

        metrics::record_user_registered();
        tracing::info!(user_id = %user.id, "User registered");
        self.events
            .emit(
                EventType::UserRegistered,
                &user.id,
                json!({ "email": user.email, "subscription_tier": user.subscription_tier }),
            )
            .await;
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginResult> {
        let invalid = || AppError::Authentication("Invalid email or password".into());

        let Some(mut user) = self.users.find_by_email(email).await? else {
            crate::security_event!("failed_login", reason = "unknown_email", "Login failed");
            return Err(invalid());
        };

        let candidate = password.to_string();
        let hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || verify_password(&candidate, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))?;
        if !verified {
            crate::security_event!("failed_login", user_id = %user.id, reason = "bad_password", "Login failed");
            return Err(invalid());
        }

        match user.status {
            UserStatus::Suspended => {
                crate::security_event!("failed_login", user_id = %user.id, reason = "suspended", "Login by suspended account");
                return Err(AppError::Authentication("Account is suspended".into()));
            }
            UserStatus::Deleted => return Err(invalid()),
            _ => {}
        }

        user.record_login();
        self.users.update(&user).await?;
        let tokens = self.issue_tokens(&user)?;

        tracing::info!(user_id = %user.id, "User logged in");
        self.events
            .emit(EventType::UserLogin, &user.id, json!({ "status": user.status.as_str() }))
            .await;
        Ok(LoginResult { user, tokens })
    }

    /// Exchange a refresh token for a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        let user = self.require(&claims.sub).await?;
        if matches!(user.status, UserStatus::Suspended | UserStatus::Deleted) {
            return Err(AppError::Authentication("Account is not active".into()));
        }
        self.issue_tokens(&user)
    }

    pub fn issue_tokens(&self, user: &User) -> AppResult<TokenPair> {
        let tier = user.rate_tier();
        self.tokens.issue_pair(&Principal {
            user_id: &user.id,
            email: &user.email,
            role: user.role.permission_role(),
            tier: tier.as_str(),
        })
    }

    pub async fn get_user(&self, user_id: &str) -> AppResult<User> {
        self.require(user_id).await
    }

    async fn require(&self, user_id: &str) -> AppResult<User> {
        self.users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))
    }

    async fn save(&self, user: &User) -> AppResult<()> {
        self.users.update(user).await?;
        self.cache.delete(&keys::user_profile(&user.id));
        Ok(())
    }

    pub async fn verify_email(&self, user_id: &str) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        if user.email_verified {
            return Ok(user);
        }
        user.verify_email();
        self.save(&user).await?;
        self.events
            .emit(EventType::UserEmailVerified, &user.id, json!({ "email": user.email }))
            .await;
        Ok(user)
    }

    pub async fn activate(&self, user_id: &str) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        user.activate()?;
        self.save(&user).await?;
        self.events.emit(EventType::UserActivated, &user.id, json!({})).await;
        Ok(user)
    }

    pub async fn deactivate(&self, user_id: &str, reason: Option<&str>) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        user.deactivate(reason);
        self.save(&user).await?;
        self.events
            .emit(EventType::UserDeactivated, &user.id, json!({ "reason": reason }))
            .await;
        Ok(user)
    }

    pub async fn suspend(
        &self,
        user_id: &str,
        reason: &str,
        until: Option<DateTime<Utc>>,
    ) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        user.suspend(reason, until)?;
        self.save(&user).await?;
        crate::security_event!("user_suspended", user_id = %user.id, reason, "Account suspended");
        self.events
            .emit(EventType::UserSuspended, &user.id, json!({ "reason": reason, "until": until }))
            .await;
        Ok(user)
    }

    pub async fn upgrade_to_premium(&self, user_id: &str) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        user.upgrade_to_premium()?;
        self.save(&user).await?;
        self.events
            .emit(
                EventType::UserSubscriptionChanged,
                &user.id,
                json!({ "from": "free", "to": user.subscription_tier }),
            )
            .await;
        Ok(user)
    }

    /// Rejected while the user owns more plants than the free tier allows.
    pub async fn downgrade_from_premium(&self, user_id: &str) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        if user.plant_count > crate::users::user::FREE_PLANT_LIMIT {
            return Err(AppError::BusinessRule(format!(
                "Cannot downgrade with {} plants. Free tier is limited to {} plants.",
                user.plant_count,
                crate::users::user::FREE_PLANT_LIMIT
            )));
        }
        let from = user.subscription_tier.clone();
        user.downgrade_from_premium();
        self.save(&user).await?;
        self.events
            .emit(
                EventType::UserSubscriptionChanged,
                &user.id,
                json!({ "from": from, "to": "free" }),
            )
            .await;
        Ok(user)
    }

    pub async fn promote_to_expert(&self, user_id: &str) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        user.promote_to_expert()?;
        self.save(&user).await?;
        Ok(user)
    }

    pub async fn update_plant_count(&self, user_id: &str, count: u32) -> AppResult<User> {
        let mut user = self.require(user_id).await?;
        user.update_plant_count(count)?;
        self.save(&user).await?;
        Ok(user)
    }

    pub async fn can_add_plant(&self, user_id: &str) -> AppResult<bool> {
        Ok(self.require(user_id).await?.can_add_plant())
    }

    /// Profile, read through the cache.
    pub async fn profile(&self, user_id: &str) -> AppResult<Profile> {
        let key = keys::user_profile(user_id);
        if let Some(profile) = self.cache.get_json::<Profile>(&key) {
            return Ok(profile);
        }
        let profile = self
            .users
            .profile(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Profile", user_id))?;
        if let Err(e) = self.cache.set_json(&key, &profile, Some(self.profile_ttl)) {
            tracing::warn!(error = %e, "Failed to cache profile");
        }
        Ok(profile)
    }

    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> AppResult<Profile> {
        let mut profile = self
            .users
            .profile(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Profile", user_id))?;
        profile.apply(update)?;
        self.users.save_profile(&profile).await?;
        self.cache.delete(&keys::user_profile(user_id));
        Ok(profile)
    }

    pub async fn user_statistics(&self, user_id: &str) -> AppResult<UserStatistics> {
        let user = self.require(user_id).await?;
        Ok(UserStatistics {
            user_id: user.id.clone(),
            role: user.role,
            status: user.status,
            subscription_tier: user.subscription_tier.clone(),
            is_premium: user.is_premium,
            plant_count: user.plant_count,
            remaining_plant_slots: user.remaining_plant_slots(),
            can_add_plant: user.can_add_plant(),
            account_age_days: (Utc::now() - user.created_at).num_days(),
            email_verified: user.email_verified,
            last_login_at: user.last_login_at,
        })
    }

    pub async fn list_users(&self, filter: &UserFilter) -> AppResult<UserPage> {
        self.users.list(filter).await
    }

    pub async fn count_by_status(&self) -> AppResult<BTreeMap<String, usize>> {
        self.users.count_by_status().await
    }

    /// Active users with care reminders switched on.
    pub async fn reminder_recipients(&self) -> AppResult<Vec<String>> {
        let mut recipients = Vec::new();
        for id in self.users.ids_with_status(UserStatus::Active).await? {
            if let Some(profile) = self.users.profile(&id).await? {
                if profile.notification_settings.wants_care_reminders() {
                    recipients.push(id);
                }
            }
        }
        recipients.sort();
        Ok(recipients)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{EventBusConfig, SecurityConfig};
    use crate::users::repository::{InMemorySubscriptionRepository, InMemoryUserRepository};

    pub(crate) const PASSWORD: &str = "Green!Leaf9x";

    pub(crate) fn service() -> (UserService, Arc<EventBus>) {
        let events = Arc::new(EventBus::new(EventBusConfig::default()));
        let service = UserService::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemorySubscriptionRepository::new()),
            Arc::new(TokenService::new(&SecurityConfig::default())),
            events.clone(),
            Cache::new(),
            PasswordPolicyConfig::default(),
            Duration::from_secs(300),
        );
        (service, events)
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: PASSWORD.into(),
            display_name: Some("Ivy".into()),
        }
    }

    #[tokio::test]
    async fn test_register_creates_profile_and_subscription() {
        let (service, events) = service();
        let user = service.register(request("ivy@example.com")).await.unwrap();
        assert_eq!(user.status, UserStatus::Pending);
        assert_eq!(service.profile(&user.id).await.unwrap().display(), "Ivy");
        assert!(service.subscriptions.get_by_user(&user.id).await.unwrap().is_some());

        let stored = events.replay(Some(EventType::UserRegistered), None, None, 10);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].user_id.as_deref(), Some(user.id.as_str()));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_weak_passwords() {
        let (service, _) = service();
        service.register(request("ivy@example.com")).await.unwrap();
        let dup = service.register(request("IVY@example.com")).await.unwrap_err();
        assert!(matches!(dup, AppError::AlreadyExists { .. }));

        let weak = service
            .register(RegisterRequest {
                email: "weak@example.com".into(),
                password: "password".into(),
                display_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(weak, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_login_and_refresh() {
        let (service, _) = service();
        let user = service.register(request("ivy@example.com")).await.unwrap();

        let bad = service.login("ivy@example.com", "Wrong!Pass1").await.unwrap_err();
        assert!(matches!(bad, AppError::Authentication(_)));

        let result = service.login("ivy@example.com", PASSWORD).await.unwrap();
        assert!(result.user.last_login_at.is_some());

        let pair = service.refresh(&result.tokens.refresh_token).await.unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert!(service.refresh(&result.tokens.access_token).await.is_err());

        service.suspend(&user.id, "abuse", None).await.unwrap();
        assert!(service.login("ivy@example.com", PASSWORD).await.is_err());
        assert!(service.refresh(&result.tokens.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_premium_downgrade_guard() {
        let (service, _) = service();
        let user = service.register(request("ivy@example.com")).await.unwrap();
        assert!(service.upgrade_to_premium(&user.id).await.is_err());

        service.verify_email(&user.id).await.unwrap();
        service.upgrade_to_premium(&user.id).await.unwrap();
        service.update_plant_count(&user.id, 8).await.unwrap();
        let err = service.downgrade_from_premium(&user.id).await.unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));

        service.update_plant_count(&user.id, 4).await.unwrap();
        let user = service.downgrade_from_premium(&user.id).await.unwrap();
        assert!(!user.is_premium);
        assert!(service.can_add_plant(&user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_profile_cache_invalidated_on_update() {
        let (service, _) = service();
        let user = service.register(request("ivy@example.com")).await.unwrap();
        service.profile(&user.id).await.unwrap();
        assert!(service.cache.exists(&keys::user_profile(&user.id)));

        service
            .update_profile(
                &user.id,
                ProfileUpdate {
                    bio: Some("Mostly ferns".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(!service.cache.exists(&keys::user_profile(&user.id)));
        assert_eq!(
            service.profile(&user.id).await.unwrap().bio.as_deref(),
            Some("Mostly ferns")
        );
    }

    #[tokio::test]
    async fn test_reminder_recipients() {
        let (service, _) = service();
        let a = service.register(request("a@example.com")).await.unwrap();
        let b = service.register(request("b@example.com")).await.unwrap();
        service.verify_email(&a.id).await.unwrap();
        service.verify_email(&b.id).await.unwrap();

        let mut settings = service.profile(&b.id).await.unwrap().notification_settings;
        settings.watering_reminders = false;
        settings.fertilizing_reminders = false;
        settings.repotting_reminders = false;
        service
            .update_profile(
                &b.id,
                ProfileUpdate {
                    notification_settings: Some(settings),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(service.reminder_recipients().await.unwrap(), vec![a.id]);
    }
}
