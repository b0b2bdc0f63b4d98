//! Storage seams for users, profiles and subscriptions.
//!
//! The in-memory implementations back the service by default and in tests.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::users::profile::Profile;
use crate::users::subscription::Subscription;
use crate::users::user::{User, UserRole, UserStatus};

/// Admin listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
    /// Case-insensitive substring of the email.
    pub search: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl UserFilter {
    fn matches(&self, user: &User) -> bool {
        self.status.map_or(true, |s| user.status == s)
            && self.role.map_or(true, |r| user.role == r)
            && self
                .search
                .as_deref()
                .map_or(true, |q| user.email.contains(&q.to_ascii_lowercase()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: usize,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user with their profile. Fails on a taken email.
    async fn create(&self, user: User, profile: Profile) -> AppResult<()>;

    async fn get(&self, user_id: &str) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn update(&self, user: &User) -> AppResult<()>;

    async fn profile(&self, user_id: &str) -> AppResult<Option<Profile>>;

    async fn save_profile(&self, profile: &Profile) -> AppResult<()>;

    /// Newest first.
    async fn list(&self, filter: &UserFilter) -> AppResult<UserPage>;

    async fn ids_with_status(&self, status: UserStatus) -> AppResult<Vec<String>>;

    async fn count_by_status(&self) -> AppResult<BTreeMap<String, usize>>;

    async fn ping(&self) -> bool;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_by_user(&self, user_id: &str) -> AppResult<Option<Subscription>>;

    async fn save(&self, subscription: &Subscription) -> AppResult<()>;

    async fn user_ids(&self) -> AppResult<Vec<String>>;
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<String, User>,
    profiles: DashMap<String, Profile>,
    /// email → user id
    emails: DashMap<String, String>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User, profile: Profile) -> AppResult<()> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::AlreadyExists {
                    resource: "User",
                    identifier: user.email,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
            }
        }
        self.profiles.insert(user.id.clone(), profile);
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> AppResult<Option<User>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.trim().to_ascii_lowercase();
        let Some(id) = self.emails.get(&email).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.get(&id).await
    }

    async fn update(&self, user: &User) -> AppResult<()> {
        match self.users.get_mut(&user.id) {
            Some(mut existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(AppError::not_found("User", &user.id)),
        }
    }

    async fn profile(&self, user_id: &str) -> AppResult<Option<Profile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    async fn save_profile(&self, profile: &Profile) -> AppResult<()> {
        if !self.users.contains_key(&profile.user_id) {
            return Err(AppError::not_found("User", &profile.user_id));
        }
        self.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn list(&self, filter: &UserFilter) -> AppResult<UserPage> {
        let mut matched: Vec<User> = self
            .users
            .iter()
            .filter(|u| filter.matches(u.value()))
            .map(|u| u.value().clone())
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = matched.len();
        let limit = if filter.limit == 0 { total } else { filter.limit };
        let users = matched.into_iter().skip(filter.offset).take(limit).collect();
        Ok(UserPage { users, total })
    }

    async fn ids_with_status(&self, status: UserStatus) -> AppResult<Vec<String>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.status == status)
            .map(|u| u.id.clone())
            .collect())
    }

    async fn count_by_status(&self) -> AppResult<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for user in self.users.iter() {
            *counts.entry(user.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    by_user: DashMap<String, Subscription>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn get_by_user(&self, user_id: &str) -> AppResult<Option<Subscription>> {
        Ok(self.by_user.get(user_id).map(|s| s.clone()))
    }

    async fn save(&self, subscription: &Subscription) -> AppResult<()> {
        self.by_user
            .insert(subscription.user_id.clone(), subscription.clone());
        Ok(())
    }

    async fn user_ids(&self) -> AppResult<Vec<String>> {
        Ok(self.by_user.iter().map(|s| s.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> (User, Profile) {
        let user = User::new(email, "hash".into()).unwrap();
        let profile = Profile::new(&user.id);
        (user, profile)
    }

    #[tokio::test]
    async fn test_email_uniqueness() {
        let repo = InMemoryUserRepository::new();
        let (a, pa) = new_user("fern@example.com");
        let (b, pb) = new_user("FERN@example.com");
        repo.create(a.clone(), pa).await.unwrap();
        let err = repo.create(b, pb).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists { .. }));

        let found = repo.find_by_email(" Fern@Example.com ").await.unwrap().unwrap();
        assert_eq!(found.id, a.id);
        assert!(repo.profile(&a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let repo = InMemoryUserRepository::new();
        let (user, _) = new_user("moss@example.com");
        assert!(matches!(repo.update(&user).await, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let repo = InMemoryUserRepository::new();
        for i in 0..5 {
            let (mut user, profile) = new_user(&format!("user{i}@example.com"));
            if i % 2 == 0 {
                user.verify_email();
            }
            repo.create(user, profile).await.unwrap();
        }

        let active = repo
            .list(&UserFilter {
                status: Some(UserStatus::Active),
                ..UserFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(active.total, 3);

        let page = repo
            .list(&UserFilter {
                offset: 1,
                limit: 2,
                ..UserFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.users.len(), 2);

        let search = repo
            .list(&UserFilter {
                search: Some("USER3".into()),
                ..UserFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(search.total, 1);

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts["active"], 3);
        assert_eq!(counts["pending"], 2);
    }
}
