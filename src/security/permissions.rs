//! Role → resource → action permission matrix.

/// Resources owned by a single user.
const PERSONAL_RESOURCES: &[&str] = &["plants", "care", "growth", "notifications", "profile"];

/// Resources only paying or elevated roles may touch.
const PREMIUM_RESOURCES: &[&str] = &["ai_features", "analytics", "family_sharing"];

const CRUD: &[&str] = &["read", "create", "update", "delete"];
const CRU: &[&str] = &["read", "create", "update"];
const RC: &[&str] = &["read", "create"];
const RU: &[&str] = &["read", "update"];

/// Actions `role` may perform on `resource`.
pub fn allowed_actions(role: &str, resource: &str) -> &'static [&'static str] {
    match (role, resource) {
        ("user", "plants" | "care") => CRUD,
        ("user", "growth") => CRU,
        ("user", "community") => RC,
        ("user", "notifications" | "profile") => RU,

        ("premium_user", "plants" | "care" | "growth" | "health" | "community") => CRUD,
        ("premium_user", "family_sharing") => CRUD,
        ("premium_user", "ai_features") => RC,
        ("premium_user", "analytics") => &["read"],
        ("premium_user", "notifications") => &["read", "update", "create"],
        ("premium_user", "profile") => RU,

        ("expert", "plants" | "care" | "expert_advice" | "content") => CRU,
        ("expert", "community") => &["read", "create", "update", "moderate"],
        ("expert", "profile") => RU,

        ("admin", "plants" | "users" | "content" | "system") => CRUD,
        ("admin", "community") => &["read", "create", "update", "delete", "moderate"],
        ("admin", "analytics") => CRU,
        ("admin", "profile") => RU,

        _ => &[],
    }
}

/// Matrix lookup only.
pub fn check_permission(role: &str, resource: &str, action: &str) -> bool {
    allowed_actions(role, resource).contains(&action)
}

/// Why an access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    ActionNotPermitted,
    OwnershipViolation,
    PremiumFeatureRequired,
}

impl Denial {
    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::ActionNotPermitted => "action_not_permitted",
            Denial::OwnershipViolation => "ownership_violation",
            Denial::PremiumFeatureRequired => "premium_feature_required",
        }
    }
}

/// Full check: matrix, ownership of personal resources, premium gating.
///
/// Every denial is written to the security log.
pub fn authorize(
    role: &str,
    resource: &str,
    action: &str,
    user_id: &str,
    owner_id: Option<&str>,
) -> Result<(), Denial> {
    let denial = if !check_permission(role, resource, action) {
        Some(Denial::ActionNotPermitted)
    } else if PERSONAL_RESOURCES.contains(&resource)
        && owner_id.is_some_and(|owner| owner != user_id)
        && role != "admin"
    {
        Some(Denial::OwnershipViolation)
    } else if PREMIUM_RESOURCES.contains(&resource)
        && !matches!(role, "premium_user" | "expert" | "admin")
    {
        Some(Denial::PremiumFeatureRequired)
    } else {
        None
    };

    match denial {
        None => Ok(()),
        Some(reason) => {
            crate::security_event!(
                "permission_denied",
                user_id = %user_id,
                role = %role,
                resource = %resource,
                action = %action,
                reason = reason.as_str(),
                "Permission denied"
            );
            Err(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix() {
        assert!(check_permission("user", "plants", "delete"));
        assert!(!check_permission("user", "growth", "delete"));
        assert!(!check_permission("user", "analytics", "read"));
        assert!(check_permission("premium_user", "analytics", "read"));
        assert!(check_permission("expert", "community", "moderate"));
        assert!(!check_permission("expert", "plants", "delete"));
        assert!(check_permission("admin", "system", "delete"));
        assert!(!check_permission("ghost", "plants", "read"));
    }

    #[test]
    fn test_ownership() {
        assert_eq!(authorize("user", "plants", "read", "u1", Some("u1")), Ok(()));
        assert_eq!(
            authorize("user", "plants", "read", "u1", Some("u2")),
            Err(Denial::OwnershipViolation)
        );
        assert_eq!(authorize("admin", "plants", "read", "a1", Some("u2")), Ok(()));
        // community is shared, no ownership check
        assert_eq!(authorize("user", "community", "read", "u1", Some("u2")), Ok(()));
    }

    #[test]
    fn test_denied_action() {
        assert_eq!(
            authorize("user", "users", "read", "u1", None),
            Err(Denial::ActionNotPermitted)
        );
        assert_eq!(authorize("premium_user", "ai_features", "create", "p1", None), Ok(()));
    }
}
