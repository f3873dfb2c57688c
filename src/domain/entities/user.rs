//! User entity and repository trait.
//!
//! Maps to the `users` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    /// Marketplace role. ADMIN accounts are created by the seed tool or by
    /// another admin, never through registration.
    pub enum UserRole {
        Client => "client",
        Freelancer => "freelancer",
        Admin => "admin",
    }
}

string_enum! {
    /// Moderation status of an account.
    pub enum AccountStatus {
        Active => "active",
        Suspended => "suspended",
        Banned => "banned",
    }
}

/// Represents a user account.
///
/// Maps to the `users` table:
/// - id: BIGINT PRIMARY KEY (Snowflake ID)
/// - email: VARCHAR(255) NOT NULL UNIQUE
/// - username: VARCHAR(32) NOT NULL UNIQUE
/// - password_hash: VARCHAR(255) NOT NULL
/// - role / status: VARCHAR with CHECK constraints
/// - skills: TEXT[] NOT NULL DEFAULT '{}'
/// - hourly_rate_cents: BIGINT NULL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,

    /// Argon2 password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub skills: Vec<String>,
    pub hourly_rate_cents: Option<i64>,
    pub role: UserRole,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Get the user's display name, falling back to username if not set.
    pub fn display_name_or_username(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// Suspended and banned accounts cannot authenticate.
    pub fn can_login(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_freelancer(&self) -> bool {
        self.role == UserRole::Freelancer
    }

    pub fn is_client(&self) -> bool {
        self.role == UserRole::Client
    }
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            email: String::new(),
            username: String::new(),
            password_hash: String::new(),
            display_name: None,
            bio: None,
            avatar_url: None,
            skills: Vec::new(),
            hourly_rate_cents: None,
            role: UserRole::Client,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Profile fields a user may change about themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub skills: Option<Vec<String>>,
    pub hourly_rate_cents: Option<i64>,
}

/// Admin and directory search filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub status: Option<AccountStatus>,
    pub skill: Option<String>,
    /// Case-insensitive match on username, display name or email
    pub query: Option<String>,
}

/// Repository trait for User data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AppError>;

    async fn username_exists(&self, username: &str) -> Result<bool, AppError>;

    async fn create(&self, user: &User) -> Result<User, AppError>;

    /// Apply the non-`None` fields of `update`.
    async fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<User, AppError>;

    /// Returns `None` if the user does not exist.
    async fn set_status(&self, id: i64, status: AccountStatus) -> Result<Option<User>, AppError>;

    /// Filtered search returning one page and the total match count.
    async fn search(&self, filter: &UserFilter, page: PageRequest)
        -> Result<(Vec<User>, i64), AppError>;

    async fn count_by_role(&self) -> Result<Vec<(UserRole, i64)>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_login() {
        let mut user = User::default();
        assert!(user.can_login());
        user.status = AccountStatus::Suspended;
        assert!(!user.can_login());
        user.status = AccountStatus::Banned;
        assert!(!user.can_login());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&UserRole::Freelancer).unwrap(), "\"FREELANCER\"");
        assert_eq!(UserRole::Freelancer.as_str(), "freelancer");
        let parsed: UserRole = serde_json::from_str("\"CLIENT\"").unwrap();
        assert_eq!(parsed, UserRole::Client);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            password_hash: "secret-hash".into(),
            ..User::default()
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
