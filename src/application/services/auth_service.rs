//! Authentication Service
//!
//! Handles registration, login, JWT access tokens and rotating refresh
//! sessions.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::JwtSettings;
use crate::domain::{AccountStatus, Session, SessionRepository, User, UserRepository, UserRole};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// Authentication service trait for dependency injection
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Register a new CLIENT or FREELANCER account
    async fn register(&self, input: RegisterInput) -> Result<(User, AuthTokens), AuthError>;

    /// Authenticate user with credentials
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, AuthTokens), AuthError>;

    /// Exchange a refresh token for a new token pair (rotation)
    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;

    /// Revoke refresh token (logout)
    async fn revoke_token(&self, refresh_token: &str) -> Result<(), AuthError>;

    /// Validate an access token and return the user it belongs to, provided
    /// the account is still active
    async fn authenticate_token(&self, access_token: &str) -> Result<User, AuthError>;
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: UserRole,
    pub display_name: Option<String>,
}

/// Authentication tokens response
#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Role at issue time
    pub role: UserRole,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Account is {0}")]
    AccountDisabled(AccountStatus),

    #[error("Admin accounts cannot be self-registered")]
    RoleNotAllowed,

    #[error("Email already exists")]
    EmailExists,

    #[error("Username already exists")]
    UsernameExists,

    #[error("Session not found or expired")]
    SessionNotFound,

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::SessionNotFound => AppError::Unauthorized(err.to_string()),
            AuthError::AccountDisabled(_) => AppError::Forbidden(err.to_string()),
            AuthError::RoleNotAllowed => AppError::BadRequest(err.to_string()),
            AuthError::EmailExists | AuthError::UsernameExists => {
                AppError::Conflict(err.to_string())
            }
            AuthError::Internal(inner) => inner,
        }
    }
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// AuthService implementation
pub struct AuthServiceImpl<U, S>
where
    U: UserRepository,
    S: SessionRepository,
{
    user_repo: Arc<U>,
    session_repo: Arc<S>,
    id_generator: Arc<SnowflakeGenerator>,
    jwt_settings: JwtSettings,
}

impl<U, S> AuthServiceImpl<U, S>
where
    U: UserRepository,
    S: SessionRepository,
{
    pub fn new(
        user_repo: Arc<U>,
        session_repo: Arc<S>,
        id_generator: Arc<SnowflakeGenerator>,
        jwt_settings: JwtSettings,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            id_generator,
            jwt_settings,
        }
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user: &User) -> Result<AuthTokens, AuthError> {
        let now = Utc::now();
        let access_expiry = now + Duration::minutes(self.jwt_settings.access_token_expiry_minutes);

        let access_claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            exp: access_expiry.timestamp(),
            iat: now.timestamp(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_settings.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Opaque refresh token: two random UUIDs, no user data inside
        let refresh_token = format!("{}.{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());

        Ok(AuthTokens {
            access_token,
            refresh_token,
            expires_in: self.jwt_settings.access_token_expiry_minutes * 60,
            token_type: "Bearer".to_string(),
        })
    }

    fn hash_refresh_token(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn decode_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_settings.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

        Ok(token_data.claims)
    }

    async fn start_session(&self, user: &User) -> Result<AuthTokens, AuthError> {
        let tokens = self.generate_tokens(user)?;
        let session = Session::new(
            user.id,
            self.hash_refresh_token(&tokens.refresh_token),
            Utc::now() + Duration::days(self.jwt_settings.refresh_token_expiry_days),
        );
        self.session_repo.create(&session).await?;
        Ok(tokens)
    }

    fn ensure_active(user: &User) -> Result<(), AuthError> {
        if user.can_login() {
            Ok(())
        } else {
            Err(AuthError::AccountDisabled(user.status))
        }
    }
}

#[async_trait]
impl<U, S> AuthService for AuthServiceImpl<U, S>
where
    U: UserRepository + 'static,
    S: SessionRepository + 'static,
{
    async fn register(&self, input: RegisterInput) -> Result<(User, AuthTokens), AuthError> {
        if input.role == UserRole::Admin {
            return Err(AuthError::RoleNotAllowed);
        }

        let email = input.email.trim().to_lowercase();
        if self.user_repo.email_exists(&email).await? {
            return Err(AuthError::EmailExists);
        }
        if self.user_repo.username_exists(&input.username).await? {
            return Err(AuthError::UsernameExists);
        }

        let now = Utc::now();
        let user = User {
            id: self.id_generator.generate(),
            email,
            username: input.username,
            password_hash: hash_password(&input.password)?,
            display_name: input.display_name,
            role: input.role,
            created_at: now,
            updated_at: now,
            ..User::default()
        };

        let created = self.user_repo.create(&user).await?;
        let tokens = self.start_session(&created).await?;

        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok((created, tokens))
    }

    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, AuthTokens), AuthError> {
        let user = self
            .user_repo
            .find_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        Self::ensure_active(&user)?;

        let tokens = self.start_session(&user).await?;
        Ok((user, tokens))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let token_hash = self.hash_refresh_token(refresh_token);

        let session = self
            .session_repo
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if !session.is_active() {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .user_repo
            .find_by_id(session.user_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        Self::ensure_active(&user)?;

        // Rotate: the presented refresh token stops working
        let tokens = self.generate_tokens(&user)?;
        let new_hash = self.hash_refresh_token(&tokens.refresh_token);
        let expires_at = Utc::now() + Duration::days(self.jwt_settings.refresh_token_expiry_days);
        self.session_repo
            .rotate(session.id, &new_hash, expires_at)
            .await?;

        Ok(tokens)
    }

    async fn revoke_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        let token_hash = self.hash_refresh_token(refresh_token);

        let session = self
            .session_repo
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        self.session_repo.revoke(session.id).await?;
        Ok(())
    }

    async fn authenticate_token(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self.decode_access_token(access_token)?;
        let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        Self::ensure_active(&user)?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockSessionRepository, MockUserRepository};

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-that-is-definitely-long-enough".into(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 30,
        }
    }

    fn service(
        users: MockUserRepository,
        sessions: MockSessionRepository,
    ) -> AuthServiceImpl<MockUserRepository, MockSessionRepository> {
        AuthServiceImpl::new(
            Arc::new(users),
            Arc::new(sessions),
            Arc::new(SnowflakeGenerator::new(1, 1)),
            jwt_settings(),
        )
    }

    fn input(role: UserRole) -> RegisterInput {
        RegisterInput {
            email: "Ada@Example.com".into(),
            username: "ada".into(),
            password: "correct horse battery".into(),
            role,
            display_name: None,
        }
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(verify_password("hunter2hunter2", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_admin_role() {
        let svc = service(MockUserRepository::new(), MockSessionRepository::new());
        let err = svc.register(input(UserRole::Admin)).await.unwrap_err();
        assert!(matches!(err, AuthError::RoleNotAllowed));
    }

    #[tokio::test]
    async fn test_register_normalizes_email_and_issues_tokens() {
        let mut users = MockUserRepository::new();
        users
            .expect_email_exists()
            .withf(|email| email == "ada@example.com")
            .returning(|_| Ok(false));
        users.expect_username_exists().returning(|_| Ok(false));
        users.expect_create().returning(|u| Ok(u.clone()));
        let mut sessions = MockSessionRepository::new();
        sessions.expect_create().times(1).returning(|s| Ok(s.clone()));

        let svc = service(users, sessions);
        let (user, tokens) = svc.register(input(UserRole::Freelancer)).await.unwrap();

        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, UserRole::Freelancer);
        assert_eq!(tokens.token_type, "Bearer");

        // The issued access token resolves back to the user
        let claims = svc.decode_access_token(&tokens.access_token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, UserRole::Freelancer);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let mut users = MockUserRepository::new();
        users.expect_email_exists().returning(|_| Ok(true));
        let svc = service(users, MockSessionRepository::new());
        let err = svc.register(input(UserRole::Client)).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_suspended_user_cannot_login() {
        let hash = hash_password("correct horse battery").unwrap();
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(move |_| {
            Ok(Some(User {
                id: 5,
                password_hash: hash.clone(),
                status: AccountStatus::Suspended,
                ..User::default()
            }))
        });
        let svc = service(users, MockSessionRepository::new());

        let err = svc
            .authenticate("ada@example.com", "correct horse battery")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountDisabled(AccountStatus::Suspended)));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let hash = hash_password("correct horse battery").unwrap();
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(move |_| {
            Ok(Some(User {
                password_hash: hash.clone(),
                ..User::default()
            }))
        });
        let svc = service(users, MockSessionRepository::new());

        let err = svc.authenticate("a@b.c", "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let svc = service(MockUserRepository::new(), MockSessionRepository::new());
        let err = svc.authenticate_token("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
