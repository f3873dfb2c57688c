//! User Service
//!
//! Own profile management, public profiles and the freelancer directory.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    AccountStatus, ProfileUpdate, RatingSummary, ReviewRepository, User, UserFilter,
    UserRepository, UserRole,
};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};

/// User service trait
#[async_trait]
pub trait UserService: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<User, UserError>;

    /// Public profile with the user's rating summary. Banned accounts are
    /// hidden.
    async fn get_profile(&self, user_id: i64) -> Result<(User, RatingSummary), UserError>;

    async fn update_profile(&self, user_id: i64, update: ProfileUpdate) -> Result<User, UserError>;

    /// Active freelancers, optionally filtered by skill or free text.
    async fn search_freelancers(
        &self,
        skill: Option<String>,
        query: Option<String>,
        page: PageRequest,
    ) -> Result<Page<User>, UserError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("Hourly rate must be positive")]
    InvalidHourlyRate,

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => AppError::NotFound(err.to_string()),
            UserError::InvalidHourlyRate => AppError::Validation(err.to_string()),
            UserError::Internal(inner) => inner,
        }
    }
}

pub struct UserServiceImpl<U, R>
where
    U: UserRepository,
    R: ReviewRepository,
{
    user_repo: Arc<U>,
    review_repo: Arc<R>,
}

impl<U, R> UserServiceImpl<U, R>
where
    U: UserRepository,
    R: ReviewRepository,
{
    pub fn new(user_repo: Arc<U>, review_repo: Arc<R>) -> Self {
        Self {
            user_repo,
            review_repo,
        }
    }
}

#[async_trait]
impl<U, R> UserService for UserServiceImpl<U, R>
where
    U: UserRepository + 'static,
    R: ReviewRepository + 'static,
{
    async fn get_user(&self, user_id: i64) -> Result<User, UserError> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn get_profile(&self, user_id: i64) -> Result<(User, RatingSummary), UserError> {
        let user = self.get_user(user_id).await?;
        if user.status == AccountStatus::Banned {
            return Err(UserError::NotFound);
        }
        let rating = self.review_repo.summary(user_id).await?;
        Ok((user, rating))
    }

    async fn update_profile(
        &self,
        user_id: i64,
        mut update: ProfileUpdate,
    ) -> Result<User, UserError> {
        if matches!(update.hourly_rate_cents, Some(rate) if rate <= 0) {
            return Err(UserError::InvalidHourlyRate);
        }
        if let Some(skills) = update.skills.as_mut() {
            normalize_skills(skills);
        }

        // Make sure the account exists before writing
        self.get_user(user_id).await?;
        Ok(self.user_repo.update_profile(user_id, &update).await?)
    }

    async fn search_freelancers(
        &self,
        skill: Option<String>,
        query: Option<String>,
        page: PageRequest,
    ) -> Result<Page<User>, UserError> {
        let filter = UserFilter {
            role: Some(UserRole::Freelancer),
            status: Some(AccountStatus::Active),
            skill: skill.map(|s| s.trim().to_lowercase()),
            query,
        };
        let (users, total) = self.user_repo.search(&filter, page).await?;
        Ok(Page::new(users, page, total))
    }
}

/// Lowercase, trim, drop empties and duplicates, keep first-seen order.
pub fn normalize_skills(skills: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    skills.retain_mut(|s| {
        *s = s.trim().to_lowercase();
        !s.is_empty() && seen.insert(s.clone())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockReviewRepository, MockUserRepository};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_skills() {
        let mut skills = vec![
            " Rust ".to_string(),
            "rust".to_string(),
            "".to_string(),
            "SQL".to_string(),
        ];
        normalize_skills(&mut skills);
        assert_eq!(skills, vec!["rust".to_string(), "sql".to_string()]);
    }

    #[tokio::test]
    async fn test_banned_profile_is_hidden() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_id().returning(|id| {
            Ok(Some(User {
                id,
                status: AccountStatus::Banned,
                ..User::default()
            }))
        });
        let svc = UserServiceImpl::new(Arc::new(users), Arc::new(MockReviewRepository::new()));
        assert!(matches!(svc.get_profile(3).await, Err(UserError::NotFound)));
    }

    #[tokio::test]
    async fn test_profile_includes_rating() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(|id| Ok(Some(User { id, ..User::default() })));
        let mut reviews = MockReviewRepository::new();
        reviews
            .expect_summary()
            .returning(|_| Ok(RatingSummary::from_total(9, 2)));

        let svc = UserServiceImpl::new(Arc::new(users), Arc::new(reviews));
        let (user, rating) = svc.get_profile(3).await.unwrap();
        assert_eq!(user.id, 3);
        assert_eq!(rating.count, 2);
        assert_eq!(rating.average, Some(4.5));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_rate() {
        let svc = UserServiceImpl::new(
            Arc::new(MockUserRepository::new()),
            Arc::new(MockReviewRepository::new()),
        );
        let update = ProfileUpdate {
            hourly_rate_cents: Some(0),
            ..ProfileUpdate::default()
        };
        assert!(matches!(
            svc.update_profile(1, update).await,
            Err(UserError::InvalidHourlyRate)
        ));
    }

    #[tokio::test]
    async fn test_directory_only_lists_active_freelancers() {
        let mut users = MockUserRepository::new();
        users
            .expect_search()
            .withf(|filter, _| {
                filter.role == Some(UserRole::Freelancer)
                    && filter.status == Some(AccountStatus::Active)
                    && filter.skill.as_deref() == Some("rust")
            })
            .returning(|_, _| Ok((vec![], 0)));
        let svc = UserServiceImpl::new(Arc::new(users), Arc::new(MockReviewRepository::new()));
        let page = svc
            .search_freelancers(Some(" Rust".into()), None, PageRequest::new(1, 20))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }
}
