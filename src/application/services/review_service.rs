//! Review Service
//!
//! Ratings left by the participants of completed projects and orders.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::application::events::Notifier;
use crate::application::Actor;
use crate::domain::{
    NotificationKind, OrderRepository, OrderStatus, ProjectRepository, ProjectStatus, Review,
    ReviewRepository, ReviewSubject, MAX_RATING, MIN_RATING,
};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::snowflake::SnowflakeGenerator;

#[async_trait]
pub trait ReviewService: Send + Sync {
    async fn create_review(&self, actor: Actor, input: ReviewInput) -> Result<Review, ReviewError>;

    async fn reviews_for(&self, user_id: i64, page: PageRequest)
        -> Result<Page<Review>, ReviewError>;
}

#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub subject: ReviewSubject,
    pub rating: i16,
    pub comment: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Project or order not found")]
    SubjectNotFound,

    #[error("Only participants can review")]
    NotParticipant,

    #[error("Reviews open once the work is completed")]
    NotCompleted,

    #[error("You already reviewed this")]
    AlreadyReviewed,

    #[error("Rating must be between {min} and {max}", min = MIN_RATING, max = MAX_RATING)]
    InvalidRating,

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::SubjectNotFound => AppError::NotFound(err.to_string()),
            ReviewError::NotParticipant => AppError::Forbidden(err.to_string()),
            ReviewError::NotCompleted | ReviewError::AlreadyReviewed => {
                AppError::Conflict(err.to_string())
            }
            ReviewError::InvalidRating => AppError::Validation(err.to_string()),
            ReviewError::Internal(inner) => inner,
        }
    }
}

pub struct ReviewServiceImpl<R, P, O>
where
    R: ReviewRepository,
    P: ProjectRepository,
    O: OrderRepository,
{
    review_repo: Arc<R>,
    project_repo: Arc<P>,
    order_repo: Arc<O>,
    notifier: Notifier,
    id_generator: Arc<SnowflakeGenerator>,
}

impl<R, P, O> ReviewServiceImpl<R, P, O>
where
    R: ReviewRepository,
    P: ProjectRepository,
    O: OrderRepository,
{
    pub fn new(
        review_repo: Arc<R>,
        project_repo: Arc<P>,
        order_repo: Arc<O>,
        notifier: Notifier,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            review_repo,
            project_repo,
            order_repo,
            notifier,
            id_generator,
        }
    }

    /// Resolve who the actor is reviewing, checking completion and
    /// participation.
    async fn reviewee(&self, actor: Actor, subject: ReviewSubject) -> Result<i64, ReviewError> {
        match subject {
            ReviewSubject::Project(id) => {
                let project = self
                    .project_repo
                    .find_by_id(id)
                    .await?
                    .ok_or(ReviewError::SubjectNotFound)?;
                let other = project
                    .counterparty(actor.user_id)
                    .ok_or(ReviewError::NotParticipant)?;
                if project.status != ProjectStatus::Completed {
                    return Err(ReviewError::NotCompleted);
                }
                Ok(other)
            }
            ReviewSubject::Order(id) => {
                let order = self
                    .order_repo
                    .find_by_id(id)
                    .await?
                    .ok_or(ReviewError::SubjectNotFound)?;
                let other = order
                    .counterparty(actor.user_id)
                    .ok_or(ReviewError::NotParticipant)?;
                if order.status != OrderStatus::Completed {
                    return Err(ReviewError::NotCompleted);
                }
                Ok(other)
            }
        }
    }
}

#[async_trait]
impl<R, P, O> ReviewService for ReviewServiceImpl<R, P, O>
where
    R: ReviewRepository + 'static,
    P: ProjectRepository + 'static,
    O: OrderRepository + 'static,
{
    async fn create_review(&self, actor: Actor, input: ReviewInput) -> Result<Review, ReviewError> {
        if !(MIN_RATING..=MAX_RATING).contains(&input.rating) {
            return Err(ReviewError::InvalidRating);
        }
        let reviewee_id = self.reviewee(actor, input.subject).await?;
        if self.review_repo.exists(actor.user_id, input.subject).await? {
            return Err(ReviewError::AlreadyReviewed);
        }

        let (project_id, order_id) = match input.subject {
            ReviewSubject::Project(id) => (Some(id), None),
            ReviewSubject::Order(id) => (None, Some(id)),
        };
        let review = Review {
            id: self.id_generator.generate(),
            reviewer_id: actor.user_id,
            reviewee_id,
            project_id,
            order_id,
            rating: input.rating,
            comment: input.comment.trim().to_string(),
            created_at: Utc::now(),
        };
        let created = self.review_repo.create(&review).await?;

        self.notifier
            .notify(
                reviewee_id,
                NotificationKind::ReviewReceived,
                "New review",
                format!("You received a {}-star review.", created.rating),
                Some(format!("/users/{}", reviewee_id)),
            )
            .await;
        Ok(created)
    }

    async fn reviews_for(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Page<Review>, ReviewError> {
        let (items, total) = self.review_repo.list_for_user(user_id, page).await?;
        Ok(Page::new(items, page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::test_support::silent_notifier;
    use crate::domain::{
        MockOrderRepository, MockProjectRepository, MockReviewRepository, Project, UserRole,
    };

    fn service(
        reviews: MockReviewRepository,
        projects: MockProjectRepository,
    ) -> ReviewServiceImpl<MockReviewRepository, MockProjectRepository, MockOrderRepository> {
        ReviewServiceImpl::new(
            Arc::new(reviews),
            Arc::new(projects),
            Arc::new(MockOrderRepository::new()),
            silent_notifier(),
            Arc::new(SnowflakeGenerator::new(1, 1)),
        )
    }

    fn project(status: ProjectStatus) -> Project {
        Project {
            id: 3,
            client_id: 1,
            freelancer_id: Some(2),
            status,
            ..Project::default()
        }
    }

    fn input(rating: i16) -> ReviewInput {
        ReviewInput {
            subject: ReviewSubject::Project(3),
            rating,
            comment: "Great work".into(),
        }
    }

    #[tokio::test]
    async fn test_rating_bounds() {
        for (rating, ok) in [(0, false), (1, true), (5, true), (6, false)] {
            let mut projects = MockProjectRepository::new();
            projects
                .expect_find_by_id()
                .returning(|_| Ok(Some(project(ProjectStatus::Completed))));
            let mut reviews = MockReviewRepository::new();
            reviews.expect_exists().returning(|_, _| Ok(false));
            reviews.expect_create().returning(|r| Ok(r.clone()));
            let svc = service(reviews, projects);
            let result = svc
                .create_review(Actor::new(1, UserRole::Client), input(rating))
                .await;
            assert_eq!(result.is_ok(), ok, "rating {}", rating);
        }
    }

    #[tokio::test]
    async fn test_client_reviews_freelancer() {
        let mut projects = MockProjectRepository::new();
        projects
            .expect_find_by_id()
            .returning(|_| Ok(Some(project(ProjectStatus::Completed))));
        let mut reviews = MockReviewRepository::new();
        reviews.expect_exists().returning(|_, _| Ok(false));
        reviews.expect_create().returning(|r| Ok(r.clone()));
        let svc = service(reviews, projects);
        let review = svc
            .create_review(Actor::new(1, UserRole::Client), input(5))
            .await
            .unwrap();
        assert_eq!(review.reviewee_id, 2);
        assert_eq!(review.project_id, Some(3));
    }

    #[tokio::test]
    async fn test_review_requires_completion() {
        let mut projects = MockProjectRepository::new();
        projects
            .expect_find_by_id()
            .returning(|_| Ok(Some(project(ProjectStatus::InProgress))));
        let svc = service(MockReviewRepository::new(), projects);
        let err = svc
            .create_review(Actor::new(2, UserRole::Freelancer), input(4))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotCompleted));
    }

    #[tokio::test]
    async fn test_one_review_per_subject() {
        let mut projects = MockProjectRepository::new();
        projects
            .expect_find_by_id()
            .returning(|_| Ok(Some(project(ProjectStatus::Completed))));
        let mut reviews = MockReviewRepository::new();
        reviews.expect_exists().returning(|_, _| Ok(true));
        let svc = service(reviews, projects);
        let err = svc
            .create_review(Actor::new(2, UserRole::Freelancer), input(4))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::AlreadyReviewed));
    }
}
