//! Review Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{RatingSummary, Review, ReviewRepository, ReviewSubject};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

use super::map_unique_violation;

const REVIEW_COLUMNS: &str =
    "id, reviewer_id, reviewee_id, project_id, order_id, rating, comment, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    reviewer_id: i64,
    reviewee_id: i64,
    project_id: Option<i64>,
    order_id: Option<i64>,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id,
            reviewer_id: row.reviewer_id,
            reviewee_id: row.reviewee_id,
            project_id: row.project_id,
            order_id: row.order_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL review repository.
#[derive(Clone)]
pub struct PgReviewRepository {
    pool: PgPool,
}

impl PgReviewRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    async fn create(&self, review: &Review) -> Result<Review, AppError> {
        let sql = format!(
            r#"
            INSERT INTO reviews (id, reviewer_id, reviewee_id, project_id, order_id,
                                 rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {REVIEW_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(review.id)
            .bind(review.reviewer_id)
            .bind(review.reviewee_id)
            .bind(review.project_id)
            .bind(review.order_id)
            .bind(review.rating)
            .bind(&review.comment)
            .bind(review.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "You have already reviewed this"))?;
        Ok(row.into())
    }

    async fn exists(&self, reviewer_id: i64, subject: ReviewSubject) -> Result<bool, AppError> {
        let (column, id) = match subject {
            ReviewSubject::Project(id) => ("project_id", id),
            ReviewSubject::Order(id) => ("order_id", id),
        };
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE reviewer_id = $1 AND {column} = $2)"
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(reviewer_id)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn list_for_user(
        &self,
        reviewee_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Review>, i64), AppError> {
        let sql = format!(
            r#"
            SELECT {REVIEW_COLUMNS} FROM reviews
            WHERE reviewee_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(reviewee_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reviews WHERE reviewee_id = $1")
                .bind(reviewee_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((rows.into_iter().map(Review::from).collect(), total))
    }

    async fn summary(&self, reviewee_id: i64) -> Result<RatingSummary, AppError> {
        let (total, count) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COALESCE(SUM(rating), 0)::BIGINT, COUNT(*) FROM reviews WHERE reviewee_id = $1",
        )
        .bind(reviewee_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(RatingSummary::from_total(total, count))
    }
}
