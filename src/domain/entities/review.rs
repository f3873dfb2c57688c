//! Reviews left after completed work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

/// The completed deal a review is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewSubject {
    Project(i64),
    Order(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub reviewer_id: i64,
    pub reviewee_id: i64,
    pub project_id: Option<i64>,
    pub order_id: Option<i64>,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn subject(&self) -> Option<ReviewSubject> {
        match (self.project_id, self.order_id) {
            (Some(p), None) => Some(ReviewSubject::Project(p)),
            (None, Some(o)) => Some(ReviewSubject::Order(o)),
            _ => None,
        }
    }
}

/// Average rating and count shown on profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

impl RatingSummary {
    pub fn from_total(total: i64, count: i64) -> Self {
        if count == 0 {
            return Self::default();
        }
        // One decimal place is what profiles display.
        let average = (total as f64 / count as f64 * 10.0).round() / 10.0;
        Self {
            average: Some(average),
            count,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create(&self, review: &Review) -> Result<Review, AppError>;

    async fn exists(&self, reviewer_id: i64, subject: ReviewSubject) -> Result<bool, AppError>;

    async fn list_for_user(
        &self,
        reviewee_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Review>, i64), AppError>;

    async fn summary(&self, reviewee_id: i64) -> Result<RatingSummary, AppError>;
}
