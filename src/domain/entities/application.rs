//! Application (bid) entity and repository trait.
//!
//! Maps to the `applications` table. One application per
//! (project, freelancer) pair, enforced by a unique index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, Escrow, Project};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    /// PENDING -> ACCEPTED / REJECTED / WITHDRAWN, all terminal.
    pub enum ApplicationStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
    }
}

impl ApplicationStatus {
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        self == ApplicationStatus::Pending && next != ApplicationStatus::Pending
    }
}

/// A freelancer's bid on a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub project_id: i64,
    pub freelancer_id: i64,
    pub cover_letter: String,
    pub bid_amount_cents: Cents,
    pub estimated_days: i32,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything that changed when a bid was accepted.
#[derive(Debug, Clone)]
pub struct AcceptedApplication {
    pub application: Application,
    pub project: Project,
    pub escrow: Escrow,
    /// Competing bids that were rejected as part of the acceptance
    pub rejected: Vec<Application>,
}

/// Repository trait for Application data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Application>, AppError>;

    async fn exists_for(&self, project_id: i64, freelancer_id: i64) -> Result<bool, AppError>;

    async fn create(&self, application: &Application) -> Result<Application, AppError>;

    async fn list_for_project(&self, project_id: i64) -> Result<Vec<Application>, AppError>;

    async fn list_for_freelancer(
        &self,
        freelancer_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Application>, i64), AppError>;

    /// Conditional status change; `None` when the application was not in `from`.
    async fn transition(
        &self,
        id: i64,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<Option<Application>, AppError>;

    /// Accept a pending bid on an open project in one transaction: accept
    /// the bid, reject the competing pending bids, assign the freelancer,
    /// move the project to IN_PROGRESS and insert `escrow`.
    ///
    /// Returns `None` if the bid is no longer pending or the project is no
    /// longer open.
    async fn accept(
        &self,
        id: i64,
        escrow: &Escrow,
    ) -> Result<Option<AcceptedApplication>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationStatus::*;

    #[test]
    fn test_only_pending_moves() {
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Withdrawn));
        assert!(!Pending.can_transition_to(Pending));
        for from in [Accepted, Rejected, Withdrawn] {
            for to in ApplicationStatus::ALL {
                assert!(!from.can_transition_to(*to));
            }
        }
    }
}
