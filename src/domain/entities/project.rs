//! Project entity, lifecycle, and repository trait.
//!
//! Maps to the `projects` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, ListingTier};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    /// Project lifecycle: OPEN -> IN_PROGRESS -> COMPLETED / CANCELLED / DISPUTED.
    pub enum ProjectStatus {
        Open => "open",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        Disputed => "disputed",
    }
}

impl ProjectStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (Open, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Disputed)
                | (Disputed, Completed)
                | (Disputed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }
}

string_enum! {
    pub enum BudgetType {
        Fixed => "fixed",
        Hourly => "hourly",
    }
}

/// A client's job posting that freelancers bid on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub client_id: i64,
    /// Set when an application is accepted
    pub freelancer_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub skills: Vec<String>,
    pub budget_type: BudgetType,
    pub budget_min_cents: Cents,
    pub budget_max_cents: Cents,
    pub deadline: Option<DateTime<Utc>>,
    pub status: ProjectStatus,
    pub tier: ListingTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.client_id == user_id
    }

    /// Client or assigned freelancer.
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.client_id == user_id || self.freelancer_id == Some(user_id)
    }

    /// The other side of the engagement, if assigned.
    pub fn counterparty(&self, user_id: i64) -> Option<i64> {
        if self.client_id == user_id {
            self.freelancer_id
        } else if self.freelancer_id == Some(user_id) {
            Some(self.client_id)
        } else {
            None
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            client_id: 0,
            freelancer_id: None,
            title: String::new(),
            description: String::new(),
            category: String::new(),
            skills: Vec::new(),
            budget_type: BudgetType::Fixed,
            budget_min_cents: 0,
            budget_max_cents: 0,
            deadline: None,
            status: ProjectStatus::Open,
            tier: ListingTier::Standard,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Browse filter for projects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub category: Option<String>,
    pub skill: Option<String>,
    pub min_budget_cents: Option<Cents>,
    pub max_budget_cents: Option<Cents>,
    pub query: Option<String>,
    pub client_id: Option<i64>,
    pub freelancer_id: Option<i64>,
}

/// Repository trait for Project data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Project>, AppError>;

    async fn create(&self, project: &Project) -> Result<Project, AppError>;

    /// Persist editable fields. Only succeeds while the project is OPEN;
    /// returns `None` otherwise.
    async fn update_open(&self, project: &Project) -> Result<Option<Project>, AppError>;

    /// Browse ordered by tier rank, then newest first.
    async fn search(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<(Vec<Project>, i64), AppError>;

    /// Conditional status change. Returns `None` when the current status is
    /// not in `from`.
    async fn transition(
        &self,
        id: i64,
        from: &[ProjectStatus],
        to: ProjectStatus,
    ) -> Result<Option<Project>, AppError>;

    /// OPEN -> CANCELLED, rejecting every pending application in the same
    /// transaction.
    async fn cancel_open(&self, id: i64) -> Result<Option<Project>, AppError>;

    async fn set_tier(&self, id: i64, tier: ListingTier) -> Result<Option<Project>, AppError>;

    async fn count_by_status(&self) -> Result<Vec<(ProjectStatus, i64)>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use ProjectStatus::*;

    #[test_case(Open, InProgress => true)]
    #[test_case(Open, Cancelled => true)]
    #[test_case(Open, Completed => false)]
    #[test_case(Open, Disputed => false)]
    #[test_case(InProgress, Completed => true)]
    #[test_case(InProgress, Disputed => true)]
    #[test_case(InProgress, Cancelled => false)]
    #[test_case(Disputed, Completed => true)]
    #[test_case(Disputed, Cancelled => true)]
    #[test_case(Completed, Disputed => false)]
    #[test_case(Cancelled, Open => false)]
    fn test_transitions(from: ProjectStatus, to: ProjectStatus) -> bool {
        from.can_transition_to(to)
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ProjectStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in ProjectStatus::ALL {
                assert!(!from.can_transition_to(*to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_counterparty() {
        let project = Project {
            client_id: 1,
            freelancer_id: Some(2),
            ..Project::default()
        };
        assert_eq!(project.counterparty(1), Some(2));
        assert_eq!(project.counterparty(2), Some(1));
        assert_eq!(project.counterparty(3), None);
        assert!(project.is_participant(2));
        assert!(!project.is_owner(2));
    }
}
