//! Project Service
//!
//! Posting, browsing and the client-side project lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::events::Notifier;
use crate::application::services::escrow_service::{EscrowError, EscrowService, EscrowServiceImpl};
use crate::application::services::user_service::normalize_skills;
use crate::application::Actor;
use crate::domain::{
    BudgetType, Cents, EscrowRepository, EscrowStatus, ListingTier, NotificationKind, Project,
    ProjectFilter, ProjectRepository, ProjectStatus, SubjectTransition, UserRole,
};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::snowflake::SnowflakeGenerator;

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn create_project(&self, actor: Actor, input: NewProject) -> Result<Project, ProjectError>;

    async fn get_project(&self, project_id: i64) -> Result<Project, ProjectError>;

    async fn browse(
        &self,
        filter: ProjectFilter,
        page: PageRequest,
    ) -> Result<Page<Project>, ProjectError>;

    /// Projects the actor posted (clients) or is assigned to (freelancers).
    async fn my_projects(&self, actor: Actor, page: PageRequest)
        -> Result<Page<Project>, ProjectError>;

    async fn update_project(
        &self,
        actor: Actor,
        project_id: i64,
        changes: ProjectChanges,
    ) -> Result<Project, ProjectError>;

    /// OPEN -> CANCELLED by the owner; pending bids are rejected.
    async fn cancel_project(&self, actor: Actor, project_id: i64) -> Result<Project, ProjectError>;

    /// IN_PROGRESS -> COMPLETED by the owner, releasing the funded escrow.
    async fn complete_project(&self, actor: Actor, project_id: i64)
        -> Result<Project, ProjectError>;

    /// IN_PROGRESS -> DISPUTED by either participant.
    async fn dispute_project(&self, actor: Actor, project_id: i64)
        -> Result<Project, ProjectError>;
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub category: String,
    pub skills: Vec<String>,
    pub budget_type: BudgetType,
    pub budget_min_cents: Cents,
    pub budget_max_cents: Cents,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub skills: Option<Vec<String>>,
    pub budget_type: Option<BudgetType>,
    pub budget_min_cents: Option<Cents>,
    pub budget_max_cents: Option<Cents>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Project not found")]
    NotFound,

    #[error("Only clients can post projects")]
    ClientsOnly,

    #[error("Only the project owner can do this")]
    NotOwner,

    #[error("Only project participants can do this")]
    NotParticipant,

    #[error("Budget must be positive with minimum not above maximum")]
    InvalidBudget,

    #[error("Deadline must be in the future")]
    DeadlineInPast,

    #[error("Project is {0}")]
    InvalidState(ProjectStatus),

    #[error("Escrow must be funded before the project can be completed")]
    EscrowNotFunded,

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<ProjectError> for AppError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::NotFound => AppError::NotFound(err.to_string()),
            ProjectError::ClientsOnly | ProjectError::NotOwner | ProjectError::NotParticipant => {
                AppError::Forbidden(err.to_string())
            }
            ProjectError::InvalidBudget | ProjectError::DeadlineInPast => {
                AppError::Validation(err.to_string())
            }
            ProjectError::InvalidState(_) | ProjectError::EscrowNotFunded => {
                AppError::Conflict(err.to_string())
            }
            ProjectError::Escrow(inner) => inner.into(),
            ProjectError::Internal(inner) => inner,
        }
    }
}

fn check_budget(min: Cents, max: Cents) -> Result<(), ProjectError> {
    if min <= 0 || max <= 0 || min > max {
        return Err(ProjectError::InvalidBudget);
    }
    Ok(())
}

pub struct ProjectServiceImpl<P, E>
where
    P: ProjectRepository,
    E: EscrowRepository,
{
    project_repo: Arc<P>,
    escrows: EscrowServiceImpl<E>,
    notifier: Notifier,
    id_generator: Arc<SnowflakeGenerator>,
}

impl<P, E> ProjectServiceImpl<P, E>
where
    P: ProjectRepository,
    E: EscrowRepository + 'static,
{
    pub fn new(
        project_repo: Arc<P>,
        escrows: EscrowServiceImpl<E>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        let notifier = escrows.notifier().clone();
        Self {
            project_repo,
            escrows,
            notifier,
            id_generator,
        }
    }

    async fn load(&self, project_id: i64) -> Result<Project, ProjectError> {
        self.project_repo
            .find_by_id(project_id)
            .await?
            .ok_or(ProjectError::NotFound)
    }

    async fn load_owned(&self, actor: Actor, project_id: i64) -> Result<Project, ProjectError> {
        let project = self.load(project_id).await?;
        if !project.is_owner(actor.user_id) {
            return Err(ProjectError::NotOwner);
        }
        Ok(project)
    }

    /// Re-read after a lost compare-and-set so the error names the status
    /// that won.
    async fn lost_race(&self, project_id: i64) -> ProjectError {
        match self.load(project_id).await {
            Ok(current) => ProjectError::InvalidState(current.status),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl<P, E> ProjectService for ProjectServiceImpl<P, E>
where
    P: ProjectRepository + 'static,
    E: EscrowRepository + 'static,
{
    async fn create_project(&self, actor: Actor, input: NewProject) -> Result<Project, ProjectError> {
        if actor.role != UserRole::Client {
            return Err(ProjectError::ClientsOnly);
        }
        check_budget(input.budget_min_cents, input.budget_max_cents)?;
        if matches!(input.deadline, Some(d) if d <= Utc::now()) {
            return Err(ProjectError::DeadlineInPast);
        }

        let mut skills = input.skills;
        normalize_skills(&mut skills);

        let now = Utc::now();
        let project = Project {
            id: self.id_generator.generate(),
            client_id: actor.user_id,
            freelancer_id: None,
            title: input.title.trim().to_string(),
            description: input.description,
            category: input.category.trim().to_lowercase(),
            skills,
            budget_type: input.budget_type,
            budget_min_cents: input.budget_min_cents,
            budget_max_cents: input.budget_max_cents,
            deadline: input.deadline,
            status: ProjectStatus::Open,
            tier: ListingTier::Standard,
            created_at: now,
            updated_at: now,
        };

        let created = self.project_repo.create(&project).await?;
        tracing::info!(project_id = created.id, client_id = actor.user_id, "Project posted");
        Ok(created)
    }

    async fn get_project(&self, project_id: i64) -> Result<Project, ProjectError> {
        self.load(project_id).await
    }

    async fn browse(
        &self,
        mut filter: ProjectFilter,
        page: PageRequest,
    ) -> Result<Page<Project>, ProjectError> {
        if filter.status.is_none() {
            filter.status = Some(ProjectStatus::Open);
        }
        let (items, total) = self.project_repo.search(&filter, page).await?;
        Ok(Page::new(items, page, total))
    }

    async fn my_projects(
        &self,
        actor: Actor,
        page: PageRequest,
    ) -> Result<Page<Project>, ProjectError> {
        let mut filter = ProjectFilter::default();
        if actor.is_freelancer() {
            filter.freelancer_id = Some(actor.user_id);
        } else {
            filter.client_id = Some(actor.user_id);
        }
        let (items, total) = self.project_repo.search(&filter, page).await?;
        Ok(Page::new(items, page, total))
    }

    async fn update_project(
        &self,
        actor: Actor,
        project_id: i64,
        changes: ProjectChanges,
    ) -> Result<Project, ProjectError> {
        let mut project = self.load_owned(actor, project_id).await?;
        if project.status != ProjectStatus::Open {
            return Err(ProjectError::InvalidState(project.status));
        }

        if let Some(title) = changes.title {
            project.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            project.description = description;
        }
        if let Some(category) = changes.category {
            project.category = category.trim().to_lowercase();
        }
        if let Some(mut skills) = changes.skills {
            normalize_skills(&mut skills);
            project.skills = skills;
        }
        if let Some(budget_type) = changes.budget_type {
            project.budget_type = budget_type;
        }
        if let Some(min) = changes.budget_min_cents {
            project.budget_min_cents = min;
        }
        if let Some(max) = changes.budget_max_cents {
            project.budget_max_cents = max;
        }
        if let Some(deadline) = changes.deadline {
            if deadline <= Utc::now() {
                return Err(ProjectError::DeadlineInPast);
            }
            project.deadline = Some(deadline);
        }
        check_budget(project.budget_min_cents, project.budget_max_cents)?;

        match self.project_repo.update_open(&project).await? {
            Some(updated) => Ok(updated),
            None => Err(self.lost_race(project_id).await),
        }
    }

    async fn cancel_project(&self, actor: Actor, project_id: i64) -> Result<Project, ProjectError> {
        let project = self.load_owned(actor, project_id).await?;
        // Once work has started, cancellation goes through a dispute
        if project.status != ProjectStatus::Open {
            return Err(ProjectError::InvalidState(project.status));
        }

        match self.project_repo.cancel_open(project_id).await? {
            Some(cancelled) => {
                tracing::info!(project_id, "Project cancelled");
                Ok(cancelled)
            }
            None => Err(self.lost_race(project_id).await),
        }
    }

    async fn complete_project(
        &self,
        actor: Actor,
        project_id: i64,
    ) -> Result<Project, ProjectError> {
        let project = self.load_owned(actor, project_id).await?;
        if project.status != ProjectStatus::InProgress {
            return Err(ProjectError::InvalidState(project.status));
        }

        let escrow = self
            .escrows
            .repository()
            .find_by_project(project_id)
            .await?
            .ok_or(ProjectError::EscrowNotFunded)?;
        if escrow.status != EscrowStatus::Funded {
            return Err(ProjectError::EscrowNotFunded);
        }

        self.escrows
            .release(
                &escrow,
                Some(SubjectTransition::Project {
                    id: project_id,
                    from: vec![ProjectStatus::InProgress],
                    to: ProjectStatus::Completed,
                }),
            )
            .await?;

        tracing::info!(project_id, "Project completed");
        self.load(project_id).await
    }

    async fn dispute_project(
        &self,
        actor: Actor,
        project_id: i64,
    ) -> Result<Project, ProjectError> {
        let project = self.load(project_id).await?;
        if !project.is_participant(actor.user_id) {
            return Err(ProjectError::NotParticipant);
        }
        if !project.status.can_transition_to(ProjectStatus::Disputed) {
            return Err(ProjectError::InvalidState(project.status));
        }

        let disputed = match self
            .project_repo
            .transition(project_id, &[ProjectStatus::InProgress], ProjectStatus::Disputed)
            .await?
        {
            Some(p) => p,
            None => return Err(self.lost_race(project_id).await),
        };

        tracing::warn!(project_id, opened_by = actor.user_id, "Project disputed");
        if let Some(other) = disputed.counterparty(actor.user_id) {
            self.notifier
                .notify(
                    other,
                    NotificationKind::EscrowUpdate,
                    "Dispute opened",
                    format!("A dispute was opened on \"{}\". An admin will review it.", disputed.title),
                    Some(format!("/projects/{}", project_id)),
                )
                .await;
        }
        Ok(disputed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::test_support::silent_notifier;
    use crate::application::payments::MockPaymentProvider;
    use crate::domain::{Escrow, EscrowSubject, FeePolicy, MockEscrowRepository, MockProjectRepository};

    const CLIENT: i64 = 1;
    const FREELANCER: i64 = 2;

    fn project(status: ProjectStatus) -> Project {
        Project {
            id: 100,
            client_id: CLIENT,
            freelancer_id: (status != ProjectStatus::Open).then_some(FREELANCER),
            status,
            budget_min_cents: 1000,
            budget_max_cents: 5000,
            ..Project::default()
        }
    }

    fn service(
        projects: MockProjectRepository,
        escrows: MockEscrowRepository,
    ) -> ProjectServiceImpl<MockProjectRepository, MockEscrowRepository> {
        let ids = Arc::new(SnowflakeGenerator::new(1, 1));
        let escrow_service = EscrowServiceImpl::new(
            Arc::new(escrows),
            Arc::new(MockPaymentProvider::new()),
            silent_notifier(),
            ids.clone(),
            FeePolicy::new(1000),
        );
        ProjectServiceImpl::new(Arc::new(projects), escrow_service, ids)
    }

    fn client() -> Actor {
        Actor::new(CLIENT, UserRole::Client)
    }

    fn new_project() -> NewProject {
        NewProject {
            title: " Build an API ".into(),
            description: "REST backend".into(),
            category: "Development".into(),
            skills: vec!["Rust".into()],
            budget_type: BudgetType::Fixed,
            budget_min_cents: 50_000,
            budget_max_cents: 100_000,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_freelancers_cannot_post() {
        let svc = service(MockProjectRepository::new(), MockEscrowRepository::new());
        let err = svc
            .create_project(Actor::new(FREELANCER, UserRole::Freelancer), new_project())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::ClientsOnly));
    }

    #[tokio::test]
    async fn test_budget_range_is_checked() {
        let svc = service(MockProjectRepository::new(), MockEscrowRepository::new());
        let mut input = new_project();
        input.budget_min_cents = 200_000;
        let err = svc.create_project(client(), input).await.unwrap_err();
        assert!(matches!(err, ProjectError::InvalidBudget));
    }

    #[tokio::test]
    async fn test_create_normalizes_fields() {
        let mut projects = MockProjectRepository::new();
        projects.expect_create().returning(|p| Ok(p.clone()));
        let svc = service(projects, MockEscrowRepository::new());

        let created = svc.create_project(client(), new_project()).await.unwrap();
        assert_eq!(created.title, "Build an API");
        assert_eq!(created.category, "development");
        assert_eq!(created.skills, vec!["rust".to_string()]);
        assert_eq!(created.status, ProjectStatus::Open);
        assert_eq!(created.client_id, CLIENT);
    }

    #[tokio::test]
    async fn test_only_open_projects_are_editable() {
        let mut projects = MockProjectRepository::new();
        projects
            .expect_find_by_id()
            .returning(|_| Ok(Some(project(ProjectStatus::InProgress))));
        let svc = service(projects, MockEscrowRepository::new());
        let err = svc
            .update_project(client(), 100, ProjectChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::InvalidState(ProjectStatus::InProgress)));
    }

    #[tokio::test]
    async fn test_complete_requires_funded_escrow() {
        let mut projects = MockProjectRepository::new();
        projects
            .expect_find_by_id()
            .returning(|_| Ok(Some(project(ProjectStatus::InProgress))));
        let mut escrows = MockEscrowRepository::new();
        escrows.expect_find_by_project().returning(|_| {
            Ok(Some(Escrow::pending(
                7,
                EscrowSubject::Project(100),
                CLIENT,
                FREELANCER,
                3000,
                "usd",
            )))
        });
        let svc = service(projects, escrows);
        let err = svc.complete_project(client(), 100).await.unwrap_err();
        assert!(matches!(err, ProjectError::EscrowNotFunded));
    }

    #[tokio::test]
    async fn test_complete_releases_escrow_with_project_transition() {
        let mut projects = MockProjectRepository::new();
        let mut seq = mockall::Sequence::new();
        projects
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(project(ProjectStatus::InProgress))));
        projects
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(project(ProjectStatus::Completed))));

        let mut escrows = MockEscrowRepository::new();
        escrows.expect_find_by_project().returning(|_| {
            let mut e = Escrow::pending(7, EscrowSubject::Project(100), CLIENT, FREELANCER, 3000, "usd");
            e.status = EscrowStatus::Funded;
            Ok(Some(e))
        });
        escrows
            .expect_release()
            .withf(|id, _, _, subject| {
                *id == 7
                    && *subject
                        == Some(SubjectTransition::Project {
                            id: 100,
                            from: vec![ProjectStatus::InProgress],
                            to: ProjectStatus::Completed,
                        })
            })
            .times(1)
            .returning(|_, _, _, _| {
                let mut e = Escrow::pending(7, EscrowSubject::Project(100), CLIENT, FREELANCER, 3000, "usd");
                e.status = EscrowStatus::Released;
                Ok(Some(e))
            });

        let svc = service(projects, escrows);
        let completed = svc.complete_project(client(), 100).await.unwrap();
        assert_eq!(completed.status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_outsiders_cannot_dispute() {
        let mut projects = MockProjectRepository::new();
        projects
            .expect_find_by_id()
            .returning(|_| Ok(Some(project(ProjectStatus::InProgress))));
        let svc = service(projects, MockEscrowRepository::new());
        let err = svc
            .dispute_project(Actor::new(99, UserRole::Client), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::NotParticipant));
    }

    #[tokio::test]
    async fn test_browse_defaults_to_open() {
        let mut projects = MockProjectRepository::new();
        projects
            .expect_search()
            .withf(|filter, _| filter.status == Some(ProjectStatus::Open))
            .returning(|_, _| Ok((vec![], 0)));
        let svc = service(projects, MockEscrowRepository::new());
        svc.browse(ProjectFilter::default(), PageRequest::new(1, 20))
            .await
            .unwrap();
    }
}
