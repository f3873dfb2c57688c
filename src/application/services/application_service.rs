//! Application Service
//!
//! Freelancer bids on projects and the owner's accept/reject decisions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::application::events::Notifier;
use crate::application::Actor;
use crate::domain::{
    format_cents, AcceptedApplication, Application, ApplicationRepository, ApplicationStatus,
    Cents, Escrow, EscrowSubject, NotificationKind, ProjectRepository, ProjectStatus,
};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::snowflake::SnowflakeGenerator;

#[async_trait]
pub trait ApplicationService: Send + Sync {
    async fn apply(
        &self,
        actor: Actor,
        project_id: i64,
        input: NewApplication,
    ) -> Result<Application, ApplicationError>;

    /// All bids on a project; owner and admins only.
    async fn list_for_project(
        &self,
        actor: Actor,
        project_id: i64,
    ) -> Result<Vec<Application>, ApplicationError>;

    async fn my_applications(
        &self,
        actor: Actor,
        page: PageRequest,
    ) -> Result<Page<Application>, ApplicationError>;

    async fn accept(
        &self,
        actor: Actor,
        application_id: i64,
    ) -> Result<AcceptedApplication, ApplicationError>;

    async fn reject(&self, actor: Actor, application_id: i64)
        -> Result<Application, ApplicationError>;

    async fn withdraw(
        &self,
        actor: Actor,
        application_id: i64,
    ) -> Result<Application, ApplicationError>;
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub cover_letter: String,
    pub bid_amount_cents: Cents,
    pub estimated_days: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error("Application not found")]
    NotFound,

    #[error("Project not found")]
    ProjectNotFound,

    #[error("Only freelancers can apply to projects")]
    FreelancersOnly,

    #[error("You cannot apply to your own project")]
    OwnProject,

    #[error("Project is not open for applications")]
    ProjectNotOpen,

    #[error("You already applied to this project")]
    AlreadyApplied,

    #[error("Bid and estimate must be positive")]
    InvalidBid,

    #[error("Only the project owner can do this")]
    NotOwner,

    #[error("Only the applicant can do this")]
    NotApplicant,

    #[error("Application is {0}")]
    InvalidState(ApplicationStatus),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<ApplicationError> for AppError {
    fn from(err: ApplicationError) -> Self {
        match err {
            ApplicationError::NotFound | ApplicationError::ProjectNotFound => {
                AppError::NotFound(err.to_string())
            }
            ApplicationError::FreelancersOnly
            | ApplicationError::OwnProject
            | ApplicationError::NotOwner
            | ApplicationError::NotApplicant => AppError::Forbidden(err.to_string()),
            ApplicationError::InvalidBid => AppError::Validation(err.to_string()),
            ApplicationError::ProjectNotOpen
            | ApplicationError::AlreadyApplied
            | ApplicationError::InvalidState(_) => AppError::Conflict(err.to_string()),
            ApplicationError::Internal(inner) => inner,
        }
    }
}

pub struct ApplicationServiceImpl<A, P>
where
    A: ApplicationRepository,
    P: ProjectRepository,
{
    application_repo: Arc<A>,
    project_repo: Arc<P>,
    notifier: Notifier,
    id_generator: Arc<SnowflakeGenerator>,
    currency: String,
}

impl<A, P> ApplicationServiceImpl<A, P>
where
    A: ApplicationRepository,
    P: ProjectRepository,
{
    pub fn new(
        application_repo: Arc<A>,
        project_repo: Arc<P>,
        notifier: Notifier,
        id_generator: Arc<SnowflakeGenerator>,
        currency: String,
    ) -> Self {
        Self {
            application_repo,
            project_repo,
            notifier,
            id_generator,
            currency,
        }
    }

    async fn load(&self, application_id: i64) -> Result<Application, ApplicationError> {
        self.application_repo
            .find_by_id(application_id)
            .await?
            .ok_or(ApplicationError::NotFound)
    }

    /// Load the application and check the actor owns its project.
    async fn load_for_owner(
        &self,
        actor: Actor,
        application_id: i64,
    ) -> Result<Application, ApplicationError> {
        let application = self.load(application_id).await?;
        let project = self
            .project_repo
            .find_by_id(application.project_id)
            .await?
            .ok_or(ApplicationError::ProjectNotFound)?;
        if !project.is_owner(actor.user_id) {
            return Err(ApplicationError::NotOwner);
        }
        Ok(application)
    }

    async fn settle(
        &self,
        application: &Application,
        to: ApplicationStatus,
    ) -> Result<Application, ApplicationError> {
        if !application.status.can_transition_to(to) {
            return Err(ApplicationError::InvalidState(application.status));
        }
        match self
            .application_repo
            .transition(application.id, ApplicationStatus::Pending, to)
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                let current = self.load(application.id).await?;
                Err(ApplicationError::InvalidState(current.status))
            }
        }
    }
}

#[async_trait]
impl<A, P> ApplicationService for ApplicationServiceImpl<A, P>
where
    A: ApplicationRepository + 'static,
    P: ProjectRepository + 'static,
{
    async fn apply(
        &self,
        actor: Actor,
        project_id: i64,
        input: NewApplication,
    ) -> Result<Application, ApplicationError> {
        if !actor.is_freelancer() {
            return Err(ApplicationError::FreelancersOnly);
        }
        if input.bid_amount_cents <= 0 || input.estimated_days <= 0 {
            return Err(ApplicationError::InvalidBid);
        }

        let project = self
            .project_repo
            .find_by_id(project_id)
            .await?
            .ok_or(ApplicationError::ProjectNotFound)?;
        if project.is_owner(actor.user_id) {
            return Err(ApplicationError::OwnProject);
        }
        if project.status != ProjectStatus::Open {
            return Err(ApplicationError::ProjectNotOpen);
        }
        if self
            .application_repo
            .exists_for(project_id, actor.user_id)
            .await?
        {
            return Err(ApplicationError::AlreadyApplied);
        }

        let now = Utc::now();
        let application = Application {
            id: self.id_generator.generate(),
            project_id,
            freelancer_id: actor.user_id,
            cover_letter: input.cover_letter,
            bid_amount_cents: input.bid_amount_cents,
            estimated_days: input.estimated_days,
            status: ApplicationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let created = self.application_repo.create(&application).await?;

        self.notifier
            .notify(
                project.client_id,
                NotificationKind::ApplicationReceived,
                "New application",
                format!(
                    "A freelancer bid {} on \"{}\".",
                    format_cents(created.bid_amount_cents, &self.currency),
                    project.title
                ),
                Some(format!("/projects/{}/applications", project_id)),
            )
            .await;

        Ok(created)
    }

    async fn list_for_project(
        &self,
        actor: Actor,
        project_id: i64,
    ) -> Result<Vec<Application>, ApplicationError> {
        let project = self
            .project_repo
            .find_by_id(project_id)
            .await?
            .ok_or(ApplicationError::ProjectNotFound)?;
        if !project.is_owner(actor.user_id) && !actor.is_admin() {
            return Err(ApplicationError::NotOwner);
        }
        Ok(self.application_repo.list_for_project(project_id).await?)
    }

    async fn my_applications(
        &self,
        actor: Actor,
        page: PageRequest,
    ) -> Result<Page<Application>, ApplicationError> {
        let (items, total) = self
            .application_repo
            .list_for_freelancer(actor.user_id, page)
            .await?;
        Ok(Page::new(items, page, total))
    }

    async fn accept(
        &self,
        actor: Actor,
        application_id: i64,
    ) -> Result<AcceptedApplication, ApplicationError> {
        let application = self.load_for_owner(actor, application_id).await?;
        if application.status != ApplicationStatus::Pending {
            return Err(ApplicationError::InvalidState(application.status));
        }

        let escrow = Escrow::pending(
            self.id_generator.generate(),
            EscrowSubject::Project(application.project_id),
            actor.user_id,
            application.freelancer_id,
            application.bid_amount_cents,
            &self.currency,
        );

        let accepted = match self.application_repo.accept(application_id, &escrow).await? {
            Some(accepted) => accepted,
            None => {
                // Either the bid or the project moved on
                let current = self.load(application_id).await?;
                if current.status != ApplicationStatus::Pending {
                    return Err(ApplicationError::InvalidState(current.status));
                }
                return Err(ApplicationError::ProjectNotOpen);
            }
        };

        tracing::info!(
            application_id,
            project_id = accepted.project.id,
            escrow_id = accepted.escrow.id,
            rejected = accepted.rejected.len(),
            "Application accepted"
        );

        self.notifier
            .notify(
                accepted.application.freelancer_id,
                NotificationKind::ApplicationAccepted,
                "Application accepted",
                format!("You were hired for \"{}\".", accepted.project.title),
                Some(format!("/projects/{}", accepted.project.id)),
            )
            .await;
        for rejected in &accepted.rejected {
            self.notifier
                .notify(
                    rejected.freelancer_id,
                    NotificationKind::ApplicationRejected,
                    "Application not selected",
                    format!("\"{}\" went to another freelancer.", accepted.project.title),
                    Some(format!("/projects/{}", accepted.project.id)),
                )
                .await;
        }

        Ok(accepted)
    }

    async fn reject(
        &self,
        actor: Actor,
        application_id: i64,
    ) -> Result<Application, ApplicationError> {
        let application = self.load_for_owner(actor, application_id).await?;
        let rejected = self
            .settle(&application, ApplicationStatus::Rejected)
            .await?;

        self.notifier
            .notify(
                rejected.freelancer_id,
                NotificationKind::ApplicationRejected,
                "Application not selected",
                "The client declined your application.",
                Some(format!("/projects/{}", rejected.project_id)),
            )
            .await;
        Ok(rejected)
    }

    async fn withdraw(
        &self,
        actor: Actor,
        application_id: i64,
    ) -> Result<Application, ApplicationError> {
        let application = self.load(application_id).await?;
        if application.freelancer_id != actor.user_id {
            return Err(ApplicationError::NotApplicant);
        }
        self.settle(&application, ApplicationStatus::Withdrawn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::test_support::silent_notifier;
    use crate::domain::{MockApplicationRepository, MockProjectRepository, Project, UserRole};

    const CLIENT: i64 = 1;
    const FREELANCER: i64 = 2;

    fn service(
        apps: MockApplicationRepository,
        projects: MockProjectRepository,
    ) -> ApplicationServiceImpl<MockApplicationRepository, MockProjectRepository> {
        ApplicationServiceImpl::new(
            Arc::new(apps),
            Arc::new(projects),
            silent_notifier(),
            Arc::new(SnowflakeGenerator::new(1, 1)),
            "usd".into(),
        )
    }

    fn open_project() -> Project {
        Project {
            id: 50,
            client_id: CLIENT,
            title: "Logo".into(),
            ..Project::default()
        }
    }

    fn pending(id: i64) -> Application {
        Application {
            id,
            project_id: 50,
            freelancer_id: FREELANCER,
            cover_letter: "hi".into(),
            bid_amount_cents: 25_000,
            estimated_days: 5,
            status: ApplicationStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn bid() -> NewApplication {
        NewApplication {
            cover_letter: "I can do it".into(),
            bid_amount_cents: 25_000,
            estimated_days: 5,
        }
    }

    #[tokio::test]
    async fn test_cannot_apply_to_own_project() {
        let mut projects = MockProjectRepository::new();
        projects.expect_find_by_id().returning(|_| {
            Ok(Some(Project {
                client_id: FREELANCER,
                ..open_project()
            }))
        });
        let svc = service(MockApplicationRepository::new(), projects);
        let err = svc
            .apply(Actor::new(FREELANCER, UserRole::Freelancer), 50, bid())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::OwnProject));
    }

    #[tokio::test]
    async fn test_duplicate_application() {
        let mut projects = MockProjectRepository::new();
        projects.expect_find_by_id().returning(|_| Ok(Some(open_project())));
        let mut apps = MockApplicationRepository::new();
        apps.expect_exists_for().returning(|_, _| Ok(true));
        let svc = service(apps, projects);
        let err = svc
            .apply(Actor::new(FREELANCER, UserRole::Freelancer), 50, bid())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyApplied));
    }

    #[tokio::test]
    async fn test_clients_cannot_apply() {
        let svc = service(MockApplicationRepository::new(), MockProjectRepository::new());
        let err = svc
            .apply(Actor::new(CLIENT, UserRole::Client), 50, bid())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::FreelancersOnly));
    }

    #[tokio::test]
    async fn test_accept_creates_escrow_for_bid() {
        let mut apps = MockApplicationRepository::new();
        apps.expect_find_by_id().returning(|id| Ok(Some(pending(id))));
        apps.expect_accept()
            .withf(|id, escrow| {
                *id == 9
                    && escrow.amount_cents == 25_000
                    && escrow.client_id == CLIENT
                    && escrow.freelancer_id == FREELANCER
                    && escrow.project_id == Some(50)
            })
            .times(1)
            .returning(|id, escrow| {
                let mut application = pending(id);
                application.status = ApplicationStatus::Accepted;
                let mut rejected = pending(10);
                rejected.status = ApplicationStatus::Rejected;
                Ok(Some(AcceptedApplication {
                    application,
                    project: Project {
                        status: ProjectStatus::InProgress,
                        freelancer_id: Some(FREELANCER),
                        ..open_project()
                    },
                    escrow: escrow.clone(),
                    rejected: vec![rejected],
                }))
            });
        let mut projects = MockProjectRepository::new();
        projects.expect_find_by_id().returning(|_| Ok(Some(open_project())));

        let svc = service(apps, projects);
        let accepted = svc
            .accept(Actor::new(CLIENT, UserRole::Client), 9)
            .await
            .unwrap();
        assert_eq!(accepted.project.status, ProjectStatus::InProgress);
        assert_eq!(accepted.rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_accept_by_non_owner() {
        let mut apps = MockApplicationRepository::new();
        apps.expect_find_by_id().returning(|id| Ok(Some(pending(id))));
        let mut projects = MockProjectRepository::new();
        projects.expect_find_by_id().returning(|_| Ok(Some(open_project())));
        let svc = service(apps, projects);
        let err = svc
            .accept(Actor::new(77, UserRole::Client), 9)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotOwner));
    }

    #[tokio::test]
    async fn test_withdraw_only_pending() {
        let mut apps = MockApplicationRepository::new();
        apps.expect_find_by_id().returning(|id| {
            let mut a = pending(id);
            a.status = ApplicationStatus::Rejected;
            Ok(Some(a))
        });
        let svc = service(apps, MockProjectRepository::new());
        let err = svc
            .withdraw(Actor::new(FREELANCER, UserRole::Freelancer), 9)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidState(ApplicationStatus::Rejected)));
    }
}
