//! Admin Service
//!
//! Moderation tooling: platform statistics, account status, dispute
//! resolution, listing tiers and the audit log.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::application::audit::Auditor;
use crate::application::services::escrow_service::{EscrowError, EscrowService, EscrowServiceImpl};
use crate::application::Actor;
use crate::domain::{
    AccountStatus, AdminAction, AuditEntry, AuditLogRepository, Cents, Escrow, EscrowRepository,
    EscrowSubject, EscrowTotals, ListingTier, NotificationKind, OrderRepository, OrderStatus,
    PayoutRepository, Project, ProjectFilter, ProjectRepository,
    ProjectStatus, ServiceListing, ServiceOrder, ServiceRepository, SessionRepository,
    SubjectTransition, TransactionKind, TransactionRepository, User, UserFilter, UserRepository,
    UserRole,
};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};

/// Maximum number of open disputes returned in one listing.
const DISPUTE_LIST_LIMIT: i64 = 200;

#[async_trait]
pub trait AdminService: Send + Sync {
    async fn stats(&self) -> Result<PlatformStats, AdminError>;

    async fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, AdminError>;

    /// Suspending or banning also revokes every refresh session.
    async fn set_user_status(
        &self,
        admin: Actor,
        user_id: i64,
        status: AccountStatus,
        reason: Option<String>,
    ) -> Result<User, AdminError>;

    async fn list_disputes(&self) -> Result<Vec<Dispute>, AdminError>;

    /// Settle the escrow of a DISPUTED project or order.
    async fn resolve_dispute(
        &self,
        admin: Actor,
        escrow_id: i64,
        resolution: Resolution,
        note: Option<String>,
    ) -> Result<Escrow, AdminError>;

    async fn set_project_tier(
        &self,
        admin: Actor,
        project_id: i64,
        tier: ListingTier,
    ) -> Result<Project, AdminError>;

    async fn set_service_tier(
        &self,
        admin: Actor,
        service_id: i64,
        tier: ListingTier,
    ) -> Result<ServiceListing, AdminError>;

    async fn set_service_active(
        &self,
        admin: Actor,
        service_id: i64,
        active: bool,
    ) -> Result<ServiceListing, AdminError>;

    async fn audit_log(&self, page: PageRequest) -> Result<Page<AuditEntry>, AdminError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    /// Pay the freelancer
    Release,
    /// Return the funds to the client
    Refund,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformStats {
    pub users_by_role: Vec<(UserRole, i64)>,
    pub projects_by_status: Vec<(ProjectStatus, i64)>,
    pub orders_by_status: Vec<(OrderStatus, i64)>,
    pub active_services: i64,
    pub escrows: Vec<EscrowTotalsView>,
    pub pending_payouts: i64,
    pub pending_payout_cents: Cents,
    pub platform_fees_cents: Cents,
}

/// Serializable copy of [`EscrowTotals`] for the stats cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscrowTotalsView {
    pub status: String,
    pub count: i64,
    pub amount_cents: Cents,
}

impl From<EscrowTotals> for EscrowTotalsView {
    fn from(t: EscrowTotals) -> Self {
        Self {
            status: t.status.as_str().to_uppercase(),
            count: t.count,
            amount_cents: t.amount_cents,
        }
    }
}

/// A disputed project or order with its escrow.
#[derive(Debug, Clone, Serialize)]
pub struct Dispute {
    pub escrow: Escrow,
    pub project: Option<Project>,
    pub order: Option<ServiceOrder>,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Admins cannot change their own status")]
    SelfModeration,

    #[error("Escrow is not under dispute")]
    NotDisputed,

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound(_) => AppError::NotFound(err.to_string()),
            AdminError::SelfModeration => AppError::BadRequest(err.to_string()),
            AdminError::NotDisputed => AppError::Conflict(err.to_string()),
            AdminError::Escrow(inner) => inner.into(),
            AdminError::Internal(inner) => inner,
        }
    }
}

/// Repositories the admin service reads and moderates.
pub struct AdminRepositories<U, S, P, V, O, Y, T> {
    pub users: Arc<U>,
    pub sessions: Arc<S>,
    pub projects: Arc<P>,
    pub services: Arc<V>,
    pub orders: Arc<O>,
    pub payouts: Arc<Y>,
    pub transactions: Arc<T>,
    pub audit_log: Arc<dyn AuditLogRepository>,
}

pub struct AdminServiceImpl<U, S, P, V, O, Y, T, E>
where
    E: EscrowRepository,
{
    repos: AdminRepositories<U, S, P, V, O, Y, T>,
    escrows: EscrowServiceImpl<E>,
    auditor: Auditor,
}

impl<U, S, P, V, O, Y, T, E> AdminServiceImpl<U, S, P, V, O, Y, T, E>
where
    U: UserRepository,
    S: SessionRepository,
    P: ProjectRepository,
    V: ServiceRepository,
    O: OrderRepository,
    Y: PayoutRepository,
    T: TransactionRepository,
    E: EscrowRepository + 'static,
{
    pub fn new(
        repos: AdminRepositories<U, S, P, V, O, Y, T>,
        escrows: EscrowServiceImpl<E>,
        auditor: Auditor,
    ) -> Self {
        Self {
            repos,
            escrows,
            auditor,
        }
    }

    async fn escrow_for_project(&self, project: Project) -> Result<Option<Dispute>, AdminError> {
        let escrow = self.escrows.repository().find_by_project(project.id).await?;
        Ok(escrow.map(|escrow| Dispute {
            escrow,
            project: Some(project),
            order: None,
        }))
    }

    async fn escrow_for_order(&self, order: ServiceOrder) -> Result<Option<Dispute>, AdminError> {
        let escrow = self.escrows.repository().find_by_order(order.id).await?;
        Ok(escrow.map(|escrow| Dispute {
            escrow,
            project: None,
            order: Some(order),
        }))
    }
}

#[async_trait]
impl<U, S, P, V, O, Y, T, E> AdminService for AdminServiceImpl<U, S, P, V, O, Y, T, E>
where
    U: UserRepository + 'static,
    S: SessionRepository + 'static,
    P: ProjectRepository + 'static,
    V: ServiceRepository + 'static,
    O: OrderRepository + 'static,
    Y: PayoutRepository + 'static,
    T: TransactionRepository + 'static,
    E: EscrowRepository + 'static,
{
    async fn stats(&self) -> Result<PlatformStats, AdminError> {
        let (pending_payouts, pending_payout_cents) = self.repos.payouts.pending_totals().await?;
        let platform_fees_cents = self
            .repos
            .transactions
            .totals_by_kind()
            .await?
            .into_iter()
            .find(|(kind, _)| *kind == TransactionKind::Fee)
            .map(|(_, total)| total)
            .unwrap_or(0);

        Ok(PlatformStats {
            users_by_role: self.repos.users.count_by_role().await?,
            projects_by_status: self.repos.projects.count_by_status().await?,
            orders_by_status: self.repos.orders.count_by_status().await?,
            active_services: self.repos.services.count_active().await?,
            escrows: self
                .escrows
                .repository()
                .totals_by_status()
                .await?
                .into_iter()
                .map(EscrowTotalsView::from)
                .collect(),
            pending_payouts,
            pending_payout_cents,
            platform_fees_cents,
        })
    }

    async fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, AdminError> {
        let (items, total) = self.repos.users.search(&filter, page).await?;
        Ok(Page::new(items, page, total))
    }

    async fn set_user_status(
        &self,
        admin: Actor,
        user_id: i64,
        status: AccountStatus,
        reason: Option<String>,
    ) -> Result<User, AdminError> {
        if admin.user_id == user_id {
            return Err(AdminError::SelfModeration);
        }
        let user = self
            .repos
            .users
            .set_status(user_id, status)
            .await?
            .ok_or(AdminError::NotFound("User"))?;

        let revoked = if status == AccountStatus::Active {
            0
        } else {
            self.repos.sessions.revoke_all_for_user(user_id).await?
        };

        self.auditor
            .record(
                admin.user_id,
                AdminAction::UserStatusChanged,
                "user",
                user_id,
                json!({ "status": status, "reason": reason, "sessions_revoked": revoked }),
            )
            .await;
        self.escrows
            .notifier()
            .notify(
                user_id,
                NotificationKind::AccountUpdate,
                "Account status changed",
                format!("Your account is now {}.", status),
                None,
            )
            .await;

        Ok(user)
    }

    async fn list_disputes(&self) -> Result<Vec<Dispute>, AdminError> {
        let filter = ProjectFilter {
            status: Some(ProjectStatus::Disputed),
            ..ProjectFilter::default()
        };
        let (projects, _) = self
            .repos
            .projects
            .search(&filter, PageRequest::new(1, DISPUTE_LIST_LIMIT))
            .await?;
        let orders = self.repos.orders.find_by_status(OrderStatus::Disputed).await?;

        let mut disputes = Vec::with_capacity(projects.len() + orders.len());
        for project in projects {
            if let Some(d) = self.escrow_for_project(project).await? {
                disputes.push(d);
            }
        }
        for order in orders {
            if let Some(d) = self.escrow_for_order(order).await? {
                disputes.push(d);
            }
        }
        disputes.sort_by_key(|d| d.escrow.updated_at);
        Ok(disputes)
    }

    async fn resolve_dispute(
        &self,
        admin: Actor,
        escrow_id: i64,
        resolution: Resolution,
        note: Option<String>,
    ) -> Result<Escrow, AdminError> {
        let escrow = self
            .escrows
            .repository()
            .find_by_id(escrow_id)
            .await?
            .ok_or(AdminError::NotFound("Escrow"))?;

        let subject = match escrow.subject() {
            Some(EscrowSubject::Project(id)) => {
                let project = self
                    .repos
                    .projects
                    .find_by_id(id)
                    .await?
                    .ok_or(AdminError::NotFound("Project"))?;
                if project.status != ProjectStatus::Disputed {
                    return Err(AdminError::NotDisputed);
                }
                SubjectTransition::Project {
                    id,
                    from: vec![ProjectStatus::Disputed],
                    to: match resolution {
                        Resolution::Release => ProjectStatus::Completed,
                        Resolution::Refund => ProjectStatus::Cancelled,
                    },
                }
            }
            Some(EscrowSubject::Order(id)) => {
                let order = self
                    .repos
                    .orders
                    .find_by_id(id)
                    .await?
                    .ok_or(AdminError::NotFound("Order"))?;
                if order.status != OrderStatus::Disputed {
                    return Err(AdminError::NotDisputed);
                }
                SubjectTransition::Order {
                    id,
                    from: vec![OrderStatus::Disputed],
                    to: match resolution {
                        Resolution::Release => OrderStatus::Completed,
                        Resolution::Refund => OrderStatus::Cancelled,
                    },
                }
            }
            None => return Err(AdminError::NotDisputed),
        };

        let settled = match resolution {
            Resolution::Release => self.escrows.release(&escrow, Some(subject)).await?,
            Resolution::Refund => self.escrows.refund(&escrow, Some(subject)).await?,
        };

        self.auditor
            .record(
                admin.user_id,
                match resolution {
                    Resolution::Release => AdminAction::DisputeReleased,
                    Resolution::Refund => AdminAction::DisputeRefunded,
                },
                "escrow",
                escrow_id,
                json!({ "note": note, "amount_cents": settled.amount_cents }),
            )
            .await;
        Ok(settled)
    }

    async fn set_project_tier(
        &self,
        admin: Actor,
        project_id: i64,
        tier: ListingTier,
    ) -> Result<Project, AdminError> {
        let project = self
            .repos
            .projects
            .set_tier(project_id, tier)
            .await?
            .ok_or(AdminError::NotFound("Project"))?;
        self.auditor
            .record(
                admin.user_id,
                AdminAction::ProjectTierChanged,
                "project",
                project_id,
                json!({ "tier": tier }),
            )
            .await;
        Ok(project)
    }

    async fn set_service_tier(
        &self,
        admin: Actor,
        service_id: i64,
        tier: ListingTier,
    ) -> Result<ServiceListing, AdminError> {
        let service = self
            .repos
            .services
            .set_tier(service_id, tier)
            .await?
            .ok_or(AdminError::NotFound("Service"))?;
        self.auditor
            .record(
                admin.user_id,
                AdminAction::ServiceTierChanged,
                "service",
                service_id,
                json!({ "tier": tier }),
            )
            .await;
        Ok(service)
    }

    async fn set_service_active(
        &self,
        admin: Actor,
        service_id: i64,
        active: bool,
    ) -> Result<ServiceListing, AdminError> {
        let service = self
            .repos
            .services
            .set_active(service_id, active)
            .await?
            .ok_or(AdminError::NotFound("Service"))?;
        self.auditor
            .record(
                admin.user_id,
                AdminAction::ServiceActivationChanged,
                "service",
                service_id,
                json!({ "active": active }),
            )
            .await;
        Ok(service)
    }

    async fn audit_log(&self, page: PageRequest) -> Result<Page<AuditEntry>, AdminError> {
        let (items, total) = self.repos.audit_log.list(page).await?;
        Ok(Page::new(items, page, total))
    }
}
