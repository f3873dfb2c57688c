//! Per-request service construction.
//!
//! Services are cheap to build: every field is an `Arc` or a small value
//! copied out of the settings.

use std::sync::Arc;

use crate::application::audit::Auditor;
use crate::application::events::Notifier;
use crate::application::services::{
    AdminRepositories, AdminServiceImpl, ApplicationServiceImpl, AuthServiceImpl,
    CatalogServiceImpl, EscrowServiceImpl, MessagingServiceImpl, NotificationServiceImpl,
    OrderServiceImpl, PayoutServiceImpl, ProjectServiceImpl, ReviewServiceImpl, UserServiceImpl,
};
use crate::domain::FeePolicy;
use crate::infrastructure::repositories::{
    PgApplicationRepository, PgAuditLogRepository, PgConversationRepository, PgEscrowRepository,
    PgNotificationRepository, PgOrderRepository, PgPayoutRepository, PgProjectRepository,
    PgReviewRepository, PgServiceRepository, PgSessionRepository, PgTransactionRepository,
    PgUserRepository,
};
use crate::startup::AppState;

pub type PgAuthService = AuthServiceImpl<PgUserRepository, PgSessionRepository>;
pub type PgUserService = UserServiceImpl<PgUserRepository, PgReviewRepository>;
pub type PgEscrowService = EscrowServiceImpl<PgEscrowRepository>;
pub type PgProjectService = ProjectServiceImpl<PgProjectRepository, PgEscrowRepository>;
pub type PgApplicationService = ApplicationServiceImpl<PgApplicationRepository, PgProjectRepository>;
pub type PgCatalogService = CatalogServiceImpl<PgServiceRepository>;
pub type PgOrderService = OrderServiceImpl<PgOrderRepository, PgServiceRepository, PgEscrowRepository>;
pub type PgPayoutService = PayoutServiceImpl<PgPayoutRepository, PgTransactionRepository>;
pub type PgMessagingService =
    MessagingServiceImpl<PgConversationRepository, PgUserRepository, PgProjectRepository>;
pub type PgNotificationService = NotificationServiceImpl<PgNotificationRepository>;
pub type PgReviewService = ReviewServiceImpl<PgReviewRepository, PgProjectRepository, PgOrderRepository>;
pub type PgAdminService = AdminServiceImpl<
    PgUserRepository,
    PgSessionRepository,
    PgProjectRepository,
    PgServiceRepository,
    PgOrderRepository,
    PgPayoutRepository,
    PgTransactionRepository,
    PgEscrowRepository,
>;

impl AppState {
    fn currency(&self) -> String {
        self.settings.payments.currency.clone()
    }

    pub fn notifier(&self) -> Notifier {
        Notifier::new(
            Arc::new(PgNotificationRepository::new(self.db.clone())),
            self.publisher.clone(),
            self.snowflake.clone(),
        )
    }

    fn auditor(&self) -> Auditor {
        Auditor::new(
            Arc::new(PgAuditLogRepository::new(self.db.clone())),
            self.snowflake.clone(),
        )
    }

    pub fn auth_service(&self) -> PgAuthService {
        AuthServiceImpl::new(
            Arc::new(PgUserRepository::new(self.db.clone())),
            Arc::new(PgSessionRepository::new(self.db.clone())),
            self.snowflake.clone(),
            self.settings.jwt.clone(),
        )
    }

    pub fn user_service(&self) -> PgUserService {
        UserServiceImpl::new(
            Arc::new(PgUserRepository::new(self.db.clone())),
            Arc::new(PgReviewRepository::new(self.db.clone())),
        )
    }

    pub fn escrow_service(&self) -> PgEscrowService {
        EscrowServiceImpl::new(
            Arc::new(PgEscrowRepository::new(self.db.clone())),
            self.payments.clone(),
            self.notifier(),
            self.snowflake.clone(),
            FeePolicy::new(self.settings.platform.fee_bps),
        )
    }

    pub fn project_service(&self) -> PgProjectService {
        ProjectServiceImpl::new(
            Arc::new(PgProjectRepository::new(self.db.clone())),
            self.escrow_service(),
            self.snowflake.clone(),
        )
    }

    pub fn application_service(&self) -> PgApplicationService {
        ApplicationServiceImpl::new(
            Arc::new(PgApplicationRepository::new(self.db.clone())),
            Arc::new(PgProjectRepository::new(self.db.clone())),
            self.notifier(),
            self.snowflake.clone(),
            self.currency(),
        )
    }

    pub fn catalog_service(&self) -> PgCatalogService {
        CatalogServiceImpl::new(
            Arc::new(PgServiceRepository::new(self.db.clone())),
            self.snowflake.clone(),
        )
    }

    pub fn order_service(&self) -> PgOrderService {
        OrderServiceImpl::new(
            Arc::new(PgOrderRepository::new(self.db.clone())),
            Arc::new(PgServiceRepository::new(self.db.clone())),
            self.escrow_service(),
            self.snowflake.clone(),
            self.currency(),
        )
    }

    pub fn payout_service(&self) -> PgPayoutService {
        PayoutServiceImpl::new(
            Arc::new(PgPayoutRepository::new(self.db.clone())),
            Arc::new(PgTransactionRepository::new(self.db.clone())),
            self.payments.clone(),
            self.notifier(),
            self.auditor(),
            self.snowflake.clone(),
            self.currency(),
            self.settings.platform.min_payout_cents,
        )
    }

    pub fn messaging_service(&self) -> PgMessagingService {
        MessagingServiceImpl::new(
            Arc::new(PgConversationRepository::new(self.db.clone())),
            Arc::new(PgUserRepository::new(self.db.clone())),
            Arc::new(PgProjectRepository::new(self.db.clone())),
            self.notifier(),
            self.snowflake.clone(),
        )
    }

    pub fn notification_service(&self) -> PgNotificationService {
        NotificationServiceImpl::new(Arc::new(PgNotificationRepository::new(self.db.clone())))
    }

    pub fn review_service(&self) -> PgReviewService {
        ReviewServiceImpl::new(
            Arc::new(PgReviewRepository::new(self.db.clone())),
            Arc::new(PgProjectRepository::new(self.db.clone())),
            Arc::new(PgOrderRepository::new(self.db.clone())),
            self.notifier(),
            self.snowflake.clone(),
        )
    }

    pub fn admin_service(&self) -> PgAdminService {
        let db = &self.db;
        AdminServiceImpl::new(
            AdminRepositories {
                users: Arc::new(PgUserRepository::new(db.clone())),
                sessions: Arc::new(PgSessionRepository::new(db.clone())),
                projects: Arc::new(PgProjectRepository::new(db.clone())),
                services: Arc::new(PgServiceRepository::new(db.clone())),
                orders: Arc::new(PgOrderRepository::new(db.clone())),
                payouts: Arc::new(PgPayoutRepository::new(db.clone())),
                transactions: Arc::new(PgTransactionRepository::new(db.clone())),
                audit_log: Arc::new(PgAuditLogRepository::new(db.clone())),
            },
            self.escrow_service(),
            self.auditor(),
        )
    }
}
