//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **AuthService**: Registration, JWT tokens, refresh sessions
//! - **UserService**: Profiles and the freelancer directory
//! - **ProjectService**: Project postings and their lifecycle
//! - **ApplicationService**: Freelancer applications and hiring
//! - **CatalogService**: Service listings and packages
//! - **OrderService**: Service orders and delivery
//! - **EscrowService**: Funding, release and refund of escrowed money
//! - **PayoutService**: Wallet balance and withdrawals
//! - **MessagingService**: Conversations and direct messages
//! - **NotificationService**: In-app notifications
//! - **ReviewService**: Ratings after completed work
//! - **AdminService**: Moderation, disputes and platform statistics

pub mod admin_service;
pub mod application_service;
pub mod auth_service;
pub mod catalog_service;
pub mod escrow_service;
pub mod messaging_service;
pub mod notification_service;
pub mod order_service;
pub mod payout_service;
pub mod project_service;
pub mod review_service;
pub mod user_service;

pub use admin_service::{
    AdminError, AdminRepositories, AdminService, AdminServiceImpl, Dispute, PlatformStats,
    Resolution,
};
pub use application_service::{
    ApplicationError, ApplicationService, ApplicationServiceImpl, NewApplication,
};
pub use auth_service::{AuthError, AuthService, AuthServiceImpl, AuthTokens, Claims, RegisterInput};
pub use catalog_service::{CatalogError, CatalogService, CatalogServiceImpl, NewService, ServiceChanges};
pub use escrow_service::{EscrowError, EscrowService, EscrowServiceImpl, FundingResult};
pub use messaging_service::{MessagingError, MessagingService, MessagingServiceImpl};
pub use notification_service::{NotificationService, NotificationServiceImpl};
pub use order_service::{OrderError, OrderService, OrderServiceImpl};
pub use payout_service::{PayoutError, PayoutInput, PayoutService, PayoutServiceImpl, Wallet};
pub use project_service::{NewProject, ProjectChanges, ProjectError, ProjectService, ProjectServiceImpl};
pub use review_service::{ReviewError, ReviewInput, ReviewService, ReviewServiceImpl};
pub use user_service::{UserError, UserService, UserServiceImpl};
