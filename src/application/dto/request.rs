//! Request DTOs
//!
//! Data structures for API request bodies and query strings. Enum fields
//! deserialize from their SCREAMING_SNAKE_CASE wire names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::application::services::admin_service::Resolution;
use crate::application::services::{
    NewApplication, NewProject, NewService, PayoutInput, ProjectChanges, RegisterInput,
    ServiceChanges,
};
use crate::domain::{
    AccountStatus, BudgetType, Cents, ListingTier, OrderParty, PackageTier, PayoutMethod,
    PayoutStatus, ProfileUpdate, ProjectFilter, ProjectStatus, ServiceFilter, ServicePackage,
    UserFilter, UserRole,
};

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Registration request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3-32 characters"))]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    pub role: UserRole,

    #[validate(length(max = 64, message = "Display name must be at most 64 characters"))]
    pub display_name: Option<String>,
}

impl From<RegisterRequest> for RegisterInput {
    fn from(req: RegisterRequest) -> Self {
        Self {
            email: req.email,
            username: req.username,
            password: req.password,
            role: req.role,
            display_name: req.display_name,
        }
    }
}

/// Refresh / logout request
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Update own profile
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 64, message = "Display name must be at most 64 characters"))]
    pub display_name: Option<String>,

    #[validate(length(max = 2000, message = "Bio must be at most 2000 characters"))]
    pub bio: Option<String>,

    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar_url: Option<String>,

    #[validate(length(max = 30, message = "At most 30 skills"))]
    pub skills: Option<Vec<String>>,

    #[validate(range(min = 1, message = "Hourly rate must be positive"))]
    pub hourly_rate_cents: Option<Cents>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            display_name: req.display_name,
            bio: req.bio,
            avatar_url: req.avatar_url,
            skills: req.skills,
            hourly_rate_cents: req.hourly_rate_cents,
        }
    }
}

/// `GET /freelancers` filter
#[derive(Debug, Default, Deserialize)]
pub struct FreelancerSearchQuery {
    pub skill: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: String,

    #[validate(length(min = 20, max = 10000, message = "Description must be 20-10000 characters"))]
    pub description: String,

    #[validate(length(min = 1, max = 64, message = "Category is required"))]
    pub category: String,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 skills"))]
    pub skills: Vec<String>,

    pub budget_type: BudgetType,
    pub budget_min_cents: Cents,
    pub budget_max_cents: Cents,
    pub deadline: Option<DateTime<Utc>>,
}

impl From<CreateProjectRequest> for NewProject {
    fn from(req: CreateProjectRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            category: req.category,
            skills: req.skills,
            budget_type: req.budget_type,
            budget_min_cents: req.budget_min_cents,
            budget_max_cents: req.budget_max_cents,
            deadline: req.deadline,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 20, max = 10000, message = "Description must be 20-10000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 64, message = "Category must be 1-64 characters"))]
    pub category: Option<String>,

    #[validate(length(max = 20, message = "At most 20 skills"))]
    pub skills: Option<Vec<String>>,

    pub budget_type: Option<BudgetType>,
    pub budget_min_cents: Option<Cents>,
    pub budget_max_cents: Option<Cents>,
    pub deadline: Option<DateTime<Utc>>,
}

impl From<UpdateProjectRequest> for ProjectChanges {
    fn from(req: UpdateProjectRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            category: req.category,
            skills: req.skills,
            budget_type: req.budget_type,
            budget_min_cents: req.budget_min_cents,
            budget_max_cents: req.budget_max_cents,
            deadline: req.deadline,
        }
    }
}

/// `GET /projects` filter
#[derive(Debug, Default, Deserialize)]
pub struct ProjectSearchQuery {
    pub status: Option<ProjectStatus>,
    pub category: Option<String>,
    pub skill: Option<String>,
    pub min_budget: Option<Cents>,
    pub max_budget: Option<Cents>,
    pub q: Option<String>,
}

impl From<ProjectSearchQuery> for ProjectFilter {
    fn from(q: ProjectSearchQuery) -> Self {
        Self {
            status: q.status,
            category: q.category,
            skill: q.skill,
            min_budget_cents: q.min_budget,
            max_budget_cents: q.max_budget,
            query: q.q,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyRequest {
    #[validate(length(min = 20, max = 5000, message = "Cover letter must be 20-5000 characters"))]
    pub cover_letter: String,

    #[validate(range(min = 1, message = "Bid must be positive"))]
    pub bid_amount_cents: Cents,

    #[validate(range(min = 1, max = 365, message = "Estimate must be 1-365 days"))]
    pub estimated_days: i32,
}

impl From<ApplyRequest> for NewApplication {
    fn from(req: ApplyRequest) -> Self {
        Self {
            cover_letter: req.cover_letter,
            bid_amount_cents: req.bid_amount_cents,
            estimated_days: req.estimated_days,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PackageRequest {
    pub tier: PackageTier,

    #[validate(length(min = 1, max = 100, message = "Package title must be 1-100 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 2000, message = "Package description too long"))]
    pub description: String,

    #[validate(range(min = 1, message = "Price must be positive"))]
    pub price_cents: Cents,

    #[validate(range(min = 1, max = 365, message = "Delivery must be 1-365 days"))]
    pub delivery_days: i32,

    #[validate(range(min = 0, max = 100, message = "Revisions must be 0-100"))]
    pub revisions: i32,

    #[serde(default)]
    pub features: Vec<String>,
}

impl From<PackageRequest> for ServicePackage {
    fn from(req: PackageRequest) -> Self {
        Self {
            tier: req.tier,
            title: req.title,
            description: req.description,
            price_cents: req.price_cents,
            delivery_days: req.delivery_days,
            revisions: req.revisions,
            features: req.features,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateServiceRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: String,

    #[validate(length(min = 20, max = 10000, message = "Description must be 20-10000 characters"))]
    pub description: String,

    #[validate(length(min = 1, max = 64, message = "Category is required"))]
    pub category: String,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Vec<String>,

    #[validate(length(min = 1, max = 3, message = "Between 1 and 3 packages"), nested)]
    pub packages: Vec<PackageRequest>,
}

impl From<CreateServiceRequest> for NewService {
    fn from(req: CreateServiceRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            category: req.category,
            tags: req.tags,
            packages: req.packages.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateServiceRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 20, max = 10000, message = "Description must be 20-10000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 64, message = "Category must be 1-64 characters"))]
    pub category: Option<String>,

    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Option<Vec<String>>,
}

impl From<UpdateServiceRequest> for ServiceChanges {
    fn from(req: UpdateServiceRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            category: req.category,
            tags: req.tags,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplacePackagesRequest {
    #[validate(length(min = 1, max = 3, message = "Between 1 and 3 packages"), nested)]
    pub packages: Vec<PackageRequest>,
}

/// `GET /services` filter
#[derive(Debug, Default, Deserialize)]
pub struct ServiceSearchQuery {
    pub category: Option<String>,
    pub max_price: Option<Cents>,
    pub q: Option<String>,
}

impl From<ServiceSearchQuery> for ServiceFilter {
    fn from(q: ServiceSearchQuery) -> Self {
        Self {
            category: q.category,
            max_price_cents: q.max_price,
            query: q.q,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    pub tier: PackageTier,

    #[serde(default)]
    #[validate(length(max = 5000, message = "Requirements must be at most 5000 characters"))]
    pub requirements: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeliverOrderRequest {
    #[validate(length(min = 1, max = 5000, message = "Delivery note must be 1-5000 characters"))]
    pub note: String,
}

/// `GET /orders/mine?role=buyer|seller`
#[derive(Debug, Deserialize)]
pub struct OrderRoleQuery {
    #[serde(default = "default_order_party")]
    pub role: OrderParty,
}

fn default_order_party() -> OrderParty {
    OrderParty::Buyer
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayoutRequest {
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount_cents: Cents,

    pub method: PayoutMethod,

    #[validate(length(min = 3, max = 255, message = "Destination must be 3-255 characters"))]
    pub destination: String,
}

impl From<PayoutRequest> for PayoutInput {
    fn from(req: PayoutRequest) -> Self {
        Self {
            amount_cents: req.amount_cents,
            method: req.method,
            destination: req.destination,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartConversationRequest {
    pub participant_id: String,
    pub project_id: Option<String>,

    #[validate(length(min = 1, max = 5000, message = "Message must be 1-5000 characters"))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 5000, message = "Message must be 1-5000 characters"))]
    pub content: String,
}

/// Keyset pagination for message history
#[derive(Debug, Default, Deserialize)]
pub struct MessageHistoryQuery {
    pub before: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub project_id: Option<String>,
    pub order_id: Option<String>,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,

    #[serde(default)]
    #[validate(length(max = 5000, message = "Comment must be at most 5000 characters"))]
    pub comment: String,
}

/// `GET /admin/users` filter
#[derive(Debug, Default, Deserialize)]
pub struct UserSearchQuery {
    pub role: Option<UserRole>,
    pub status: Option<AccountStatus>,
    pub q: Option<String>,
}

impl From<UserSearchQuery> for UserFilter {
    fn from(q: UserSearchQuery) -> Self {
        Self {
            role: q.role,
            status: q.status,
            query: q.q,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetUserStatusRequest {
    pub status: AccountStatus,

    #[validate(length(max = 1000, message = "Reason must be at most 1000 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveDisputeRequest {
    pub resolution: Resolution,

    #[validate(length(max = 2000, message = "Note must be at most 2000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetTierRequest {
    pub tier: ListingTier,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// `GET /admin/payouts` filter
#[derive(Debug, Default, Deserialize)]
pub struct PayoutStatusQuery {
    pub status: Option<PayoutStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompletePayoutRequest {
    #[validate(length(min = 1, max = 255, message = "Reference must be 1-255 characters"))]
    pub reference: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FailPayoutRequest {
    #[validate(length(min = 1, max = 1000, message = "Reason must be 1-1000 characters"))]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_request_parses_role() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username":"koi","email":"koi@example.com","password":"hunter2hunter2","role":"FREELANCER"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.role, UserRole::Freelancer);
    }

    #[test]
    fn test_register_request_rejects_short_password() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username":"koi","email":"koi@example.com","password":"short","role":"CLIENT"}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn test_nested_package_validation() {
        let req: CreateServiceRequest = serde_json::from_str(
            r#"{
                "title": "Logo design",
                "description": "Hand-drawn logos in three concepts, vector files included.",
                "category": "design",
                "packages": [
                    {"tier":"BASIC","title":"Basic","price_cents":0,"delivery_days":3,"revisions":1}
                ]
            }"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_project_query_maps_to_filter() {
        let query = ProjectSearchQuery {
            status: Some(ProjectStatus::Open),
            min_budget: Some(1000),
            q: Some("rust".into()),
            ..Default::default()
        };
        let filter = ProjectFilter::from(query);
        assert_eq!(filter.status, Some(ProjectStatus::Open));
        assert_eq!(filter.min_budget_cents, Some(1000));
        assert_eq!(filter.query.as_deref(), Some("rust"));
        assert_eq!(filter.client_id, None);
    }

    #[test]
    fn test_order_role_defaults_to_buyer() {
        let q: OrderRoleQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.role, OrderParty::Buyer);
    }
}
