//! Response DTOs
//!
//! Data structures for API response bodies. Snowflake ids are rendered as
//! strings so JavaScript clients do not lose precision.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::services::{AuthTokens, Dispute, FundingResult, PlatformStats, Wallet};
use crate::domain::{
    AccountStatus, AdminAction, ApplicationStatus, AuditEntry, BudgetType, Cents, Conversation,
    ConversationSummary, Escrow, EscrowStatus, ListingTier, Message, Notification,
    NotificationKind, OrderStatus, PackageTier, Payout, PayoutMethod, PayoutStatus, Project,
    ProjectStatus, RatingSummary, Review, ServiceListing, ServiceOrder, ServicePackage,
    Transaction, TransactionKind, User, UserRole,
};
use crate::domain::Application as Bid;
use crate::shared::pagination::Page;

fn id_str(id: i64) -> String {
    id.to_string()
}

fn opt_id(id: Option<i64>) -> Option<String> {
    id.map(|id| id.to_string())
}

/// Authentication tokens response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

impl From<AuthTokens> for TokenResponse {
    fn from(tokens: AuthTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            token_type: tokens.token_type,
        }
    }
}

/// Registration and login response (user plus tokens)
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

impl AuthResponse {
    pub fn new(user: User, tokens: AuthTokens) -> Self {
        Self {
            user: UserResponse::from_user(user, true),
            tokens: tokens.into(),
        }
    }
}

/// User response
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub skills: Vec<String>,
    pub hourly_rate_cents: Option<Cents>,
    pub role: UserRole,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    /// Email is only included for the account owner and admins.
    pub fn from_user(user: User, include_email: bool) -> Self {
        Self {
            id: id_str(user.id),
            username: user.username,
            email: if include_email { Some(user.email) } else { None },
            display_name: user.display_name,
            bio: user.bio,
            avatar_url: user.avatar_url,
            skills: user.skills,
            hourly_rate_cents: user.hourly_rate_cents,
            role: user.role,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

/// Public profile with rating summary
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub rating: RatingSummary,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub client_id: String,
    pub freelancer_id: Option<String>,
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

impl From<Project> for ProjectResponse {
    fn from(p: Project) -> Self {
        Self {
            id: id_str(p.id),
            client_id: id_str(p.client_id),
            freelancer_id: opt_id(p.freelancer_id),
            title: p.title,
            description: p.description,
            category: p.category,
            skills: p.skills,
            budget_type: p.budget_type,
            budget_min_cents: p.budget_min_cents,
            budget_max_cents: p.budget_max_cents,
            deadline: p.deadline,
            status: p.status,
            tier: p.tier,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApplicationResponse {
    pub id: String,
    pub project_id: String,
    pub freelancer_id: String,
    pub cover_letter: String,
    pub bid_amount_cents: Cents,
    pub estimated_days: i32,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Bid> for ApplicationResponse {
    fn from(a: Bid) -> Self {
        Self {
            id: id_str(a.id),
            project_id: id_str(a.project_id),
            freelancer_id: id_str(a.freelancer_id),
            cover_letter: a.cover_letter,
            bid_amount_cents: a.bid_amount_cents,
            estimated_days: a.estimated_days,
            status: a.status,
            created_at: a.created_at,
        }
    }
}

/// Result of accepting a bid
#[derive(Debug, Serialize)]
pub struct AcceptedApplicationResponse {
    pub application: ApplicationResponse,
    pub project: ProjectResponse,
    pub escrow: EscrowResponse,
}

#[derive(Debug, Serialize)]
pub struct PackageResponse {
    pub tier: PackageTier,
    pub title: String,
    pub description: String,
    pub price_cents: Cents,
    pub delivery_days: i32,
    pub revisions: i32,
    pub features: Vec<String>,
}

impl From<ServicePackage> for PackageResponse {
    fn from(p: ServicePackage) -> Self {
        Self {
            tier: p.tier,
            title: p.title,
            description: p.description,
            price_cents: p.price_cents,
            delivery_days: p.delivery_days,
            revisions: p.revisions,
            features: p.features,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub id: String,
    pub freelancer_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub tier: ListingTier,
    pub packages: Vec<PackageResponse>,
    /// Price of the cheapest package
    pub starting_at_cents: Option<Cents>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ServiceListing> for ServiceResponse {
    fn from(s: ServiceListing) -> Self {
        let starting_at_cents = s.starting_price();
        Self {
            id: id_str(s.id),
            freelancer_id: id_str(s.freelancer_id),
            title: s.title,
            description: s.description,
            category: s.category,
            tags: s.tags,
            is_active: s.is_active,
            tier: s.tier,
            packages: s.packages.into_iter().map(Into::into).collect(),
            starting_at_cents,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub service_id: String,
    pub package_tier: PackageTier,
    pub buyer_id: String,
    pub seller_id: String,
    pub title: String,
    pub price_cents: Cents,
    pub delivery_days: i32,
    pub revisions_allowed: i32,
    pub revisions_used: i32,
    pub requirements: String,
    pub delivery_note: Option<String>,
    pub status: OrderStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ServiceOrder> for OrderResponse {
    fn from(o: ServiceOrder) -> Self {
        Self {
            id: id_str(o.id),
            service_id: id_str(o.service_id),
            package_tier: o.package_tier,
            buyer_id: id_str(o.buyer_id),
            seller_id: id_str(o.seller_id),
            title: o.title,
            price_cents: o.price_cents,
            delivery_days: o.delivery_days,
            revisions_allowed: o.revisions_allowed,
            revisions_used: o.revisions_used,
            requirements: o.requirements,
            delivery_note: o.delivery_note,
            status: o.status,
            due_at: o.due_at,
            delivered_at: o.delivered_at,
            completed_at: o.completed_at,
            cancelled_at: o.cancelled_at,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

/// A newly placed order and the escrow the buyer must fund
#[derive(Debug, Serialize)]
pub struct PlacedOrderResponse {
    pub order: OrderResponse,
    pub escrow: EscrowResponse,
}

#[derive(Debug, Serialize)]
pub struct EscrowResponse {
    pub id: String,
    pub project_id: Option<String>,
    pub order_id: Option<String>,
    pub client_id: String,
    pub freelancer_id: String,
    pub amount_cents: Cents,
    pub fee_cents: Cents,
    pub currency: String,
    pub status: EscrowStatus,
    pub funded_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Escrow> for EscrowResponse {
    fn from(e: Escrow) -> Self {
        Self {
            id: id_str(e.id),
            project_id: opt_id(e.project_id),
            order_id: opt_id(e.order_id),
            client_id: id_str(e.client_id),
            freelancer_id: id_str(e.freelancer_id),
            amount_cents: e.amount_cents,
            fee_cents: e.fee_cents,
            currency: e.currency,
            status: e.status,
            funded_at: e.funded_at,
            released_at: e.released_at,
            refunded_at: e.refunded_at,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FundingResponse {
    pub escrow: EscrowResponse,
    /// Handed to the payment form when the client still has to pay
    pub client_secret: Option<String>,
}

impl From<FundingResult> for FundingResponse {
    fn from(r: FundingResult) -> Self {
        Self {
            escrow: r.escrow.into(),
            client_secret: r.client_secret,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub currency: String,
    pub escrow_id: Option<String>,
    pub payout_id: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            id: id_str(t.id),
            kind: t.kind,
            amount_cents: t.amount_cents,
            currency: t.currency,
            escrow_id: opt_id(t.escrow_id),
            payout_id: opt_id(t.payout_id),
            description: t.description,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub available_cents: Cents,
    pub currency: String,
    pub transactions: Page<TransactionResponse>,
}

impl From<Wallet> for WalletResponse {
    fn from(w: Wallet) -> Self {
        Self {
            available_cents: w.available_cents,
            currency: w.currency,
            transactions: w.transactions.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub id: String,
    pub freelancer_id: String,
    pub amount_cents: Cents,
    pub currency: String,
    pub method: PayoutMethod,
    pub destination: String,
    pub status: PayoutStatus,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payout> for PayoutResponse {
    fn from(p: Payout) -> Self {
        Self {
            id: id_str(p.id),
            freelancer_id: id_str(p.freelancer_id),
            amount_cents: p.amount_cents,
            currency: p.currency,
            method: p.method,
            destination: p.destination,
            status: p.status,
            provider_reference: p.provider_reference,
            failure_reason: p.failure_reason,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: id_str(m.id),
            conversation_id: id_str(m.conversation_id),
            sender_id: id_str(m.sender_id),
            content: m.content,
            read_at: m.read_at,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: String,
    pub participant_ids: [String; 2],
    pub project_id: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationResponse {
    fn from(c: Conversation) -> Self {
        Self {
            id: id_str(c.id),
            participant_ids: [id_str(c.participant_a), id_str(c.participant_b)],
            project_id: opt_id(c.project_id),
            last_message_at: c.last_message_at,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationSummaryResponse {
    #[serde(flatten)]
    pub conversation: ConversationResponse,
    pub last_message: Option<MessageResponse>,
    pub unread_count: i64,
}

impl From<ConversationSummary> for ConversationSummaryResponse {
    fn from(s: ConversationSummary) -> Self {
        Self {
            conversation: s.conversation.into(),
            last_message: s.last_message.map(Into::into),
            unread_count: s.unread_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: id_str(n.id),
            kind: n.kind,
            title: n.title,
            body: n.body,
            link: n.link,
            read: n.read_at.is_some(),
            created_at: n.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
    pub project_id: Option<String>,
    pub order_id: Option<String>,
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        Self {
            id: id_str(r.id),
            reviewer_id: id_str(r.reviewer_id),
            reviewee_id: id_str(r.reviewee_id),
            project_id: opt_id(r.project_id),
            order_id: opt_id(r.order_id),
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub id: String,
    pub actor_id: String,
    pub action: AdminAction,
    pub target_type: String,
    pub target_id: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(a: AuditEntry) -> Self {
        Self {
            id: id_str(a.id),
            actor_id: id_str(a.actor_id),
            action: a.action,
            target_type: a.target_type,
            target_id: id_str(a.target_id),
            detail: a.detail,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DisputeResponse {
    pub escrow: EscrowResponse,
    pub project: Option<ProjectResponse>,
    pub order: Option<OrderResponse>,
}

impl From<Dispute> for DisputeResponse {
    fn from(d: Dispute) -> Self {
        Self {
            escrow: d.escrow.into(),
            project: d.project.map(Into::into),
            order: d.order.map(Into::into),
        }
    }
}

/// Count keyed by a status or role name
#[derive(Debug, Serialize)]
pub struct CountEntry<K: Serialize> {
    pub key: K,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub users_by_role: Vec<CountEntry<UserRole>>,
    pub projects_by_status: Vec<CountEntry<ProjectStatus>>,
    pub orders_by_status: Vec<CountEntry<OrderStatus>>,
    pub active_services: i64,
    pub escrows: Vec<crate::application::services::admin_service::EscrowTotalsView>,
    pub pending_payouts: i64,
    pub pending_payout_cents: Cents,
    pub platform_fees_cents: Cents,
}

fn counts<K: Serialize>(pairs: Vec<(K, i64)>) -> Vec<CountEntry<K>> {
    pairs
        .into_iter()
        .map(|(key, count)| CountEntry { key, count })
        .collect()
}

impl From<PlatformStats> for StatsResponse {
    fn from(s: PlatformStats) -> Self {
        Self {
            users_by_role: counts(s.users_by_role),
            projects_by_status: counts(s.projects_by_status),
            orders_by_status: counts(s.orders_by_status),
            active_services: s.active_services,
            escrows: s.escrows,
            pending_payouts: s.pending_payouts,
            pending_payout_cents: s.pending_payout_cents,
            platform_fees_cents: s.platform_fees_cents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// Number of rows a bulk operation touched
#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EscrowSubject;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ids_serialize_as_strings() {
        let escrow = Escrow::pending(1_234_567_890_123_456_789, EscrowSubject::Order(42), 7, 8, 5000, "usd");
        let json = serde_json::to_value(EscrowResponse::from(escrow)).unwrap();
        assert_eq!(json["id"], "1234567890123456789");
        assert_eq!(json["order_id"], "42");
        assert_eq!(json["project_id"], serde_json::Value::Null);
        assert_eq!(json["status"], "PENDING");
    }

    #[test]
    fn test_email_hidden_for_public_profile() {
        let user = User {
            id: 5,
            email: "a@b.co".into(),
            username: "koi".into(),
            ..User::default()
        };
        let json = serde_json::to_value(UserResponse::from_user(user, false)).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["role"], "CLIENT");
    }

    #[test]
    fn test_service_starting_price() {
        let service = ServiceListing {
            packages: vec![
                ServicePackage {
                    tier: PackageTier::Basic,
                    title: "Basic".into(),
                    description: String::new(),
                    price_cents: 2500,
                    delivery_days: 3,
                    revisions: 1,
                    features: vec![],
                },
                ServicePackage {
                    tier: PackageTier::Premium,
                    title: "Premium".into(),
                    description: String::new(),
                    price_cents: 9000,
                    delivery_days: 7,
                    revisions: 5,
                    features: vec![],
                },
            ],
            ..ServiceListing::default()
        };
        let resp = ServiceResponse::from(service);
        assert_eq!(resp.starting_at_cents, Some(2500));
        assert_eq!(resp.packages.len(), 2);
    }
}
