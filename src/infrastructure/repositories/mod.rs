//! Repository Implementations
//!
//! PostgreSQL implementations of the domain repository traits. Every status
//! change is a conditional `UPDATE ... WHERE status = ANY(...)`, so two
//! concurrent writers can never both win a transition; multi-table changes
//! (accepting a bid, settling an escrow, requesting a payout) run inside a
//! single database transaction.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use koihire::infrastructure::repositories::{PgProjectRepository, PgEscrowRepository};
//!
//! let projects = Arc::new(PgProjectRepository::new(pool.clone()));
//! let escrows = Arc::new(PgEscrowRepository::new(pool.clone()));
//! ```

pub mod application_repository;
pub mod audit_repository;
pub mod conversation_repository;
pub mod escrow_repository;
pub mod notification_repository;
pub mod order_repository;
pub mod payout_repository;
pub mod project_repository;
pub mod review_repository;
pub mod service_repository;
pub mod session_repository;
pub mod transaction_repository;
pub mod user_repository;

pub use application_repository::PgApplicationRepository;
pub use audit_repository::PgAuditLogRepository;
pub use conversation_repository::PgConversationRepository;
pub use escrow_repository::PgEscrowRepository;
pub use notification_repository::PgNotificationRepository;
pub use order_repository::PgOrderRepository;
pub use payout_repository::PgPayoutRepository;
pub use project_repository::PgProjectRepository;
pub use review_repository::PgReviewRepository;
pub use service_repository::PgServiceRepository;
pub use session_repository::PgSessionRepository;
pub use transaction_repository::PgTransactionRepository;
pub use user_repository::PgUserRepository;

use crate::shared::error::AppError;

/// SQL expression ranking listing tiers; keep in step with `ListingTier::rank`.
pub(crate) const TIER_RANK: &str = "CASE tier WHEN 'spotlight' THEN 3 WHEN 'premium' THEN 2 \
     WHEN 'featured' THEN 1 ELSE 0 END";

/// Turn a unique-constraint violation into a `Conflict` with `message`.
pub(crate) fn map_unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

/// `%term%` for ILIKE, with LIKE wildcards in the term escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Database names of a set of statuses, for `status = ANY($n)`.
pub(crate) fn status_names<S: Copy, F: Fn(S) -> &'static str>(statuses: &[S], name: F) -> Vec<String> {
    statuses.iter().map(|s| name(*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListingTier, ProjectStatus};

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern(" 100%_off "), "%100\\%\\_off%");
    }

    #[test]
    fn test_status_names() {
        let names = status_names(&[ProjectStatus::Open, ProjectStatus::InProgress], |s| s.as_str());
        assert_eq!(names, vec!["open".to_string(), "in_progress".to_string()]);
    }

    #[test]
    fn test_tier_rank_matches_domain() {
        for tier in ListingTier::ALL {
            let needle = format!("'{}' THEN {}", tier.as_str(), tier.rank());
            if tier.rank() > 0 {
                assert!(TIER_RANK.contains(&needle), "missing {}", needle);
            }
        }
    }
}
