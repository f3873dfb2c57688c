//! Admin audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    pub enum AdminAction {
        UserStatusChanged => "user_status_changed",
        DisputeReleased => "dispute_released",
        DisputeRefunded => "dispute_refunded",
        ProjectTierChanged => "project_tier_changed",
        ServiceTierChanged => "service_tier_changed",
        ServiceActivationChanged => "service_activation_changed",
        PayoutProcessed => "payout_processed",
        PayoutCompleted => "payout_completed",
        PayoutFailed => "payout_failed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub action: AdminAction,
    /// Table-ish name of the target, e.g. `user` or `escrow`
    pub target_type: String,
    pub target_id: i64,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        id: i64,
        actor_id: i64,
        action: AdminAction,
        target_type: &str,
        target_id: i64,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id,
            actor_id,
            action,
            target_type: target_type.to_string(),
            target_id,
            detail,
            created_at: Utc::now(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AppError>;

    /// Newest first.
    async fn list(&self, page: PageRequest) -> Result<(Vec<AuditEntry>, i64), AppError>;
}
