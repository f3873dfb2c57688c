//! Recording of admin moderation actions.

use std::sync::Arc;

use crate::domain::{AdminAction, AuditEntry, AuditLogRepository};
use crate::shared::snowflake::SnowflakeGenerator;

/// Writes audit entries. Failures are logged, never surfaced, because the
/// moderation action itself has already been applied.
#[derive(Clone)]
pub struct Auditor {
    repo: Arc<dyn AuditLogRepository>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl Auditor {
    pub fn new(repo: Arc<dyn AuditLogRepository>, id_generator: Arc<SnowflakeGenerator>) -> Self {
        Self { repo, id_generator }
    }

    pub async fn record(
        &self,
        actor_id: i64,
        action: AdminAction,
        target_type: &str,
        target_id: i64,
        detail: serde_json::Value,
    ) {
        let entry = AuditEntry::new(
            self.id_generator.generate(),
            actor_id,
            action,
            target_type,
            target_id,
            detail,
        );
        tracing::info!(actor_id, action = %action, target_type, target_id, "Admin action");
        if let Err(e) = self.repo.record(&entry).await {
            tracing::error!(actor_id, action = %action, error = %e, "Failed to write audit entry");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::MockAuditLogRepository;

    pub fn silent_auditor() -> Auditor {
        let mut repo = MockAuditLogRepository::new();
        repo.expect_record().returning(|_| Ok(()));
        Auditor::new(Arc::new(repo), Arc::new(SnowflakeGenerator::new(1, 1)))
    }
}
