//! Background Jobs
//!
//! - The auto-complete sweeper: DELIVERED orders the buyer has not acted on
//!   within `platform.auto_complete_days` are completed and their escrow is
//!   released to the seller.
//! - The refund reconciler: refunded escrows whose provider refund failed
//!   are retried until the provider accepts them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;

use crate::application::services::order_service::auto_complete_cutoff;
use crate::application::services::{EscrowService, OrderService};

/// Orders completed per sweep; the rest wait for the next tick.
pub const SWEEP_BATCH: i64 = 100;

/// Refunds younger than this may still be in flight inline.
const REFUND_GRACE_SECS: i64 = 60;

/// Sweep every `interval` until the task is aborted.
pub fn spawn_auto_complete_sweeper(
    service: Arc<dyn OrderService>,
    interval: Duration,
    auto_complete_days: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let cutoff = auto_complete_cutoff(Utc::now(), auto_complete_days);
            match service.auto_complete_due(cutoff, SWEEP_BATCH).await {
                Ok(0) => tracing::trace!("Auto-complete sweep found nothing due"),
                Ok(completed) => tracing::info!(completed, "Auto-completed delivered orders"),
                Err(e) => tracing::error!(error = %e, "Auto-complete sweep failed"),
            }
        }
    })
}

/// Retry outstanding provider refunds every `interval`.
pub fn spawn_refund_reconciler(
    service: Arc<dyn EscrowService>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let refunded_before = Utc::now() - ChronoDuration::seconds(REFUND_GRACE_SECS);
            match service.reconcile_refunds(refunded_before, SWEEP_BATCH).await {
                Ok(0) => tracing::trace!("No provider refunds outstanding"),
                Ok(returned) => tracing::info!(returned, "Outstanding provider refunds issued"),
                Err(e) => tracing::error!(error = %e, "Refund reconciliation failed"),
            }
        }
    })
}
