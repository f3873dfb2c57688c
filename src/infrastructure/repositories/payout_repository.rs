//! Payout Repository Implementation
//!
//! Payout requests take a transaction-scoped advisory lock keyed on the
//! freelancer id before reading the balance. Two concurrent requests from
//! the same freelancer serialize on that lock, so the balance check and the
//! WITHDRAWAL insert cannot interleave.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    Cents, Payout, PayoutMethod, PayoutRepository, PayoutRequestOutcome, PayoutStatus,
    PayoutUpdate, Transaction,
};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

use super::status_names;
use super::transaction_repository::{balance_on, insert_transactions};

const PAYOUT_COLUMNS: &str = "id, freelancer_id, amount_cents, currency, method, destination, \
     status, provider_reference, failure_reason, processed_by, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct PayoutRow {
    id: i64,
    freelancer_id: i64,
    amount_cents: i64,
    currency: String,
    method: String,
    destination: String,
    status: String,
    provider_reference: Option<String>,
    failure_reason: Option<String>,
    processed_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PayoutRow> for Payout {
    type Error = AppError;

    fn try_from(row: PayoutRow) -> Result<Self, Self::Error> {
        Ok(Payout {
            id: row.id,
            freelancer_id: row.freelancer_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            method: PayoutMethod::from_db(&row.method)?,
            destination: row.destination,
            status: PayoutStatus::from_db(&row.status)?,
            provider_reference: row.provider_reference,
            failure_reason: row.failure_reason,
            processed_by: row.processed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect(rows: Vec<PayoutRow>) -> Result<Vec<Payout>, AppError> {
    rows.into_iter().map(Payout::try_from).collect()
}

/// PostgreSQL payout repository.
#[derive(Clone)]
pub struct PgPayoutRepository {
    pool: PgPool,
}

impl PgPayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TRANSITION_SQL: &str = r#"
    UPDATE payouts
    SET status = $3,
        provider_reference = COALESCE($4, provider_reference),
        failure_reason = COALESCE($5, failure_reason),
        processed_by = COALESCE($6, processed_by),
        updated_at = NOW()
    WHERE id = $1 AND status = ANY($2)
"#;

#[async_trait]
impl PayoutRepository for PgPayoutRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Payout>, AppError> {
        let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1");
        sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Payout::try_from)
            .transpose()
    }

    async fn create_with_withdrawal(
        &self,
        payout: &Payout,
        withdrawal: &Transaction,
    ) -> Result<PayoutRequestOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(payout.freelancer_id)
            .execute(&mut *tx)
            .await?;

        let available = balance_on(&mut tx, payout.freelancer_id).await?;
        if available < payout.amount_cents {
            return Ok(PayoutRequestOutcome::InsufficientBalance { available });
        }

        let sql = format!(
            r#"
            INSERT INTO payouts (id, freelancer_id, amount_cents, currency, method,
                                 destination, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PAYOUT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(payout.id)
            .bind(payout.freelancer_id)
            .bind(payout.amount_cents)
            .bind(&payout.currency)
            .bind(payout.method.as_str())
            .bind(&payout.destination)
            .bind(payout.status.as_str())
            .fetch_one(&mut *tx)
            .await?;

        insert_transactions(&mut tx, std::slice::from_ref(withdrawal)).await?;
        tx.commit().await?;

        Ok(PayoutRequestOutcome::Created(row.try_into()?))
    }

    async fn transition(
        &self,
        id: i64,
        from: &[PayoutStatus],
        to: PayoutStatus,
        update: &PayoutUpdate,
    ) -> Result<Option<Payout>, AppError> {
        let sql = format!("{TRANSITION_SQL} RETURNING {PAYOUT_COLUMNS}");
        sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(id)
            .bind(status_names(from, |s| s.as_str()))
            .bind(to.as_str())
            .bind(&update.provider_reference)
            .bind(&update.failure_reason)
            .bind(update.processed_by)
            .fetch_optional(&self.pool)
            .await?
            .map(Payout::try_from)
            .transpose()
    }

    async fn fail(
        &self,
        id: i64,
        from: &[PayoutStatus],
        update: &PayoutUpdate,
        reversal: &Transaction,
    ) -> Result<Option<Payout>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{TRANSITION_SQL} RETURNING {PAYOUT_COLUMNS}");
        let Some(row) = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(id)
            .bind(status_names(from, |s| s.as_str()))
            .bind(PayoutStatus::Failed.as_str())
            .bind(&update.provider_reference)
            .bind(&update.failure_reason)
            .bind(update.processed_by)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        insert_transactions(&mut tx, std::slice::from_ref(reversal)).await?;
        tx.commit().await?;

        Ok(Some(row.try_into()?))
    }

    async fn list(
        &self,
        status: Option<PayoutStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Payout>, i64), AppError> {
        let status = status.map(|s| s.as_str());
        let sql = format!(
            r#"
            SELECT {PAYOUT_COLUMNS} FROM payouts
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(status)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM payouts WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((collect(rows)?, total))
    }

    async fn list_for_freelancer(
        &self,
        freelancer_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Payout>, i64), AppError> {
        let sql = format!(
            r#"
            SELECT {PAYOUT_COLUMNS} FROM payouts
            WHERE freelancer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, PayoutRow>(&sql)
            .bind(freelancer_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payouts WHERE freelancer_id = $1")
                .bind(freelancer_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((collect(rows)?, total))
    }

    async fn pending_totals(&self) -> Result<(i64, Cents), AppError> {
        let totals = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COALESCE(SUM(amount_cents), 0)::BIGINT
            FROM payouts
            WHERE status IN ('pending', 'processing')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}
