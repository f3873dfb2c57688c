//! Escrow Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::{
    Cents, Escrow, EscrowRepository, EscrowStatus, EscrowTotals, SubjectTransition, Transaction,
};
use crate::shared::error::AppError;

use super::status_names;
use super::transaction_repository::insert_transactions;

const ESCROW_COLUMNS: &str = "id, project_id, order_id, client_id, freelancer_id, amount_cents, \
     fee_cents, currency, status, payment_intent_id, provider_refund_id, funded_at, released_at, \
     refunded_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct EscrowRow {
    id: i64,
    project_id: Option<i64>,
    order_id: Option<i64>,
    client_id: i64,
    freelancer_id: i64,
    amount_cents: i64,
    fee_cents: i64,
    currency: String,
    status: String,
    payment_intent_id: Option<String>,
    provider_refund_id: Option<String>,
    funded_at: Option<DateTime<Utc>>,
    released_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EscrowRow> for Escrow {
    type Error = AppError;

    fn try_from(row: EscrowRow) -> Result<Self, Self::Error> {
        Ok(Escrow {
            id: row.id,
            project_id: row.project_id,
            order_id: row.order_id,
            client_id: row.client_id,
            freelancer_id: row.freelancer_id,
            amount_cents: row.amount_cents,
            fee_cents: row.fee_cents,
            currency: row.currency,
            status: EscrowStatus::from_db(&row.status)?,
            payment_intent_id: row.payment_intent_id,
            provider_refund_id: row.provider_refund_id,
            funded_at: row.funded_at,
            released_at: row.released_at,
            refunded_at: row.refunded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insert a new escrow on `conn`. Used by the bid-acceptance and
/// order-placement transactions.
pub(crate) async fn insert_escrow(
    conn: &mut PgConnection,
    escrow: &Escrow,
) -> Result<Escrow, AppError> {
    let sql = format!(
        r#"
        INSERT INTO escrows (id, project_id, order_id, client_id, freelancer_id,
                             amount_cents, fee_cents, currency, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {ESCROW_COLUMNS}
        "#
    );
    sqlx::query_as::<_, EscrowRow>(&sql)
        .bind(escrow.id)
        .bind(escrow.project_id)
        .bind(escrow.order_id)
        .bind(escrow.client_id)
        .bind(escrow.freelancer_id)
        .bind(escrow.amount_cents)
        .bind(escrow.fee_cents)
        .bind(&escrow.currency)
        .bind(escrow.status.as_str())
        .fetch_one(&mut *conn)
        .await?
        .try_into()
}

/// Apply the project or order status change that accompanies a settlement.
/// Returns `false` when the subject was no longer in an expected status.
async fn apply_subject_transition(
    conn: &mut PgConnection,
    transition: &SubjectTransition,
) -> Result<bool, AppError> {
    let result = match transition {
        SubjectTransition::Project { id, from, to } => {
            sqlx::query(
                r#"
                UPDATE projects SET status = $3, updated_at = NOW()
                WHERE id = $1 AND status = ANY($2)
                "#,
            )
            .bind(id)
            .bind(status_names(from, |s| s.as_str()))
            .bind(to.as_str())
            .execute(&mut *conn)
            .await?
        }
        SubjectTransition::Order { id, from, to } => {
            sqlx::query(
                r#"
                UPDATE service_orders
                SET status = $3,
                    completed_at = CASE WHEN $3 = 'completed' THEN NOW() ELSE completed_at END,
                    cancelled_at = CASE WHEN $3 = 'cancelled' THEN NOW() ELSE cancelled_at END,
                    updated_at = NOW()
                WHERE id = $1 AND status = ANY($2)
                "#,
            )
            .bind(id)
            .bind(status_names(from, |s| s.as_str()))
            .bind(to.as_str())
            .execute(&mut *conn)
            .await?
        }
    };
    Ok(result.rows_affected() == 1)
}

/// PostgreSQL escrow repository.
#[derive(Clone)]
pub struct PgEscrowRepository {
    pool: PgPool,
}

impl PgEscrowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, column: &str, id: i64) -> Result<Option<Escrow>, AppError> {
        let sql = format!("SELECT {ESCROW_COLUMNS} FROM escrows WHERE {column} = $1");
        sqlx::query_as::<_, EscrowRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Escrow::try_from)
            .transpose()
    }

    /// Shared body of release and refund: CAS the escrow, move the subject,
    /// write the ledger. Any miss rolls the whole thing back.
    async fn settle(
        &self,
        id: i64,
        from: EscrowStatus,
        to: EscrowStatus,
        fee_cents: Option<Cents>,
        entries: &[Transaction],
        subject: Option<SubjectTransition>,
    ) -> Result<Option<Escrow>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE escrows
            SET status = $3,
                fee_cents = COALESCE($4, fee_cents),
                released_at = CASE WHEN $3 = 'released' THEN NOW() ELSE released_at END,
                refunded_at = CASE WHEN $3 = 'refunded' THEN NOW() ELSE refunded_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ESCROW_COLUMNS}
            "#
        );
        let Some(row) = sqlx::query_as::<_, EscrowRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(fee_cents)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        if let Some(transition) = &subject {
            if !apply_subject_transition(&mut tx, transition).await? {
                tracing::debug!(escrow_id = id, ?transition, "Subject moved before settlement");
                return Ok(None);
            }
        }

        insert_transactions(&mut tx, entries).await?;
        tx.commit().await?;

        Ok(Some(row.try_into()?))
    }
}

#[async_trait]
impl EscrowRepository for PgEscrowRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Escrow>, AppError> {
        self.find_where("id", id).await
    }

    async fn find_by_project(&self, project_id: i64) -> Result<Option<Escrow>, AppError> {
        self.find_where("project_id", project_id).await
    }

    async fn find_by_order(&self, order_id: i64) -> Result<Option<Escrow>, AppError> {
        self.find_where("order_id", order_id).await
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Escrow>, AppError> {
        let sql = format!("SELECT {ESCROW_COLUMNS} FROM escrows WHERE payment_intent_id = $1");
        sqlx::query_as::<_, EscrowRow>(&sql)
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Escrow::try_from)
            .transpose()
    }

    async fn attach_payment_intent(
        &self,
        id: i64,
        intent_id: &str,
    ) -> Result<Option<Escrow>, AppError> {
        let sql = format!(
            r#"
            UPDATE escrows SET payment_intent_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ESCROW_COLUMNS}
            "#
        );
        sqlx::query_as::<_, EscrowRow>(&sql)
            .bind(id)
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Escrow::try_from)
            .transpose()
    }

    async fn mark_funded(
        &self,
        id: i64,
        deposit: &Transaction,
    ) -> Result<Option<Escrow>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE escrows SET status = 'funded', funded_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ESCROW_COLUMNS}
            "#
        );
        let Some(row) = sqlx::query_as::<_, EscrowRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        insert_transactions(&mut tx, std::slice::from_ref(deposit)).await?;
        tx.commit().await?;

        Ok(Some(row.try_into()?))
    }

    async fn release(
        &self,
        id: i64,
        fee_cents: Cents,
        entries: &[Transaction],
        subject: Option<SubjectTransition>,
    ) -> Result<Option<Escrow>, AppError> {
        self.settle(
            id,
            EscrowStatus::Funded,
            EscrowStatus::Released,
            Some(fee_cents),
            entries,
            subject,
        )
        .await
    }

    async fn refund(
        &self,
        id: i64,
        from: EscrowStatus,
        entries: &[Transaction],
        subject: Option<SubjectTransition>,
    ) -> Result<Option<Escrow>, AppError> {
        self.settle(id, from, EscrowStatus::Refunded, None, entries, subject)
            .await
    }

    async fn record_provider_refund(
        &self,
        id: i64,
        refund_id: &str,
    ) -> Result<Option<Escrow>, AppError> {
        let sql = format!(
            r#"
            UPDATE escrows SET provider_refund_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'refunded' AND provider_refund_id IS NULL
            RETURNING {ESCROW_COLUMNS}
            "#
        );
        sqlx::query_as::<_, EscrowRow>(&sql)
            .bind(id)
            .bind(refund_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Escrow::try_from)
            .transpose()
    }

    async fn find_owing_provider_refund(
        &self,
        refunded_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Escrow>, AppError> {
        let sql = format!(
            r#"
            SELECT {ESCROW_COLUMNS} FROM escrows
            WHERE status = 'refunded'
              AND funded_at IS NOT NULL
              AND provider_refund_id IS NULL
              AND refunded_at < $1
            ORDER BY refunded_at
            LIMIT $2
            "#
        );
        sqlx::query_as::<_, EscrowRow>(&sql)
            .bind(refunded_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Escrow::try_from)
            .collect()
    }

    async fn totals_by_status(&self) -> Result<Vec<EscrowTotals>, AppError> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT status, COUNT(*), COALESCE(SUM(amount_cents), 0)::BIGINT
            FROM escrows
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count, amount_cents)| {
                Ok(EscrowTotals {
                    status: EscrowStatus::from_db(&status)?,
                    count,
                    amount_cents,
                })
            })
            .collect()
    }
}
