//! Ledger Repository Implementation
//!
//! Ledger rows are append-only. Writers elsewhere in this module tree insert
//! them through [`insert_transactions`] inside their own database
//! transactions, so a status change and its money movement commit together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::{Cents, Transaction, TransactionKind, TransactionRepository};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

const TRANSACTION_COLUMNS: &str =
    "id, user_id, kind, amount_cents, currency, escrow_id, payout_id, description, created_at";

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    user_id: i64,
    kind: String,
    amount_cents: i64,
    currency: String,
    escrow_id: Option<i64>,
    payout_id: Option<i64>,
    description: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            kind: TransactionKind::from_db(&row.kind)?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            escrow_id: row.escrow_id,
            payout_id: row.payout_id,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

/// Append `entries` to the ledger on `conn`.
pub(crate) async fn insert_transactions(
    conn: &mut PgConnection,
    entries: &[Transaction],
) -> Result<(), AppError> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, kind, amount_cents, currency,
                                      escrow_id, payout_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount_cents)
        .bind(&entry.currency)
        .bind(entry.escrow_id)
        .bind(entry.payout_id)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Withdrawable balance of `user_id` as seen by `conn`.
pub(crate) async fn balance_on(conn: &mut PgConnection, user_id: i64) -> Result<Cents, AppError> {
    let balance = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(CASE
                   WHEN kind IN ('earning', 'reversal') THEN amount_cents
                   WHEN kind = 'withdrawal' THEN -amount_cents
                   ELSE 0
               END), 0)::BIGINT
        FROM transactions
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(balance)
}

/// PostgreSQL ledger repository.
#[derive(Clone)]
pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn list_for_user(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let sql = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(user_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let entries = rows
            .into_iter()
            .map(Transaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((entries, total))
    }

    async fn available_balance(&self, user_id: i64) -> Result<Cents, AppError> {
        let mut conn = self.pool.acquire().await?;
        balance_on(&mut conn, user_id).await
    }

    async fn totals_by_kind(&self) -> Result<Vec<(TransactionKind, Cents)>, AppError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT kind, COALESCE(SUM(amount_cents), 0)::BIGINT FROM transactions GROUP BY kind",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(kind, total)| Ok((TransactionKind::from_db(&kind)?, total)))
            .collect()
    }
}
