//! Service Order Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    Escrow, OrderParty, OrderRepository, OrderStatus, PackageTier, ServiceOrder,
};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

use super::escrow_repository::insert_escrow;
use super::status_names;

const ORDER_COLUMNS: &str = "id, service_id, package_tier, buyer_id, seller_id, title, \
     price_cents, delivery_days, revisions_allowed, revisions_used, requirements, delivery_note, \
     status, due_at, delivered_at, completed_at, cancelled_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    service_id: i64,
    package_tier: String,
    buyer_id: i64,
    seller_id: i64,
    title: String,
    price_cents: i64,
    delivery_days: i32,
    revisions_allowed: i32,
    revisions_used: i32,
    requirements: String,
    delivery_note: Option<String>,
    status: String,
    due_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for ServiceOrder {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(ServiceOrder {
            id: row.id,
            service_id: row.service_id,
            package_tier: PackageTier::from_db(&row.package_tier)?,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            title: row.title,
            price_cents: row.price_cents,
            delivery_days: row.delivery_days,
            revisions_allowed: row.revisions_allowed,
            revisions_used: row.revisions_used,
            requirements: row.requirements,
            delivery_note: row.delivery_note,
            status: OrderStatus::from_db(&row.status)?,
            due_at: row.due_at,
            delivered_at: row.delivered_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect(rows: Vec<OrderRow>) -> Result<Vec<ServiceOrder>, AppError> {
    rows.into_iter().map(ServiceOrder::try_from).collect()
}

/// PostgreSQL service order repository.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<ServiceOrder>, AppError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM service_orders WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ServiceOrder::try_from)
            .transpose()
    }

    async fn create_with_escrow(
        &self,
        order: &ServiceOrder,
        escrow: &Escrow,
    ) -> Result<ServiceOrder, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO service_orders (id, service_id, package_tier, buyer_id, seller_id, title,
                                        price_cents, delivery_days, revisions_allowed,
                                        revisions_used, requirements, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.id)
            .bind(order.service_id)
            .bind(order.package_tier.as_str())
            .bind(order.buyer_id)
            .bind(order.seller_id)
            .bind(&order.title)
            .bind(order.price_cents)
            .bind(order.delivery_days)
            .bind(order.revisions_allowed)
            .bind(order.revisions_used)
            .bind(&order.requirements)
            .bind(order.status.as_str())
            .fetch_one(&mut *tx)
            .await?;

        insert_escrow(&mut tx, escrow).await?;
        tx.commit().await?;

        row.try_into()
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        party: OrderParty,
        page: PageRequest,
    ) -> Result<(Vec<ServiceOrder>, i64), AppError> {
        let column = match party {
            OrderParty::Buyer => "buyer_id",
            OrderParty::Seller => "seller_id",
        };
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM service_orders
            WHERE {column} = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM service_orders WHERE {column} = $1");
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((collect(rows)?, total))
    }

    async fn save_transition(
        &self,
        order: &ServiceOrder,
        from: &[OrderStatus],
    ) -> Result<Option<ServiceOrder>, AppError> {
        let sql = format!(
            r#"
            UPDATE service_orders
            SET status = $3,
                revisions_used = $4,
                delivery_note = $5,
                due_at = $6,
                delivered_at = $7,
                completed_at = $8,
                cancelled_at = $9,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.id)
            .bind(status_names(from, |s| s.as_str()))
            .bind(order.status.as_str())
            .bind(order.revisions_used)
            .bind(&order.delivery_note)
            .bind(order.due_at)
            .bind(order.delivered_at)
            .bind(order.completed_at)
            .bind(order.cancelled_at)
            .fetch_optional(&self.pool)
            .await?
            .map(ServiceOrder::try_from)
            .transpose()
    }

    async fn find_auto_completable(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ServiceOrder>, AppError> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM service_orders
            WHERE status = 'delivered' AND delivered_at < $1
            ORDER BY delivered_at
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<ServiceOrder>, AppError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM service_orders WHERE status = $1 ORDER BY updated_at DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, AppError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM service_orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| Ok((OrderStatus::from_db(&status)?, count)))
            .collect()
    }
}
