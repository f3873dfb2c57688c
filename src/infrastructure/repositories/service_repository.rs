//! Service Listing Repository Implementation
//!
//! Listings live in `services`, their packages in `service_packages`. Reads
//! load packages for a whole page of listings with one `ANY($1)` query.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::domain::{
    ListingTier, PackageTier, ServiceFilter, ServiceListing, ServicePackage, ServiceRepository,
};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

use super::{like_pattern, TIER_RANK};

const SERVICE_COLUMNS: &str =
    "id, freelancer_id, title, description, category, tags, is_active, tier, created_at, updated_at";

const PACKAGE_COLUMNS: &str =
    "service_id, tier, title, description, price_cents, delivery_days, revisions, features";

const PACKAGE_ORDER: &str = "CASE tier WHEN 'basic' THEN 0 WHEN 'standard' THEN 1 ELSE 2 END";

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: i64,
    freelancer_id: i64,
    title: String,
    description: String,
    category: String,
    tags: Vec<String>,
    is_active: bool,
    tier: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceRow {
    fn into_listing(self, packages: Vec<ServicePackage>) -> Result<ServiceListing, AppError> {
        Ok(ServiceListing {
            id: self.id,
            freelancer_id: self.freelancer_id,
            title: self.title,
            description: self.description,
            category: self.category,
            tags: self.tags,
            is_active: self.is_active,
            tier: ListingTier::from_db(&self.tier)?,
            packages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    service_id: i64,
    tier: String,
    title: String,
    description: String,
    price_cents: i64,
    delivery_days: i32,
    revisions: i32,
    features: Vec<String>,
}

impl TryFrom<PackageRow> for ServicePackage {
    type Error = AppError;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        Ok(ServicePackage {
            tier: PackageTier::from_db(&row.tier)?,
            title: row.title,
            description: row.description,
            price_cents: row.price_cents,
            delivery_days: row.delivery_days,
            revisions: row.revisions,
            features: row.features,
        })
    }
}

async fn insert_packages(
    conn: &mut PgConnection,
    service_id: i64,
    packages: &[ServicePackage],
) -> Result<(), AppError> {
    for package in packages {
        sqlx::query(
            r#"
            INSERT INTO service_packages (service_id, tier, title, description, price_cents,
                                          delivery_days, revisions, features)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(service_id)
        .bind(package.tier.as_str())
        .bind(&package.title)
        .bind(&package.description)
        .bind(package.price_cents)
        .bind(package.delivery_days)
        .bind(package.revisions)
        .bind(&package.features)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// PostgreSQL service listing repository.
#[derive(Clone)]
pub struct PgServiceRepository {
    pool: PgPool,
}

impl PgServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach packages to a batch of listing rows, keeping row order.
    async fn with_packages(&self, rows: Vec<ServiceRow>) -> Result<Vec<ServiceListing>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let sql = format!(
            "SELECT {PACKAGE_COLUMNS} FROM service_packages WHERE service_id = ANY($1) \
             ORDER BY service_id, {PACKAGE_ORDER}"
        );
        let package_rows = sqlx::query_as::<_, PackageRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_service: HashMap<i64, Vec<ServicePackage>> = HashMap::new();
        for row in package_rows {
            let service_id = row.service_id;
            by_service
                .entry(service_id)
                .or_default()
                .push(ServicePackage::try_from(row)?);
        }

        rows.into_iter()
            .map(|row| {
                let packages = by_service.remove(&row.id).unwrap_or_default();
                row.into_listing(packages)
            })
            .collect()
    }

    async fn load(&self, id: i64) -> Result<Option<ServiceListing>, AppError> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(self.with_packages(vec![row]).await?.pop())
    }

    async fn require(&self, id: i64) -> Result<ServiceListing, AppError> {
        self.load(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Service not found".to_string()))
    }
}

#[async_trait]
impl ServiceRepository for PgServiceRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<ServiceListing>, AppError> {
        self.load(id).await
    }

    async fn create(&self, service: &ServiceListing) -> Result<ServiceListing, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO services (id, freelancer_id, title, description, category, tags,
                                  is_active, tier)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(service.id)
        .bind(service.freelancer_id)
        .bind(&service.title)
        .bind(&service.description)
        .bind(&service.category)
        .bind(&service.tags)
        .bind(service.is_active)
        .bind(service.tier.as_str())
        .execute(&mut *tx)
        .await?;

        insert_packages(&mut tx, service.id, &service.packages).await?;
        tx.commit().await?;

        self.require(service.id).await
    }

    async fn update_details(&self, service: &ServiceListing) -> Result<ServiceListing, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE services
            SET title = $2, description = $3, category = $4, tags = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(service.id)
        .bind(&service.title)
        .bind(&service.description)
        .bind(&service.category)
        .bind(&service.tags)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Service not found".to_string()));
        }
        self.require(service.id).await
    }

    async fn replace_packages(
        &self,
        service_id: i64,
        packages: &[ServicePackage],
    ) -> Result<ServiceListing, AppError> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE services SET updated_at = NOW() WHERE id = $1")
            .bind(service_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(AppError::NotFound("Service not found".to_string()));
        }

        sqlx::query("DELETE FROM service_packages WHERE service_id = $1")
            .bind(service_id)
            .execute(&mut *tx)
            .await?;
        insert_packages(&mut tx, service_id, packages).await?;
        tx.commit().await?;

        self.require(service_id).await
    }

    async fn search(
        &self,
        filter: &ServiceFilter,
        page: PageRequest,
    ) -> Result<(Vec<ServiceListing>, i64), AppError> {
        let pattern = filter.query.as_deref().map(like_pattern);
        let conditions = r#"
            ($1::text IS NULL OR category = $1)
            AND ($2::text IS NULL OR title ILIKE $2 OR description ILIKE $2
                 OR EXISTS (SELECT 1 FROM unnest(tags) t WHERE t ILIKE $2))
            AND ($3::bigint IS NULL OR freelancer_id = $3)
            AND ($4::bigint IS NULL OR EXISTS (
                    SELECT 1 FROM service_packages p
                    WHERE p.service_id = services.id AND p.price_cents <= $4))
            AND ($5 OR is_active)
        "#;

        let sql = format!(
            r#"
            SELECT {SERVICE_COLUMNS} FROM services
            WHERE {conditions}
            ORDER BY {TIER_RANK} DESC, created_at DESC
            LIMIT $6 OFFSET $7
            "#
        );
        let rows = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(&filter.category)
            .bind(&pattern)
            .bind(filter.freelancer_id)
            .bind(filter.max_price_cents)
            .bind(filter.include_inactive)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM services WHERE {conditions}");
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(&filter.category)
            .bind(&pattern)
            .bind(filter.freelancer_id)
            .bind(filter.max_price_cents)
            .bind(filter.include_inactive)
            .fetch_one(&self.pool)
            .await?;

        Ok((self.with_packages(rows).await?, total))
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<Option<ServiceListing>, AppError> {
        let result =
            sqlx::query("UPDATE services SET is_active = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.load(id).await
    }

    async fn set_tier(
        &self,
        id: i64,
        tier: ListingTier,
    ) -> Result<Option<ServiceListing>, AppError> {
        let result = sqlx::query("UPDATE services SET tier = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(tier.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.load(id).await
    }

    async fn count_active(&self) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM services WHERE is_active")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
