//! Application (bid) Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    AcceptedApplication, Application, ApplicationRepository, ApplicationStatus, Escrow, Project,
};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

use super::escrow_repository::insert_escrow;
use super::map_unique_violation;
use super::project_repository::{ProjectRow, PROJECT_COLUMNS};

const APPLICATION_COLUMNS: &str = "id, project_id, freelancer_id, cover_letter, \
     bid_amount_cents, estimated_days, status, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    project_id: i64,
    freelancer_id: i64,
    cover_letter: String,
    bid_amount_cents: i64,
    estimated_days: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = AppError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            project_id: row.project_id,
            freelancer_id: row.freelancer_id,
            cover_letter: row.cover_letter,
            bid_amount_cents: row.bid_amount_cents,
            estimated_days: row.estimated_days,
            status: ApplicationStatus::from_db(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect(rows: Vec<ApplicationRow>) -> Result<Vec<Application>, AppError> {
    rows.into_iter().map(Application::try_from).collect()
}

/// PostgreSQL application repository.
#[derive(Clone)]
pub struct PgApplicationRepository {
    pool: PgPool,
}

impl PgApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for PgApplicationRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Application>, AppError> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1");
        sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn exists_for(&self, project_id: i64, freelancer_id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM applications WHERE project_id = $1 AND freelancer_id = $2)",
        )
        .bind(project_id)
        .bind(freelancer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create(&self, application: &Application) -> Result<Application, AppError> {
        let sql = format!(
            r#"
            INSERT INTO applications (id, project_id, freelancer_id, cover_letter,
                                      bid_amount_cents, estimated_days, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {APPLICATION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(application.id)
            .bind(application.project_id)
            .bind(application.freelancer_id)
            .bind(&application.cover_letter)
            .bind(application.bid_amount_cents)
            .bind(application.estimated_days)
            .bind(application.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "You have already applied to this project"))?
            .try_into()
    }

    async fn list_for_project(&self, project_id: i64) -> Result<Vec<Application>, AppError> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE project_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn list_for_freelancer(
        &self,
        freelancer_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Application>, i64), AppError> {
        let sql = format!(
            r#"
            SELECT {APPLICATION_COLUMNS} FROM applications
            WHERE freelancer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(freelancer_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM applications WHERE freelancer_id = $1",
        )
        .bind(freelancer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((collect(rows)?, total))
    }

    async fn transition(
        &self,
        id: i64,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<Option<Application>, AppError> {
        let sql = format!(
            r#"
            UPDATE applications SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {APPLICATION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn accept(
        &self,
        id: i64,
        escrow: &Escrow,
    ) -> Result<Option<AcceptedApplication>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE applications SET status = 'accepted', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {APPLICATION_COLUMNS}
            "#
        );
        let Some(accepted) = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let application = Application::try_from(accepted)?;

        let sql = format!(
            r#"
            UPDATE projects
            SET status = 'in_progress', freelancer_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        // Dropping `tx` on the early return rolls the acceptance back.
        let Some(project) = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(application.project_id)
            .bind(application.freelancer_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let project = Project::try_from(project)?;

        let sql = format!(
            r#"
            UPDATE applications SET status = 'rejected', updated_at = NOW()
            WHERE project_id = $1 AND status = 'pending' AND id <> $2
            RETURNING {APPLICATION_COLUMNS}
            "#
        );
        let rejected = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(application.project_id)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        let escrow = insert_escrow(&mut tx, escrow).await?;
        tx.commit().await?;

        Ok(Some(AcceptedApplication {
            application,
            project,
            escrow,
            rejected: collect(rejected)?,
        }))
    }
}
