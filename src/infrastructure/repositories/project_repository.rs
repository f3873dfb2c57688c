//! Project Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    BudgetType, ListingTier, Project, ProjectFilter, ProjectRepository, ProjectStatus,
};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

use super::{like_pattern, status_names, TIER_RANK};

pub(crate) const PROJECT_COLUMNS: &str = "id, client_id, freelancer_id, title, description, \
     category, skills, budget_type, budget_min_cents, budget_max_cents, deadline, status, tier, \
     created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProjectRow {
    id: i64,
    client_id: i64,
    freelancer_id: Option<i64>,
    title: String,
    description: String,
    category: String,
    skills: Vec<String>,
    budget_type: String,
    budget_min_cents: i64,
    budget_max_cents: i64,
    deadline: Option<DateTime<Utc>>,
    status: String,
    tier: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = AppError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: row.id,
            client_id: row.client_id,
            freelancer_id: row.freelancer_id,
            title: row.title,
            description: row.description,
            category: row.category,
            skills: row.skills,
            budget_type: BudgetType::from_db(&row.budget_type)?,
            budget_min_cents: row.budget_min_cents,
            budget_max_cents: row.budget_max_cents,
            deadline: row.deadline,
            status: ProjectStatus::from_db(&row.status)?,
            tier: ListingTier::from_db(&row.tier)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL project repository.
#[derive(Clone)]
pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Project>, AppError> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn create(&self, project: &Project) -> Result<Project, AppError> {
        let sql = format!(
            r#"
            INSERT INTO projects (id, client_id, title, description, category, skills,
                                  budget_type, budget_min_cents, budget_max_cents, deadline,
                                  status, tier)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(project.id)
            .bind(project.client_id)
            .bind(&project.title)
            .bind(&project.description)
            .bind(&project.category)
            .bind(&project.skills)
            .bind(project.budget_type.as_str())
            .bind(project.budget_min_cents)
            .bind(project.budget_max_cents)
            .bind(project.deadline)
            .bind(project.status.as_str())
            .bind(project.tier.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn update_open(&self, project: &Project) -> Result<Option<Project>, AppError> {
        let sql = format!(
            r#"
            UPDATE projects
            SET title = $2, description = $3, category = $4, skills = $5, budget_type = $6,
                budget_min_cents = $7, budget_max_cents = $8, deadline = $9, updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(project.id)
            .bind(&project.title)
            .bind(&project.description)
            .bind(&project.category)
            .bind(&project.skills)
            .bind(project.budget_type.as_str())
            .bind(project.budget_min_cents)
            .bind(project.budget_max_cents)
            .bind(project.deadline)
            .fetch_optional(&self.pool)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn search(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<(Vec<Project>, i64), AppError> {
        const WHERE: &str = r#"
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR category = $2)
              AND ($3::text IS NULL OR lower($3) = ANY(SELECT lower(s) FROM unnest(skills) s))
              AND ($4::bigint IS NULL OR budget_max_cents >= $4)
              AND ($5::bigint IS NULL OR budget_min_cents <= $5)
              AND ($6::text IS NULL OR title ILIKE $6 OR description ILIKE $6)
              AND ($7::bigint IS NULL OR client_id = $7)
              AND ($8::bigint IS NULL OR freelancer_id = $8)
        "#;
        let status = filter.status.map(|s| s.as_str());
        let query = filter.query.as_deref().map(like_pattern);

        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects {WHERE} \
             ORDER BY {TIER_RANK} DESC, created_at DESC LIMIT $9 OFFSET $10"
        );
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(status)
            .bind(&filter.category)
            .bind(&filter.skill)
            .bind(filter.min_budget_cents)
            .bind(filter.max_budget_cents)
            .bind(&query)
            .bind(filter.client_id)
            .bind(filter.freelancer_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM projects {WHERE}"))
            .bind(status)
            .bind(&filter.category)
            .bind(&filter.skill)
            .bind(filter.min_budget_cents)
            .bind(filter.max_budget_cents)
            .bind(&query)
            .bind(filter.client_id)
            .bind(filter.freelancer_id)
            .fetch_one(&self.pool)
            .await?;

        let projects = rows.into_iter().map(Project::try_from).collect::<Result<_, _>>()?;
        Ok((projects, total))
    }

    async fn transition(
        &self,
        id: i64,
        from: &[ProjectStatus],
        to: ProjectStatus,
    ) -> Result<Option<Project>, AppError> {
        let sql = format!(
            r#"
            UPDATE projects SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .bind(status_names(from, |s| s.as_str()))
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn cancel_open(&self, id: i64) -> Result<Option<Project>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE projects SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {PROJECT_COLUMNS}
            "#
        );
        let Some(row) = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE applications SET status = 'rejected', updated_at = NOW()
            WHERE project_id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    async fn set_tier(&self, id: i64, tier: ListingTier) -> Result<Option<Project>, AppError> {
        let sql = format!(
            "UPDATE projects SET tier = $2, updated_at = NOW() WHERE id = $1 RETURNING {PROJECT_COLUMNS}"
        );
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .bind(tier.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn count_by_status(&self) -> Result<Vec<(ProjectStatus, i64)>, AppError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM projects GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| Ok((ProjectStatus::from_db(&status)?, count)))
            .collect()
    }
}
