//! Project Handlers
//!
//! Client-posted projects and their lifecycle (cancel, complete, dispute).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{
    CreateProjectRequest, ProjectSearchQuery, UpdateProjectRequest,
};
use crate::application::dto::response::ProjectResponse;
use crate::application::services::ProjectService;
use crate::application::Actor;
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `GET /projects`
pub async fn browse_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectSearchQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ProjectResponse>>, AppError> {
    let projects = state
        .project_service()
        .browse(filter.into(), page.into())
        .await?;
    Ok(Json(projects.map(Into::into)))
}

/// `POST /projects`
pub async fn create_project(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(body): ValidatedJson<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), AppError> {
    let project = state
        .project_service()
        .create_project(actor, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

/// `GET /projects/mine`
pub async fn my_projects(
    State(state): State<AppState>,
    actor: Actor,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ProjectResponse>>, AppError> {
    let projects = state
        .project_service()
        .my_projects(actor, page.into())
        .await?;
    Ok(Json(projects.map(Into::into)))
}

/// `GET /projects/{id}`
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let project = state.project_service().get_project(project_id).await?;
    Ok(Json(project.into()))
}

/// `PATCH /projects/{id}`
pub async fn update_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(project_id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let project = state
        .project_service()
        .update_project(actor, project_id, body.into())
        .await?;
    Ok(Json(project.into()))
}

/// `POST /projects/{id}/cancel`
pub async fn cancel_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let project = state
        .project_service()
        .cancel_project(actor, project_id)
        .await?;
    Ok(Json(project.into()))
}

/// `POST /projects/{id}/complete`
pub async fn complete_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let project = state
        .project_service()
        .complete_project(actor, project_id)
        .await?;
    Ok(Json(project.into()))
}

/// `POST /projects/{id}/dispute`
pub async fn dispute_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let project = state
        .project_service()
        .dispute_project(actor, project_id)
        .await?;
    Ok(Json(project.into()))
}
