//! Application (bid) Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::ApplyRequest;
use crate::application::dto::response::{AcceptedApplicationResponse, ApplicationResponse};
use crate::application::services::ApplicationService;
use crate::application::Actor;
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `POST /projects/{id}/applications`
pub async fn apply(
    State(state): State<AppState>,
    actor: Actor,
    Path(project_id): Path<String>,
    ValidatedJson(body): ValidatedJson<ApplyRequest>,
) -> Result<(StatusCode, Json<ApplicationResponse>), AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let application = state
        .application_service()
        .apply(actor, project_id, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(application.into())))
}

/// `GET /projects/{id}/applications`
pub async fn list_for_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ApplicationResponse>>, AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let applications = state
        .application_service()
        .list_for_project(actor, project_id)
        .await?;
    Ok(Json(applications.into_iter().map(Into::into).collect()))
}

/// `GET /applications/mine`
pub async fn my_applications(
    State(state): State<AppState>,
    actor: Actor,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ApplicationResponse>>, AppError> {
    let applications = state
        .application_service()
        .my_applications(actor, page.into())
        .await?;
    Ok(Json(applications.map(Into::into)))
}

/// `POST /applications/{id}/accept`. Hires the freelancer and opens the
/// project escrow; the client funds it next.
pub async fn accept(
    State(state): State<AppState>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Result<Json<AcceptedApplicationResponse>, AppError> {
    let application_id = parse_id(&application_id, "application")?;
    let accepted = state
        .application_service()
        .accept(actor, application_id)
        .await?;
    Ok(Json(AcceptedApplicationResponse {
        application: accepted.application.into(),
        project: accepted.project.into(),
        escrow: accepted.escrow.into(),
    }))
}

/// `POST /applications/{id}/reject`
pub async fn reject(
    State(state): State<AppState>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Result<Json<ApplicationResponse>, AppError> {
    let application_id = parse_id(&application_id, "application")?;
    let application = state
        .application_service()
        .reject(actor, application_id)
        .await?;
    Ok(Json(application.into()))
}

/// `POST /applications/{id}/withdraw`
pub async fn withdraw(
    State(state): State<AppState>,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Result<Json<ApplicationResponse>, AppError> {
    let application_id = parse_id(&application_id, "application")?;
    let application = state
        .application_service()
        .withdraw(actor, application_id)
        .await?;
    Ok(Json(application.into()))
}
