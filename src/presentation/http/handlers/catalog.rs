//! Service Listing Handlers
//!
//! Freelancer-offered services with up to three packages each.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{
    CreateServiceRequest, ReplacePackagesRequest, ServiceSearchQuery, UpdateServiceRequest,
};
use crate::application::dto::response::ServiceResponse;
use crate::application::services::CatalogService;
use crate::application::Actor;
use crate::presentation::http::extractors::{MaybeActor, ValidatedJson};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `GET /services`
pub async fn browse_services(
    State(state): State<AppState>,
    Query(filter): Query<ServiceSearchQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ServiceResponse>>, AppError> {
    let services = state
        .catalog_service()
        .browse(filter.into(), page.into())
        .await?;
    Ok(Json(services.map(Into::into)))
}

/// `POST /services`
pub async fn create_service(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(body): ValidatedJson<CreateServiceRequest>,
) -> Result<(StatusCode, Json<ServiceResponse>), AppError> {
    let service = state
        .catalog_service()
        .create_service(actor, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(service.into())))
}

/// `GET /services/mine`
pub async fn my_services(
    State(state): State<AppState>,
    actor: Actor,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ServiceResponse>>, AppError> {
    let services = state
        .catalog_service()
        .my_services(actor, page.into())
        .await?;
    Ok(Json(services.map(Into::into)))
}

/// `GET /services/{id}`
pub async fn get_service(
    State(state): State<AppState>,
    MaybeActor(viewer): MaybeActor,
    Path(service_id): Path<String>,
) -> Result<Json<ServiceResponse>, AppError> {
    let service_id = parse_id(&service_id, "service")?;
    let service = state
        .catalog_service()
        .get_service(viewer, service_id)
        .await?;
    Ok(Json(service.into()))
}

/// `PATCH /services/{id}`
pub async fn update_service(
    State(state): State<AppState>,
    actor: Actor,
    Path(service_id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateServiceRequest>,
) -> Result<Json<ServiceResponse>, AppError> {
    let service_id = parse_id(&service_id, "service")?;
    let service = state
        .catalog_service()
        .update_service(actor, service_id, body.into())
        .await?;
    Ok(Json(service.into()))
}

/// `PUT /services/{id}/packages`
pub async fn replace_packages(
    State(state): State<AppState>,
    actor: Actor,
    Path(service_id): Path<String>,
    ValidatedJson(body): ValidatedJson<ReplacePackagesRequest>,
) -> Result<Json<ServiceResponse>, AppError> {
    let service_id = parse_id(&service_id, "service")?;
    let packages = body.packages.into_iter().map(Into::into).collect();
    let service = state
        .catalog_service()
        .replace_packages(actor, service_id, packages)
        .await?;
    Ok(Json(service.into()))
}
