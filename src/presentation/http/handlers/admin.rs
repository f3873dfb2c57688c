//! Admin Handlers
//!
//! Mounted behind `require_admin`; every mutation lands in the audit log.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::warn;

use crate::application::dto::request::{
    ResolveDisputeRequest, SetActiveRequest, SetTierRequest, SetUserStatusRequest,
    UserSearchQuery,
};
use crate::application::dto::response::{
    AuditEntryResponse, DisputeResponse, EscrowResponse, ProjectResponse, ServiceResponse,
    StatsResponse, UserResponse,
};
use crate::application::services::{AdminService, PlatformStats};
use crate::application::Actor;
use crate::infrastructure::cache::{keys, Cache, RedisCache};
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// How long a stats snapshot is served from Redis.
const STATS_TTL_SECS: u64 = 30;
const CACHE_PREFIX: &str = "koihire:";

fn stats_cache(state: &AppState) -> Option<RedisCache> {
    state
        .redis
        .clone()
        .map(|conn| RedisCache::with_prefix(conn, CACHE_PREFIX))
}

/// Drop the cached snapshot after a change that moves the counters.
async fn invalidate_stats(state: &AppState) {
    if let Some(cache) = stats_cache(state) {
        if let Err(e) = cache.delete(keys::ADMIN_STATS).await {
            warn!(error = %e, "Stats cache invalidation failed");
        }
    }
}

/// `GET /admin/stats`
///
/// Aggregates are cached briefly when Redis is configured. Cache errors
/// fall through to a fresh computation.
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let cache = stats_cache(&state);

    if let Some(cache) = &cache {
        match cache.get::<PlatformStats>(keys::ADMIN_STATS).await {
            Ok(Some(stats)) => return Ok(Json(stats.into())),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Stats cache read failed"),
        }
    }

    let stats = state.admin_service().stats().await?;

    if let Some(cache) = &cache {
        if let Err(e) = cache.set_ex(keys::ADMIN_STATS, &stats, STATS_TTL_SECS).await {
            warn!(error = %e, "Stats cache write failed");
        }
    }

    Ok(Json(stats.into()))
}

/// `GET /admin/users?role=&status=&q=`
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserSearchQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<UserResponse>>, AppError> {
    let users = state
        .admin_service()
        .list_users(filter.into(), page.into())
        .await?;
    Ok(Json(users.map(|u| UserResponse::from_user(u, true))))
}

/// `PATCH /admin/users/{id}/status`
pub async fn set_user_status(
    State(state): State<AppState>,
    admin: Actor,
    Path(user_id): Path<String>,
    ValidatedJson(body): ValidatedJson<SetUserStatusRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user_id = parse_id(&user_id, "user")?;
    let user = state
        .admin_service()
        .set_user_status(admin, user_id, body.status, body.reason)
        .await?;
    invalidate_stats(&state).await;
    Ok(Json(UserResponse::from_user(user, true)))
}

/// `GET /admin/disputes`
pub async fn list_disputes(
    State(state): State<AppState>,
) -> Result<Json<Vec<DisputeResponse>>, AppError> {
    let disputes = state.admin_service().list_disputes().await?;
    Ok(Json(disputes.into_iter().map(Into::into).collect()))
}

/// `POST /admin/escrows/{id}/resolve`
pub async fn resolve_dispute(
    State(state): State<AppState>,
    admin: Actor,
    Path(escrow_id): Path<String>,
    ValidatedJson(body): ValidatedJson<ResolveDisputeRequest>,
) -> Result<Json<EscrowResponse>, AppError> {
    let escrow_id = parse_id(&escrow_id, "escrow")?;
    let escrow = state
        .admin_service()
        .resolve_dispute(admin, escrow_id, body.resolution, body.note)
        .await?;
    invalidate_stats(&state).await;
    Ok(Json(escrow.into()))
}

/// `PATCH /admin/projects/{id}/tier`
pub async fn set_project_tier(
    State(state): State<AppState>,
    admin: Actor,
    Path(project_id): Path<String>,
    Json(body): Json<SetTierRequest>,
) -> Result<Json<ProjectResponse>, AppError> {
    let project_id = parse_id(&project_id, "project")?;
    let project = state
        .admin_service()
        .set_project_tier(admin, project_id, body.tier)
        .await?;
    Ok(Json(project.into()))
}

/// `PATCH /admin/services/{id}/tier`
pub async fn set_service_tier(
    State(state): State<AppState>,
    admin: Actor,
    Path(service_id): Path<String>,
    Json(body): Json<SetTierRequest>,
) -> Result<Json<ServiceResponse>, AppError> {
    let service_id = parse_id(&service_id, "service")?;
    let service = state
        .admin_service()
        .set_service_tier(admin, service_id, body.tier)
        .await?;
    Ok(Json(service.into()))
}

/// `PATCH /admin/services/{id}/active`
pub async fn set_service_active(
    State(state): State<AppState>,
    admin: Actor,
    Path(service_id): Path<String>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<ServiceResponse>, AppError> {
    let service_id = parse_id(&service_id, "service")?;
    let service = state
        .admin_service()
        .set_service_active(admin, service_id, body.active)
        .await?;
    invalidate_stats(&state).await;
    Ok(Json(service.into()))
}

/// `GET /admin/audit-log`
pub async fn audit_log(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<AuditEntryResponse>>, AppError> {
    let entries = state.admin_service().audit_log(page.into()).await?;
    Ok(Json(entries.map(Into::into)))
}
