//! User Handlers
//!
//! Own account, public profiles, reviews received and the freelancer
//! directory.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::application::dto::request::{FreelancerSearchQuery, UpdateProfileRequest};
use crate::application::dto::response::{ProfileResponse, ReviewResponse, UserResponse};
use crate::application::services::{ReviewService, UserService};
use crate::application::Actor;
use crate::presentation::http::extractors::{MaybeActor, ValidatedJson};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `GET /users/me`
pub async fn get_current_user(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.user_service().get_user(actor.user_id).await?;
    Ok(Json(UserResponse::from_user(user, true)))
}

/// `PATCH /users/me`
pub async fn update_current_user(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(body): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .user_service()
        .update_profile(actor.user_id, body.into())
        .await?;
    Ok(Json(UserResponse::from_user(user, true)))
}

/// `GET /users/{id}`. Email is shown to the owner and admins only.
pub async fn get_profile(
    State(state): State<AppState>,
    MaybeActor(viewer): MaybeActor,
    Path(user_id): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user_id = parse_id(&user_id, "user")?;
    let (user, rating) = state.user_service().get_profile(user_id).await?;
    let include_email = viewer.is_some_and(|v| v.is_self_or_admin(user_id));

    Ok(Json(ProfileResponse {
        user: UserResponse::from_user(user, include_email),
        rating,
    }))
}

/// `GET /users/{id}/reviews`
pub async fn get_user_reviews(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ReviewResponse>>, AppError> {
    let user_id = parse_id(&user_id, "user")?;
    let reviews = state
        .review_service()
        .reviews_for(user_id, page.into())
        .await?;
    Ok(Json(reviews.map(Into::into)))
}

/// `GET /freelancers?skill=&q=`
pub async fn search_freelancers(
    State(state): State<AppState>,
    Query(filter): Query<FreelancerSearchQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<UserResponse>>, AppError> {
    let users = state
        .user_service()
        .search_freelancers(filter.skill, filter.q, page.into())
        .await?;
    Ok(Json(users.map(|u| UserResponse::from_user(u, false))))
}
