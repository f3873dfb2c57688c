//! Review Handlers

use axum::{extract::State, http::StatusCode, Json};

use crate::application::dto::request::CreateReviewRequest;
use crate::application::dto::response::ReviewResponse;
use crate::application::services::{ReviewInput, ReviewService};
use crate::application::Actor;
use crate::domain::ReviewSubject;
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `POST /reviews`. Exactly one of `project_id` and `order_id` names the
/// completed work being reviewed.
pub async fn create_review(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(body): ValidatedJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), AppError> {
    let subject = review_subject(body.project_id.as_deref(), body.order_id.as_deref())?;
    let input = ReviewInput {
        subject,
        rating: body.rating,
        comment: body.comment,
    };

    let review = state.review_service().create_review(actor, input).await?;
    Ok((StatusCode::CREATED, Json(review.into())))
}

fn review_subject(
    project_id: Option<&str>,
    order_id: Option<&str>,
) -> Result<ReviewSubject, AppError> {
    match (project_id, order_id) {
        (Some(id), None) => Ok(ReviewSubject::Project(parse_id(id, "project")?)),
        (None, Some(id)) => Ok(ReviewSubject::Order(parse_id(id, "order")?)),
        _ => Err(AppError::BadRequest(
            "Provide exactly one of project_id or order_id".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_from_project() {
        assert_eq!(
            review_subject(Some("42"), None).unwrap(),
            ReviewSubject::Project(42)
        );
    }

    #[test]
    fn test_subject_from_order() {
        assert_eq!(
            review_subject(None, Some("7")).unwrap(),
            ReviewSubject::Order(7)
        );
    }

    #[test]
    fn test_subject_requires_exactly_one() {
        assert!(matches!(
            review_subject(Some("1"), Some("2")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(review_subject(None, None), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_subject_rejects_bad_id() {
        assert!(review_subject(Some("abc"), None).is_err());
    }
}
