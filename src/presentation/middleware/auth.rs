//! Authentication Middleware
//!
//! Resolves the bearer token to an active user and stores the resulting
//! [`Actor`] in the request extensions. Suspended and banned accounts are
//! rejected even while their access token is still unexpired.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::application::services::AuthService;
use crate::application::Actor;
use crate::shared::error::AppError;
use crate::startup::AppState;

fn bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    if !headers.contains_key(AUTHORIZATION) {
        return Err(AppError::Unauthorized("Missing authorization header".into()));
    }

    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|Authorization(bearer)| bearer.token().to_owned())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format".into()))
}

/// Reject the request unless it carries a valid access token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let user = state.auth_service().authenticate_token(&token).await?;

    request.extensions_mut().insert(Actor::new(user.id, user.role));
    Ok(next.run(request).await)
}

/// Attach an [`Actor`] when a valid token is present; anonymous otherwise.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Ok(token) = bearer_token(request.headers()) {
        if let Ok(user) = state.auth_service().authenticate_token(&token).await {
            request.extensions_mut().insert(Actor::new(user.id, user.role));
        }
    }
    next.run(request).await
}

/// Must run after [`auth_middleware`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<Actor>() {
        Some(actor) if actor.is_admin() => Ok(next.run(request).await),
        Some(_) => Err(AppError::Forbidden("Admin access required".into())),
        None => Err(AppError::Unauthorized("Authentication required".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AppError::Unauthorized(_))));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }
}
