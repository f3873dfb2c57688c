//! Route Configuration
//!
//! Configures all HTTP routes for the API. Each resource splits into a
//! public router and one behind `auth_middleware`, merged under the same
//! prefix.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{
    auth_middleware, optional_auth_middleware, rate_limit_api, rate_limit_auth,
    rate_limit_realtime, require_admin, security_headers, track_http_metrics,
    SecurityHeadersConfig,
};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let security = SecurityHeadersConfig::for_environment(&state.settings.environment);

    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_http_metrics))
        // Outermost so every response carries the headers
        .layer(middleware::from_fn_with_state(security, security_headers))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes(state.clone()))
        .nest("/users", user_routes(state.clone()))
        .route("/freelancers", get(handlers::users::search_freelancers))
        .nest("/projects", project_routes(state.clone()))
        .nest("/applications", application_routes(state.clone()))
        .nest("/services", service_routes(state.clone()))
        .nest("/orders", order_routes(state.clone()))
        .merge(money_routes(state.clone()))
        .nest("/conversations", conversation_routes(state.clone()))
        .nest("/notifications", notification_routes(state.clone()))
        .merge(
            Router::new()
                .route("/reviews", post(handlers::reviews::create_review))
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .nest("/admin", admin_routes(state.clone()))
        // Signed by Stripe, no bearer token
        .route("/webhooks/stripe", post(handlers::escrows::stripe_webhook))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_api))
        // Added after the API limiter so upgrades only count against their own bucket
        .route(
            "/realtime",
            get(ws_handler).route_layer(middleware::from_fn_with_state(
                state,
                rate_limit_realtime,
            )),
        )
}

/// Authentication routes (public, with stricter rate limiting)
fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh_token))
        .route("/logout", post(handlers::auth::logout))
        .route_layer(middleware::from_fn_with_state(state, rate_limit_auth))
}

fn user_routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/{id}", get(handlers::users::get_profile))
        .route("/{id}/reviews", get(handlers::users::get_user_reviews))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let protected = Router::new()
        .route(
            "/me",
            get(handlers::users::get_current_user).patch(handlers::users::update_current_user),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    public.merge(protected)
}

fn project_routes(state: AppState) -> Router<AppState> {
    use handlers::{applications, projects};

    let public = Router::new()
        .route("/", get(projects::browse_projects))
        .route("/{id}", get(projects::get_project));

    let protected = Router::new()
        .route("/", post(projects::create_project))
        .route("/mine", get(projects::my_projects))
        .route("/{id}", patch(projects::update_project))
        .route("/{id}/cancel", post(projects::cancel_project))
        .route("/{id}/complete", post(projects::complete_project))
        .route("/{id}/dispute", post(projects::dispute_project))
        .route(
            "/{id}/applications",
            get(applications::list_for_project).post(applications::apply),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    public.merge(protected)
}

fn application_routes(state: AppState) -> Router<AppState> {
    use handlers::applications;

    Router::new()
        .route("/mine", get(applications::my_applications))
        .route("/{id}/accept", post(applications::accept))
        .route("/{id}/reject", post(applications::reject))
        .route("/{id}/withdraw", post(applications::withdraw))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn service_routes(state: AppState) -> Router<AppState> {
    use handlers::{catalog, orders};

    let public = Router::new()
        .route("/", get(catalog::browse_services))
        .route("/{id}", get(catalog::get_service))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let protected = Router::new()
        .route("/", post(catalog::create_service))
        .route("/mine", get(catalog::my_services))
        .route("/{id}", patch(catalog::update_service))
        .route("/{id}/packages", put(catalog::replace_packages))
        .route("/{id}/orders", post(orders::place_order))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    public.merge(protected)
}

fn order_routes(state: AppState) -> Router<AppState> {
    use handlers::orders;

    Router::new()
        .route("/mine", get(orders::my_orders))
        .route("/{id}", get(orders::get_order))
        .route("/{id}/accept", post(orders::accept))
        .route("/{id}/start", post(orders::start))
        .route("/{id}/deliver", post(orders::deliver))
        .route("/{id}/revision", post(orders::request_revision))
        .route("/{id}/complete", post(orders::complete))
        .route("/{id}/cancel", post(orders::cancel))
        .route("/{id}/dispute", post(orders::dispute))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Escrow, wallet and payout routes
fn money_routes(state: AppState) -> Router<AppState> {
    use handlers::{escrows, payouts};

    Router::new()
        .route("/escrows/{id}", get(escrows::get_escrow))
        .route("/escrows/{id}/fund", post(escrows::fund))
        .route("/wallet", get(payouts::wallet))
        .route("/payouts", post(payouts::request_payout))
        .route("/payouts/mine", get(payouts::my_payouts))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn conversation_routes(state: AppState) -> Router<AppState> {
    use handlers::conversations;

    Router::new()
        .route(
            "/",
            get(conversations::list_conversations).post(conversations::start_conversation),
        )
        .route(
            "/{id}/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/{id}/read", post(conversations::mark_read))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn notification_routes(state: AppState) -> Router<AppState> {
    use handlers::notifications;

    Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/{id}/read", post(notifications::mark_read))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Admin routes. `auth_middleware` is the outer layer so `require_admin`
/// sees the actor it inserts.
fn admin_routes(state: AppState) -> Router<AppState> {
    use handlers::{admin, payouts};

    Router::new()
        .route("/stats", get(admin::stats))
        .route("/users", get(admin::list_users))
        .route("/users/{id}/status", patch(admin::set_user_status))
        .route("/disputes", get(admin::list_disputes))
        .route("/escrows/{id}/resolve", post(admin::resolve_dispute))
        .route("/projects/{id}/tier", patch(admin::set_project_tier))
        .route("/services/{id}/tier", patch(admin::set_service_tier))
        .route("/services/{id}/active", patch(admin::set_service_active))
        .route("/payouts", get(payouts::list_payouts))
        .route("/payouts/{id}/process", post(payouts::process_payout))
        .route("/payouts/{id}/complete", post(payouts::complete_payout))
        .route("/payouts/{id}/fail", post(payouts::fail_payout))
        .route("/audit-log", get(admin::audit_log))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
