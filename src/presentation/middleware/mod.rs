//! Middleware
//!
//! Tower middleware for request processing.

pub mod auth;
pub mod cors;
pub mod metrics;
pub mod rate_limit;
pub mod security;

pub use auth::{auth_middleware, optional_auth_middleware, require_admin};
pub use metrics::track_http_metrics;
pub use rate_limit::{rate_limit_api, rate_limit_auth, rate_limit_realtime, Bucket, RateLimitInfo};
pub use security::{security_headers, SecurityHeadersConfig};
