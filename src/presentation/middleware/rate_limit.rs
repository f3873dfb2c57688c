//! Rate Limiting Middleware
//!
//! Redis sliding-window limiter shared by all instances. Without Redis the
//! middleware lets every request through.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::aio::ConnectionManager;
use serde::Serialize;

use crate::application::Actor;
use crate::infrastructure::cache::keys;
use crate::shared::error::{AppError, ErrorResponse};
use crate::startup::AppState;

/// Removes expired entries, then admits the request if the window still has
/// room. Returns `{allowed, count, retry_after_ms}`.
const SLIDING_WINDOW: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)
local count = redis.call('ZCARD', key)

if count < limit then
    redis.call('ZADD', key, now_ms, member)
    redis.call('PEXPIRE', key, window_ms + 1000)
    return {1, count + 1, 0}
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local retry = 0
if oldest and #oldest >= 2 then
    retry = tonumber(oldest[2]) + window_ms - now_ms
end
return {0, count, retry}
"#;

/// Limit buckets. Each has its own key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Register, login, refresh
    Auth,
    /// Everything else under /api/v1
    Api,
    /// Socket upgrades
    Realtime,
}

impl Bucket {
    /// (requests per window, window seconds)
    pub fn limits(self) -> (u32, u64) {
        match self {
            Bucket::Auth => (10, 60),
            Bucket::Api => (120, 60),
            Bucket::Realtime => (15, 60),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Bucket::Auth => "auth",
            Bucket::Api => "api",
            Bucket::Realtime => "realtime",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until a slot frees up (0 when allowed)
    pub retry_after: u64,
}

#[derive(Serialize)]
struct RateLimitedBody {
    #[serde(flatten)]
    error: ErrorResponse,
    rate_limit: RateLimitInfo,
}

/// Consume one slot for `client` in `bucket`. `Ok` when allowed.
pub async fn check(
    redis: &ConnectionManager,
    bucket: Bucket,
    client: &str,
) -> Result<Result<RateLimitInfo, RateLimitInfo>, redis::RedisError> {
    let (limit, window_secs) = bucket.limits();
    let now_ms = chrono::Utc::now().timestamp_millis();

    let mut conn = redis.clone();
    let (allowed, count, retry_ms): (i64, i64, i64) = redis::Script::new(SLIDING_WINDOW)
        .key(keys::rate_limit(bucket.name(), client))
        .arg(now_ms)
        .arg((window_secs * 1000) as i64)
        .arg(limit as i64)
        // Unique per request; two hits in the same millisecond must not collide
        .arg(format!("{}:{:016x}", now_ms, rand::random::<u64>()))
        .invoke_async(&mut conn)
        .await?;

    let info = RateLimitInfo {
        limit,
        remaining: limit.saturating_sub(count.max(0) as u32),
        retry_after: (retry_ms.max(0) as u64).div_ceil(1000),
    };
    Ok(if allowed == 1 { Ok(info) } else { Err(info) })
}

/// Who the limit applies to: the user when authenticated, otherwise the
/// client address (proxy headers first).
pub fn client_identifier(request: &Request, peer: Option<IpAddr>) -> String {
    if let Some(actor) = request.extensions().get::<Actor>() {
        return format!("user:{}", actor.user_id);
    }

    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    let real_ip = headers.get("x-real-ip").and_then(|h| h.to_str().ok());

    forwarded
        .into_iter()
        .chain(real_ip)
        .filter_map(|ip| ip.parse::<IpAddr>().ok())
        .chain(peer)
        .next()
        .map(|ip| format!("ip:{}", ip))
        .unwrap_or_else(|| "ip:unknown".into())
}

fn set_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(info.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(info.remaining));
}

fn too_many_requests(info: RateLimitInfo) -> Response {
    let (_, code) = AppError::RateLimited.status_and_code();

    let body = RateLimitedBody {
        error: ErrorResponse {
            code,
            message: "You are being rate limited. Please slow down.".into(),
            errors: None,
        },
        rate_limit: info,
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    set_headers(response.headers_mut(), &info);
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(info.retry_after));
    response
}

async fn limit(state: AppState, request: Request, next: Next, bucket: Bucket) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let client = client_identifier(&request, peer);
    match check(redis, bucket, &client).await {
        Ok(Ok(info)) => {
            let mut response = next.run(request).await;
            set_headers(response.headers_mut(), &info);
            response
        }
        Ok(Err(info)) => {
            tracing::warn!(client = %client, bucket = ?bucket, "Rate limit exceeded");
            too_many_requests(info)
        }
        Err(e) => {
            // Fail open
            tracing::error!(error = %e, "Rate limiter unavailable");
            next.run(request).await
        }
    }
}

pub async fn rate_limit_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    limit(state, request, next, Bucket::Auth).await
}

pub async fn rate_limit_api(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    limit(state, request, next, Bucket::Api).await
}

pub async fn rate_limit_realtime(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    limit(state, request, next, Bucket::Realtime).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserRole;
    use axum::body::Body;
    use test_case::test_case;

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test_case(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")], "ip:203.0.113.9" ; "forwarded for")]
    #[test_case(&[("x-real-ip", "198.51.100.4")], "ip:198.51.100.4" ; "real ip")]
    #[test_case(&[("x-forwarded-for", "garbage")], "ip:127.0.0.1" ; "invalid header falls back to peer")]
    #[test_case(&[], "ip:127.0.0.1" ; "peer address")]
    fn test_client_identifier(headers: &[(&str, &str)], expected: &str) {
        let req = request(headers);
        let peer = Some("127.0.0.1".parse().unwrap());
        assert_eq!(client_identifier(&req, peer), expected);
    }

    #[test]
    fn test_authenticated_user_wins() {
        let mut req = request(&[("x-real-ip", "198.51.100.4")]);
        req.extensions_mut().insert(Actor::new(77, UserRole::Client));
        assert_eq!(client_identifier(&req, None), "user:77");
    }

    #[test]
    fn test_unknown_client() {
        assert_eq!(client_identifier(&request(&[]), None), "ip:unknown");
    }

    #[test]
    fn test_rate_limited_response() {
        let response = too_many_requests(RateLimitInfo {
            limit: 10,
            remaining: 0,
            retry_after: 12,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "12");
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "10");
    }
}
