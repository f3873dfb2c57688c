//! Health Check Handlers
//!
//! # Endpoints
//! - `GET /health` - Static liveness with the build version
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness: database, Redis, payments and the
//!   realtime hub

use std::future::Future;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::infrastructure::database;
use crate::startup::AppState;

static STARTED: Lazy<(Instant, DateTime<Utc>)> = Lazy::new(|| (Instant::now(), Utc::now()));

/// Database round trips slower than this report `degraded`.
const DB_DEGRADED_MS: u64 = 100;
const REDIS_DEGRADED_MS: u64 = 50;

/// Pin the uptime clock to process start rather than the first probe.
pub fn init_server_start() {
    Lazy::force(&STARTED);
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub checks: Checks,
}

#[derive(Debug, Serialize)]
pub struct Checks {
    pub database: ServiceHealth,
    pub redis: ServiceHealth,
    pub payments: ServiceHealth,
    pub realtime: RealtimeHealth,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceHealth {
    fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RealtimeHealth {
    pub active_sessions: usize,
    /// Events reach other instances through Redis pub/sub
    pub fan_out: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// `GET /health`
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /health/live`
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// `GET /health/ready`. 503 only when the database is down; Redis and the
/// payment setup can only degrade the instance.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let (started, started_at) = *STARTED;

    let database = timed(database::ping(&state.db), DB_DEGRADED_MS).await;
    let redis = match state.redis.clone() {
        Some(mut conn) => {
            let ping = async move { redis::cmd("PING").query_async::<String>(&mut conn).await };
            timed(ping, REDIS_DEGRADED_MS).await
        }
        None => ServiceHealth::healthy("not configured"),
    };
    let payments = payments_health(&state);

    let status = overall_status(&database, &[&redis, &payments]);
    let response = ReadinessResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: started.elapsed().as_secs(),
        started_at,
        checks: Checks {
            database,
            redis,
            payments,
            realtime: RealtimeHealth {
                active_sessions: state.hub.session_count(),
                fan_out: state.redis.is_some(),
            },
        },
    };

    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(response))
}

/// Run a dependency probe and grade it by round-trip time.
async fn timed<F, T, E>(probe: F, degraded_after_ms: u64) -> ServiceHealth
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    match probe.await {
        Ok(_) => {
            let latency = start.elapsed().as_millis() as u64;
            ServiceHealth {
                status: if latency < degraded_after_ms {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                },
                latency_ms: Some(latency),
                message: None,
            }
        }
        Err(e) => ServiceHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(e.to_string()),
        },
    }
}

/// Stripe without a webhook secret can create charges but never learns
/// that they succeeded.
fn payments_health(state: &AppState) -> ServiceHealth {
    let provider = state.payments.name();
    let webhook_ready = state
        .settings
        .payments
        .stripe_webhook_secret
        .as_deref()
        .is_some_and(|s| !s.is_empty());

    match provider {
        "stripe" if !webhook_ready => {
            ServiceHealth::degraded("stripe: webhook secret missing, funding cannot confirm")
        }
        name => ServiceHealth::healthy(name),
    }
}

/// The database is the only hard dependency; anything else caps at
/// degraded.
fn overall_status(database: &ServiceHealth, optional: &[&ServiceHealth]) -> HealthStatus {
    let worst_optional = optional
        .iter()
        .map(|h| h.status.min(HealthStatus::Degraded))
        .max()
        .unwrap_or(HealthStatus::Healthy);
    database.status.max(worst_optional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn health(status: HealthStatus) -> ServiceHealth {
        ServiceHealth {
            status,
            latency_ms: None,
            message: None,
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test_case(HealthStatus::Healthy, HealthStatus::Healthy, HealthStatus::Healthy ; "all healthy")]
    #[test_case(HealthStatus::Degraded, HealthStatus::Healthy, HealthStatus::Degraded ; "slow database")]
    #[test_case(HealthStatus::Unhealthy, HealthStatus::Healthy, HealthStatus::Unhealthy ; "database down")]
    #[test_case(HealthStatus::Healthy, HealthStatus::Unhealthy, HealthStatus::Degraded ; "redis down only degrades")]
    fn test_overall_status(db: HealthStatus, redis: HealthStatus, expected: HealthStatus) {
        let payments = health(HealthStatus::Healthy);
        assert_eq!(
            overall_status(&health(db), &[&health(redis), &payments]),
            expected
        );
    }

    #[tokio::test]
    async fn test_timed_reports_failure_message() {
        let result = timed(async { Err::<(), _>("connection refused") }, 100).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.message.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_timed_fast_probe_is_healthy() {
        let result = timed(async { Ok::<_, String>(()) }, 1_000).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.latency_ms.is_some());
    }
}
