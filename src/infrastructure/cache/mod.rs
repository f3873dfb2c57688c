//! Cache Module
//!
//! Redis connection management and caching utilities. Redis is optional:
//! without a configured URL the server runs single-instance, skips rate
//! limiting and computes admin statistics on every request.

mod cache_service;

pub use cache_service::{Cache, RedisCache};

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection, or
/// `None` when Redis is not configured.
#[instrument(skip(settings))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<Option<ConnectionManager>, redis::RedisError> {
    let Some(url) = settings.url() else {
        info!("Redis not configured; running without cache, rate limiting or pub/sub");
        return Ok(None);
    };
    info!("Connecting to Redis...");
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(Some(manager))
}

/// Cache key prefixes.
pub mod keys {
    /// Prefix for rate limiting windows (e.g., "ratelimit:api:10.0.0.1")
    pub const RATE_LIMIT: &str = "ratelimit:";

    /// Admin dashboard statistics snapshot
    pub const ADMIN_STATS: &str = "admin:stats";

    /// Generates a rate limit key
    #[inline]
    pub fn rate_limit(bucket: &str, client: impl std::fmt::Display) -> String {
        format!("{}{}:{}", RATE_LIMIT, bucket, client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key() {
        assert_eq!(keys::rate_limit("auth", "10.0.0.1"), "ratelimit:auth:10.0.0.1");
    }

    #[tokio::test]
    async fn test_no_url_means_no_client() {
        let settings = RedisSettings {
            url: None,
            events_channel: "koihire:events".into(),
        };
        assert!(create_redis_client(&settings).await.unwrap().is_none());
    }
}
