//! Cache Service
//!
//! Generic cache trait and Redis implementation, storing values as JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use koihire::infrastructure::cache::{keys, Cache, RedisCache};
//!
//! let cache = RedisCache::with_prefix(redis_connection, "koihire:");
//! cache.set_ex(keys::ADMIN_STATS, &stats, 30).await?;
//! let stats: Option<PlatformStats> = cache.get(keys::ADMIN_STATS).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};

use crate::shared::error::AppError;

/// Cache operations used by the application.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(None)` on a miss.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Store a value with a time-to-live in seconds.
    async fn set_ex<T: Serialize + Sync + Send>(
        &self,
        key: &str,
        value: &T,
        seconds: u64,
    ) -> Result<(), AppError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// Redis-backed cache implementation.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    /// Optional key prefix for namespacing
    prefix: Option<Arc<str>>,
}

impl RedisCache {
    /// All keys are prefixed, e.g. `"koihire:"` turns `admin:stats` into
    /// `koihire:admin:stats`.
    pub fn with_prefix(conn: ConnectionManager, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            conn,
            prefix: Some(prefix.into()),
        }
    }

    fn format_key(&self, key: &str) -> String {
        prefixed(self.prefix.as_deref(), key)
    }
}

fn prefixed(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, key),
        None => key.to_string(),
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| {
        warn!("Cache serialization error: {}", e);
        AppError::Internal(format!("Cache serialization failed: {}", e))
    })
}

fn deserialize<T: DeserializeOwned>(data: &str) -> Result<T, AppError> {
    serde_json::from_str(data).map_err(|e| {
        warn!("Cache deserialization error: {}", e);
        AppError::Internal(format!("Cache deserialization failed: {}", e))
    })
}

#[async_trait]
impl Cache for RedisCache {
    #[instrument(skip(self), level = "debug")]
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let result: Option<String> = conn.get(&full_key).await?;
        match result {
            Some(data) => {
                debug!(key = %full_key, "Cache hit");
                Ok(Some(deserialize(&data)?))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set_ex<T: Serialize + Sync + Send>(
        &self,
        key: &str,
        value: &T,
        seconds: u64,
    ) -> Result<(), AppError> {
        let full_key = self.format_key(key);
        let data = serialize(value)?;
        let mut conn = self.conn.clone();

        let _: () = conn.set_ex(&full_key, data, seconds).await?;
        debug!(key = %full_key, ttl = seconds, "Cache set with expiry");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let deleted: u64 = conn.del(&full_key).await?;
        Ok(deleted > 0)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Snapshot {
        users: i64,
        label: String,
    }

    #[test]
    fn test_json_round_trip() {
        let data = Snapshot {
            users: 12,
            label: "daily".into(),
        };
        let parsed: Snapshot = deserialize(&serialize(&data).unwrap()).unwrap();
        assert_eq!(data, parsed);
    }

    #[test]
    fn test_corrupt_entry_is_internal_error() {
        let err = deserialize::<Snapshot>("{not json").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_prefixed_keys() {
        assert_eq!(prefixed(None, "admin:stats"), "admin:stats");
        assert_eq!(prefixed(Some("koihire:"), "admin:stats"), "koihire:admin:stats");
    }
}
