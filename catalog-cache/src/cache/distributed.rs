//! Fail-open wrapper around the shared Redis connection.
//!
//! Nothing in here returns an error. A disabled client, an unreachable
//! server or a timed-out command all degrade to "no cache": reads report
//! [`CacheLookup::Unavailable`], writes report `false`, and pattern deletes
//! report zero keys.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use common_redis::{Client as RedisClientTrait, CustomRedisError, RedisClient};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::metrics_consts::CACHE_WRITES_COUNTER;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    Hit(V),
    /// The key is absent, expired or held a value that could not be decoded.
    Miss,
    /// The cache could not be asked (disabled, unreachable or timed out).
    Unavailable,
}

impl<V> CacheLookup<V> {
    pub fn outcome(&self) -> &'static str {
        match self {
            CacheLookup::Hit(_) => "hit",
            CacheLookup::Miss => "miss",
            CacheLookup::Unavailable => "unavailable",
        }
    }

    pub fn hit(self) -> Option<V> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss | CacheLookup::Unavailable => None,
        }
    }
}

type SharedClient = Arc<dyn RedisClientTrait + Send + Sync>;

pub struct DistributedCache {
    redis_url: String,
    connect_timeout: Duration,
    response_timeout: Duration,
    default_ttl: Duration,
    client: RwLock<Option<SharedClient>>,
}

impl DistributedCache {
    /// A cache that is not connected yet. Call [`DistributedCache::connect`]
    /// to enable it; until then every operation is a no-op.
    pub fn new(
        redis_url: String,
        connect_timeout: Duration,
        response_timeout: Duration,
        default_ttl: Duration,
    ) -> Self {
        Self {
            redis_url,
            connect_timeout,
            response_timeout,
            default_ttl,
            client: RwLock::new(None),
        }
    }

    /// A cache backed by an already built client, e.g. `MockRedisClient`.
    pub fn with_client(client: SharedClient, default_ttl: Duration) -> Self {
        Self {
            redis_url: String::new(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_millis(500),
            default_ttl,
            client: RwLock::new(Some(client)),
        }
    }

    /// A cache that never connects.
    pub fn disabled() -> Self {
        Self::new(
            String::new(),
            Duration::from_secs(5),
            Duration::from_millis(500),
            Duration::from_secs(300),
        )
    }

    /// Opens the connection and checks it with a PING.
    ///
    /// On failure the error is logged and the cache stays disabled; the
    /// service keeps running without it. Returns whether the cache is enabled.
    pub async fn connect(&self) -> bool {
        let attempt = async {
            let client = RedisClient::with_config(
                self.redis_url.clone(),
                Some(self.response_timeout),
                Some(self.connect_timeout),
            )
            .await?;
            client.ping().await?;
            Ok::<_, CustomRedisError>(client)
        };

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(client)) => {
                *self.client.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(client));
                tracing::info!("connected to redis cache");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "redis cache unavailable, running without cache");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "redis connect timed out, running without cache"
                );
                false
            }
        }
    }

    /// Drops the connection. Calling it again is a no-op.
    pub fn disconnect(&self) {
        let previous = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::info!("disconnected from redis cache");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client().is_some()
    }

    fn client(&self) -> Option<SharedClient> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, CustomRedisError>>,
    ) -> Result<T, CustomRedisError> {
        match tokio::time::timeout(self.response_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(CustomRedisError::Timeout),
        }
    }

    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> CacheLookup<V> {
        let Some(client) = self.client() else {
            return CacheLookup::Unavailable;
        };

        match self.bounded(client.get(key.to_string())).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => CacheLookup::Hit(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "corrupted cache entry, treating as miss");
                    CacheLookup::Miss
                }
            },
            Err(CustomRedisError::NotFound) => CacheLookup::Miss,
            Err(e) if !e.is_transport_error() => {
                tracing::warn!(key, error = %e, "unreadable cache entry, treating as miss");
                CacheLookup::Miss
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                CacheLookup::Unavailable
            }
        }
    }

    /// Stores `value` as JSON under `key`. `ttl` falls back to the default
    /// TTL and is rounded down to whole seconds, with a floor of one.
    pub async fn set<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> bool {
        let Some(client) = self.client() else {
            record_write("skipped");
            return false;
        };

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(key, error = %e, "failed to serialize cache value");
                record_write("error");
                return false;
            }
        };
        let seconds = ttl.unwrap_or(self.default_ttl).as_secs().max(1);

        match self
            .bounded(client.setex(key.to_string(), payload, seconds))
            .await
        {
            Ok(()) => {
                record_write("ok");
                true
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache write failed");
                record_write("error");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(client) = self.client() else {
            return false;
        };

        match self.bounded(client.del(key.to_string())).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache delete failed");
                false
            }
        }
    }

    /// Deletes every key matching a glob pattern, returning how many were removed.
    ///
    /// Keys are enumerated with SCAN and then deleted in one call, so a key
    /// written between the two steps may survive.
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        let Some(client) = self.client() else {
            return 0;
        };

        let keys = match self.bounded(client.scan_keys(pattern.to_string())).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "cache scan failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }

        match self.bounded(client.del_many(keys)).await {
            Ok(deleted) => {
                tracing::debug!(pattern, deleted, "deleted cache keys");
                deleted
            }
            Err(e) => {
                tracing::warn!(pattern, error = %e, "cache pattern delete failed");
                0
            }
        }
    }
}

fn record_write(outcome: &'static str) {
    metrics::counter!(CACHE_WRITES_COUNTER, "outcome" => outcome).increment(1);
}
