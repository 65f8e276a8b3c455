use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use redis::ErrorKind as RedisErrorKind;

#[derive(Error, Debug, Clone)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CustomRedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CustomRedisError::Timeout
        } else {
            CustomRedisError::Redis(Arc::new(err))
        }
    }
}

impl From<std::string::FromUtf8Error> for CustomRedisError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CustomRedisError::ParseError(err.to_string())
    }
}

impl CustomRedisError {
    /// Create a Redis error from an ErrorKind (primarily for testing)
    pub fn from_redis_kind(kind: redis::ErrorKind, description: &'static str) -> Self {
        CustomRedisError::Redis(Arc::new(redis::RedisError::from((kind, description))))
    }

    /// Whether the error comes from the transport (connection, timeout, server
    /// availability) rather than from the data stored under the key.
    ///
    /// Callers that treat the cache as optional use this to tell "the cache is
    /// unreachable" apart from "this entry is absent or unreadable". Replies
    /// such as WRONGTYPE or an unparsable value are data errors.
    pub fn is_transport_error(&self) -> bool {
        match self {
            CustomRedisError::NotFound | CustomRedisError::ParseError(_) => false,
            CustomRedisError::Timeout | CustomRedisError::InvalidConfiguration(_) => true,
            CustomRedisError::Redis(err) => is_transport_redis_error(err),
        }
    }
}

fn is_transport_redis_error(err: &redis::RedisError) -> bool {
    err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
        || matches!(
            err.kind(),
            redis::ErrorKind::IoError
                | redis::ErrorKind::AuthenticationFailed
                | redis::ErrorKind::InvalidClientConfig
                | redis::ErrorKind::ClientError
                | redis::ErrorKind::BusyLoadingError
                | redis::ErrorKind::TryAgain
                | redis::ErrorKind::ClusterDown
                | redis::ErrorKind::MasterDown
                | redis::ErrorKind::ReadOnly
        )
}

/// A simple redis wrapper covering the string commands the catalog cache needs.
///
/// Values are plain UTF-8 strings; serialization is left to the caller.
#[async_trait]
pub trait Client {
    async fn ping(&self) -> Result<(), CustomRedisError>;
    async fn get(&self, k: String) -> Result<String, CustomRedisError>;
    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError>;
    async fn del(&self, k: String) -> Result<(), CustomRedisError>;
    /// Deletes every given key, returning how many existed.
    async fn del_many(&self, keys: Vec<String>) -> Result<u64, CustomRedisError>;
    /// Enumerates keys matching a glob-style pattern with SCAN, never KEYS.
    async fn scan_keys(&self, pattern: String) -> Result<Vec<String>, CustomRedisError>;
}

mod client;
mod mock;

pub use client::RedisClient;
pub use mock::{MockRedisCall, MockRedisClient};
