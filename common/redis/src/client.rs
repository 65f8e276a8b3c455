use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::{Client, CustomRedisError};

// Keys per SCAN round trip; large enough to keep invalidation to a handful of calls.
const SCAN_BATCH_SIZE: usize = 500;

pub struct RedisClient {
    connection: MultiplexedConnection,
}

impl RedisClient {
    /// Create a new RedisClient with timeout control
    ///
    /// # Arguments
    /// * `addr` - Redis connection string
    /// * `response_timeout` - Optional timeout for Redis command responses. `None` means no timeout.
    /// * `connection_timeout` - Optional timeout for establishing connections. `None` means no timeout.
    ///
    /// # Errors
    /// Returns `CustomRedisError::InvalidConfiguration` if `Some(Duration::ZERO)` is passed - use `None` for no timeout instead.
    ///
    /// # Examples
    /// ```no_run
    /// use common_redis::RedisClient;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let client = RedisClient::with_config(
    ///     "redis://localhost:6379/0".to_string(),
    ///     Some(Duration::from_millis(500)),
    ///     Some(Duration::from_millis(5000)),
    /// ).await.unwrap();
    /// # }
    /// ```
    pub async fn with_config(
        addr: String,
        response_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
    ) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;

        if let Some(timeout) = response_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis response timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }
        if let Some(timeout) = connection_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis connection timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }

        let mut config = redis::AsyncConnectionConfig::new();

        if let Some(timeout) = response_timeout {
            config = config.set_response_timeout(timeout);
        }

        if let Some(timeout) = connection_timeout {
            config = config.set_connection_timeout(timeout);
        }

        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn ping(&self) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let raw_bytes: Option<Vec<u8>> = conn.get(k).await?;

        match raw_bytes {
            Some(bytes) if !bytes.is_empty() => Ok(String::from_utf8(bytes)?),
            _ => Err(CustomRedisError::NotFound),
        }
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(k, v, seconds).await?;
        Ok(())
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(k).await?;
        Ok(())
    }

    async fn del_many(&self, keys: Vec<String>) -> Result<u64, CustomRedisError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let deleted: u64 = conn.del(keys).await?;
        Ok(deleted)
    }

    async fn scan_keys(&self, pattern: String) -> Result<Vec<String>, CustomRedisError> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        // SCAN may return a key more than once across iterations
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_response_timeout_returns_error() {
        let result = RedisClient::with_config(
            "redis://localhost:6379".to_string(),
            Some(Duration::ZERO),
            None,
        )
        .await;

        match result {
            Err(CustomRedisError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("response timeout"))
            }
            _ => panic!("Expected InvalidConfiguration"),
        }
    }

    #[tokio::test]
    async fn test_zero_connection_timeout_returns_error() {
        let result = RedisClient::with_config(
            "redis://localhost:6379".to_string(),
            None,
            Some(Duration::ZERO),
        )
        .await;

        match result {
            Err(CustomRedisError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("connection timeout"))
            }
            _ => panic!("Expected InvalidConfiguration"),
        }
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_connecting() {
        let result = RedisClient::with_config("not-a-url".to_string(), None, None).await;
        assert!(matches!(result, Err(CustomRedisError::Redis(_))));
    }
}
