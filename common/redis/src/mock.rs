use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::{Client, CustomRedisError};

/// In-memory stand-in for Redis.
///
/// Unlike a canned-response mock, this one keeps a real key space so that
/// set-then-get, TTL expiry and pattern deletion behave like the server.
/// Expiry uses `tokio::time::Instant`, so tests can drive it with
/// `tokio::time::pause()` and `advance()`. Every call is recorded, and
/// `fail_with` makes every subsequent call return the given error.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    entries: Arc<Mutex<HashMap<String, MockEntry>>>,
    failure: Arc<Mutex<Option<CustomRedisError>>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

#[derive(Debug, Clone)]
struct MockEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MockEntry {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => at > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with `err` until `clear_failure` is called.
    pub fn fail_with(&self, err: CustomRedisError) -> Self {
        *lock(&self.failure) = Some(err);
        self.clone()
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    /// Write a raw value without a TTL, bypassing the call log.
    pub fn insert_raw(&self, key: &str, value: &str) -> Self {
        lock(&self.entries).insert(
            key.to_string(),
            MockEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        self.clone()
    }

    /// Live keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = lock(&self.entries)
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remaining TTL of a live key, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        lock(&self.entries)
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at - now)
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<MockRedisCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    fn record(&self, op: &str, key: &str) -> Result<(), CustomRedisError> {
        lock(&self.calls).push(MockRedisCall {
            op: op.to_string(),
            key: key.to_string(),
        });

        match lock(&self.failure).as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn ping(&self) -> Result<(), CustomRedisError> {
        self.record("ping", "")
    }

    async fn get(&self, key: String) -> Result<String, CustomRedisError> {
        self.record("get", &key)?;

        let now = Instant::now();
        let mut entries = lock(&self.entries);
        match entries.get(&key) {
            Some(entry) if entry.is_live(now) => Ok(entry.value.clone()),
            Some(_) => {
                entries.remove(&key);
                Err(CustomRedisError::NotFound)
            }
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn setex(&self, key: String, value: String, seconds: u64) -> Result<(), CustomRedisError> {
        self.record("setex", &key)?;

        if seconds == 0 {
            return Err(CustomRedisError::from_redis_kind(
                redis::ErrorKind::ResponseError,
                "invalid expire time in 'setex' command",
            ));
        }

        lock(&self.entries).insert(
            key,
            MockEntry {
                value,
                expires_at: Some(Instant::now() + Duration::from_secs(seconds)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: String) -> Result<(), CustomRedisError> {
        self.record("del", &key)?;
        lock(&self.entries).remove(&key);
        Ok(())
    }

    async fn del_many(&self, keys: Vec<String>) -> Result<u64, CustomRedisError> {
        self.record("del_many", &keys.join(" "))?;

        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = entries.remove(&key) {
                if entry.is_live(now) {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn scan_keys(&self, pattern: String) -> Result<Vec<String>, CustomRedisError> {
        self.record("scan_keys", &pattern)?;

        let now = Instant::now();
        let mut keys: Vec<String> = lock(&self.entries)
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(&pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Redis-style glob matching for `*`, `?` and backslash escapes.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    glob_match_from(&pattern, &candidate)
}

fn glob_match_from(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.split_first() {
        None => candidate.is_empty(),
        Some(('*', rest)) => {
            (0..=candidate.len()).any(|skip| glob_match_from(rest, &candidate[skip..]))
        }
        Some(('?', rest)) => !candidate.is_empty() && glob_match_from(rest, &candidate[1..]),
        Some(('\\', rest)) if !rest.is_empty() => {
            candidate.first() == Some(&rest[0]) && glob_match_from(&rest[1..], &candidate[1..])
        }
        Some((literal, rest)) => {
            candidate.first() == Some(literal) && glob_match_from(rest, &candidate[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("tools:*", "tools:ru:all:0:12"));
        assert!(!glob_match("tool:*", "tools:ru:all:0:12"));
        assert!(!glob_match("tool:*", "tool_count:all"));
        assert!(glob_match("tool:*", "tool:chatgpt:ru"));
        assert!(glob_match("categories:??", "categories:en"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
        assert!(glob_match("*", ""));
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let client = MockRedisClient::new();
        client
            .setex("k".to_string(), "v".to_string(), 60)
            .await
            .unwrap();

        assert_eq!(client.get("k".to_string()).await.unwrap(), "v");
        assert!(matches!(
            client.get("missing".to_string()).await,
            Err(CustomRedisError::NotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let client = MockRedisClient::new();
        client
            .setex("k".to_string(), "v".to_string(), 5)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(client.get("k".to_string()).await.is_ok());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            client.get("k".to_string()).await,
            Err(CustomRedisError::NotFound)
        ));
        assert!(client.keys().is_empty());
    }

    #[tokio::test]
    async fn test_scan_and_del_many() {
        let client = MockRedisClient::new()
            .insert_raw("tools:ru:all:0:12", "[]")
            .insert_raw("tools:en:all:0:12", "[]")
            .insert_raw("categories:ru", "[]");

        let keys = client.scan_keys("tools:*".to_string()).await.unwrap();
        assert_eq!(keys, vec!["tools:en:all:0:12", "tools:ru:all:0:12"]);

        let deleted = client.del_many(keys).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(client.keys(), vec!["categories:ru"]);
    }

    #[tokio::test]
    async fn test_failure_injection_applies_to_every_call() {
        let client = MockRedisClient::new().fail_with(CustomRedisError::Timeout);

        assert!(matches!(
            client.get("k".to_string()).await,
            Err(CustomRedisError::Timeout)
        ));
        assert!(matches!(
            client.setex("k".to_string(), "v".to_string(), 1).await,
            Err(CustomRedisError::Timeout)
        ));

        client.clear_failure();
        assert!(client.ping().await.is_ok());
        assert_eq!(client.get_calls().len(), 3);
    }
}
