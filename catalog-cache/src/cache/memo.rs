//! Process-local memo tier for hot lookups.
//!
//! Entries are bounded in number and in age, and every write to the catalog
//! clears the whole tier, so a memoized value is never older than the last
//! write or the configured TTL, whichever is sooner.

use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use moka::future::Cache;

use crate::metrics_consts::CACHE_READS_COUNTER;
use crate::models::{Category, Language, Tool, ToolPage};

/// An in-memory memo table keyed by call arguments.
///
/// Concurrent first callers for the same key may both run the computation;
/// the last result wins.
#[derive(Clone)]
pub struct Memoizer<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    cache: Cache<K, V>,
}

impl<K, V> Memoizer<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `name` labels the memo hits this table reports.
    pub fn new(name: &'static str, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { name, cache }
    }

    async fn lookup(&self, key: &K) -> Option<V> {
        let value = self.cache.get(key).await;
        if value.is_some() {
            metrics::counter!(CACHE_READS_COUNTER, "namespace" => self.name, "outcome" => "memo_hit")
                .increment(1);
        }
        value
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value).await;
    }

    /// Returns the memoized value, or computes and memoizes it.
    /// Errors are returned as-is and nothing is memoized for them.
    pub async fn get_or_try_compute<E, F, Fut>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.lookup(&key).await {
            return Ok(value);
        }

        let value = compute().await?;
        self.cache.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        self.cache.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl<K, V> Memoizer<K, Option<V>>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Like [`Memoizer::get_or_try_compute`], but an absent result is never
    /// memoized, so a record created later is found on the next call.
    pub async fn get_or_try_compute_present<E, F, Fut>(
        &self,
        key: K,
        compute: F,
    ) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(value) = self.lookup(&key).await {
            return Ok(value);
        }

        let value = compute().await?;
        if value.is_some() {
            self.cache.insert(key, value.clone()).await;
        }
        Ok(value)
    }
}

/// The memo tables sitting in front of the distributed cache.
#[derive(Clone)]
pub struct MemoTier {
    pub tool: Memoizer<(String, Language), Option<Tool>>,
    pub categories: Memoizer<Language, Vec<Category>>,
    pub featured: Memoizer<(Language, u64), ToolPage>,
    pub latest: Memoizer<(Language, u64), ToolPage>,
}

impl MemoTier {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            tool: Memoizer::new("tool", max_entries, ttl),
            categories: Memoizer::new("categories", max_entries, ttl),
            featured: Memoizer::new("featured", max_entries, ttl),
            latest: Memoizer::new("latest", max_entries, ttl),
        }
    }

    pub fn clear(&self) {
        self.tool.clear();
        self.categories.clear();
        self.featured.clear();
        self.latest.clear();
        tracing::debug!("cleared local memo tier");
    }
}
