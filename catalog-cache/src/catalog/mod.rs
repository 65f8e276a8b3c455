//! The catalog as the HTTP layer sees it.
//!
//! Reads go through the memo tier and the distributed cache before reaching
//! the store; writes go to the store and then invalidate both tiers. Values
//! have the same shape whichever tier served them.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{DistributedCache, MemoTier, Namespace};
use crate::metrics_consts::{CACHE_READS_COUNTER, STORE_READS_COUNTER};
use crate::store::CatalogStore;

pub mod invalidation;
pub mod read_through;

pub use invalidation::InvalidationScope;

/// Distributed-cache TTL per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub tools: Duration,
    pub tool_count: Duration,
    pub tool: Duration,
    pub categories: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            tools: Duration::from_secs(300),
            tool_count: Duration::from_secs(300),
            tool: Duration::from_secs(600),
            categories: Duration::from_secs(600),
        }
    }
}

pub struct Catalog {
    store: Arc<dyn CatalogStore + Send + Sync>,
    cache: Arc<DistributedCache>,
    memo: MemoTier,
    ttls: CacheTtls,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn CatalogStore + Send + Sync>,
        cache: Arc<DistributedCache>,
        memo: MemoTier,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            store,
            cache,
            memo,
            ttls,
        }
    }

    pub fn cache(&self) -> &DistributedCache {
        &self.cache
    }

    pub fn memo(&self) -> &MemoTier {
        &self.memo
    }
}

fn record_cache_read(namespace: Namespace, outcome: &'static str) {
    metrics::counter!(
        CACHE_READS_COUNTER,
        "namespace" => namespace.prefix(),
        "outcome" => outcome
    )
    .increment(1);
}

fn record_store_read(operation: &'static str) {
    metrics::counter!(STORE_READS_COUNTER, "operation" => operation).increment(1);
}
