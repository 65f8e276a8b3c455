pub const CACHE_READS_COUNTER: &str = "catalog_cache_reads_total";
pub const CACHE_WRITES_COUNTER: &str = "catalog_cache_writes_total";
pub const CACHE_INVALIDATED_KEYS_COUNTER: &str = "catalog_cache_invalidated_keys_total";
pub const STORE_READS_COUNTER: &str = "catalog_store_reads_total";
