use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::cache::{DistributedCache, MemoTier};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::router;
use crate::store::PgCatalogStore;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = match PgCatalogStore::connect(
        &config.database_url,
        config.max_pg_connections,
        Duration::from_secs(config.acquire_timeout_secs),
    )
    .await
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to the database");
            return;
        }
    };

    let cache = Arc::new(DistributedCache::new(
        config.redis_url.clone(),
        config.redis_connect_timeout(),
        config.redis_response_timeout(),
        config.cache_default_ttl(),
    ));
    // A missing cache only costs latency
    cache.connect().await;

    let catalog = Arc::new(Catalog::new(
        store,
        cache.clone(),
        MemoTier::new(config.memo_max_entries, config.memo_ttl()),
        config.cache_ttls(),
    ));

    serve_catalog(catalog, config, listener, shutdown).await;
    cache.disconnect();
}

/// Serves an already assembled catalog until `shutdown` resolves.
pub async fn serve_catalog<F>(
    catalog: Arc<Catalog>,
    config: Config,
    listener: TcpListener,
    shutdown: F,
)
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router::router(catalog, &config);

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!(error = %e, "listening on an unknown address"),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "server stopped with an error");
    }
}
