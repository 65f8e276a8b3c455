//! Read-through accessors.
//!
//! Listings and counts are cached in Redis. Single tools and categories sit
//! behind the memo tier first, then Redis. Featured and latest tools only use
//! the memo tier. Queries with filters outside the cache key go straight to
//! the store and never touch the cache.

use crate::cache::keys::{categories_key, tool_count_key, tool_key, tools_key};
use crate::cache::{CacheLookup, Namespace};
use crate::catalog::{record_cache_read, record_store_read, Catalog};
use crate::errors::CatalogError;
use crate::models::{Category, Language, Review, Tool, ToolFilter, ToolPage, ToolQuery};
use crate::translation::{localize_categories, localize_review, localize_tool, localize_tools};

/// Categories are reference data; one page covers them all.
pub const CATEGORY_LIST_LIMIT: u64 = 100;

pub const DEFAULT_PAGE_SIZE: u64 = 12;
pub const HIGHLIGHT_LIMIT: u64 = 6;

impl Catalog {
    /// A page of tools plus the total matching the same filter.
    pub async fn list_tools(&self, query: &ToolQuery) -> Result<ToolPage, CatalogError> {
        if !query.is_cacheable() {
            record_cache_read(Namespace::Tools, "bypass");
            let items = self.load_tools(query).await?;
            let total = self.load_count(query.lang, &query.filter).await?;
            return Ok(ToolPage { items, total });
        }

        let key = tools_key(query.lang, query.filter.category_id, query.skip, query.limit);
        let lookup = self.cache.get::<Vec<Tool>>(&key).await;
        record_cache_read(Namespace::Tools, lookup.outcome());

        match lookup {
            CacheLookup::Hit(items) => {
                tracing::debug!(key = %key, "tool listing served from cache");
                let total = self.count_tools(query.filter.category_id).await?;
                Ok(ToolPage { items, total })
            }
            CacheLookup::Miss => {
                let items = self.load_tools(query).await?;
                let total = self.load_count(query.lang, &query.filter).await?;

                self.cache.set(&key, &items, Some(self.ttls.tools)).await;
                self.cache
                    .set(
                        &tool_count_key(query.filter.category_id),
                        &total,
                        Some(self.ttls.tool_count),
                    )
                    .await;

                Ok(ToolPage { items, total })
            }
            // Skip writes too; the cache is down or timing out
            CacheLookup::Unavailable => {
                let items = self.load_tools(query).await?;
                let total = self.load_count(query.lang, &query.filter).await?;
                Ok(ToolPage { items, total })
            }
        }
    }

    /// Number of tools, optionally within one category.
    pub async fn count_tools(&self, category_id: Option<i64>) -> Result<i64, CatalogError> {
        let key = tool_count_key(category_id);
        let lookup = self.cache.get::<i64>(&key).await;
        record_cache_read(Namespace::ToolCount, lookup.outcome());

        let filter = ToolFilter {
            category_id,
            ..Default::default()
        };

        match lookup {
            CacheLookup::Hit(total) => Ok(total),
            CacheLookup::Miss => {
                let total = self.load_count(Language::FALLBACK, &filter).await?;
                self.cache.set(&key, &total, Some(self.ttls.tool_count)).await;
                Ok(total)
            }
            CacheLookup::Unavailable => self.load_count(Language::FALLBACK, &filter).await,
        }
    }

    /// A single tool by slug, or `None` when there is no such tool.
    /// Absent tools are not cached in either tier.
    pub async fn get_tool(&self, slug: &str, lang: Language) -> Result<Option<Tool>, CatalogError> {
        self.memo
            .tool
            .get_or_try_compute_present((slug.to_string(), lang), || {
                self.get_tool_from_cache(slug, lang)
            })
            .await
    }

    async fn get_tool_from_cache(
        &self,
        slug: &str,
        lang: Language,
    ) -> Result<Option<Tool>, CatalogError> {
        let key = tool_key(slug, lang);
        let lookup = self.cache.get::<Tool>(&key).await;
        record_cache_read(Namespace::Tool, lookup.outcome());

        match lookup {
            CacheLookup::Hit(tool) => Ok(Some(tool)),
            CacheLookup::Miss => {
                let tool = self.load_tool(slug, lang).await?;
                if let Some(tool) = &tool {
                    self.cache.set(&key, tool, Some(self.ttls.tool)).await;
                }
                Ok(tool)
            }
            CacheLookup::Unavailable => self.load_tool(slug, lang).await,
        }
    }

    pub async fn list_categories(&self, lang: Language) -> Result<Vec<Category>, CatalogError> {
        self.memo
            .categories
            .get_or_try_compute(lang, || self.list_categories_from_cache(lang))
            .await
    }

    async fn list_categories_from_cache(
        &self,
        lang: Language,
    ) -> Result<Vec<Category>, CatalogError> {
        let key = categories_key(lang);
        let lookup = self.cache.get::<Vec<Category>>(&key).await;
        record_cache_read(Namespace::Categories, lookup.outcome());

        match lookup {
            CacheLookup::Hit(categories) => Ok(categories),
            CacheLookup::Miss => {
                let categories = self.load_categories(lang).await?;
                self.cache
                    .set(&key, &categories, Some(self.ttls.categories))
                    .await;
                Ok(categories)
            }
            CacheLookup::Unavailable => self.load_categories(lang).await,
        }
    }

    /// Featured tools; the newest tools stand in when none are featured.
    pub async fn featured_tools(&self, lang: Language, limit: u64) -> Result<ToolPage, CatalogError> {
        self.memo
            .featured
            .get_or_try_compute((lang, limit), || async move {
                record_store_read("featured_tools");
                let mut records = self.store.fetch_featured_tools(limit).await?;
                if records.is_empty() {
                    record_store_read("latest_tools");
                    records = self.store.fetch_latest_tools(limit).await?;
                }
                Ok::<_, CatalogError>(highlight_page(localize_tools(&records, lang)))
            })
            .await
    }

    pub async fn latest_tools(&self, lang: Language, limit: u64) -> Result<ToolPage, CatalogError> {
        self.memo
            .latest
            .get_or_try_compute((lang, limit), || async move {
                record_store_read("latest_tools");
                let records = self.store.fetch_latest_tools(limit).await?;
                Ok::<_, CatalogError>(highlight_page(localize_tools(&records, lang)))
            })
            .await
    }

    /// Reviews of a tool, newest first. Never cached.
    pub async fn reviews_for_tool(
        &self,
        slug: &str,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Review>, CatalogError> {
        record_store_read("reviews");
        let records = self.store.fetch_reviews(slug, skip, limit).await?;
        Ok(records.iter().map(localize_review).collect())
    }

    /// Tools created by one user. Never cached.
    pub async fn tools_by_owner(
        &self,
        owner_id: i64,
        lang: Language,
    ) -> Result<Vec<Tool>, CatalogError> {
        record_store_read("tools_by_owner");
        let records = self.store.fetch_tools_by_owner(owner_id).await?;
        Ok(localize_tools(&records, lang))
    }

    async fn load_tools(&self, query: &ToolQuery) -> Result<Vec<Tool>, CatalogError> {
        record_store_read("tools");
        let records = self
            .store
            .fetch_tools(query.lang, &query.filter, query.skip, query.limit)
            .await?;
        Ok(localize_tools(&records, query.lang))
    }

    async fn load_count(&self, lang: Language, filter: &ToolFilter) -> Result<i64, CatalogError> {
        record_store_read("tool_count");
        self.store.count_tools(lang, filter).await
    }

    async fn load_tool(&self, slug: &str, lang: Language) -> Result<Option<Tool>, CatalogError> {
        record_store_read("tool");
        let record = self.store.fetch_tool_by_slug(slug).await?;
        Ok(record.map(|record| localize_tool(&record, lang)))
    }

    async fn load_categories(&self, lang: Language) -> Result<Vec<Category>, CatalogError> {
        record_store_read("categories");
        let records = self.store.fetch_categories(0, CATEGORY_LIST_LIMIT).await?;
        Ok(localize_categories(&records, lang))
    }
}

fn highlight_page(items: Vec<Tool>) -> ToolPage {
    let total = i64::try_from(items.len()).unwrap_or(i64::MAX);
    ToolPage { items, total }
}
