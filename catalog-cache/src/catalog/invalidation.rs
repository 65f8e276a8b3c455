//! Write path: commit to the store, then invalidate.
//!
//! Invalidation only runs after the store accepted the write, and its failure
//! never fails the write. Every write also clears the whole memo tier.

use std::fmt;

use crate::cache::Namespace;
use crate::catalog::Catalog;
use crate::errors::CatalogError;
use crate::metrics_consts::CACHE_INVALIDATED_KEYS_COUNTER;
use crate::models::{
    CategoryRecord, Language, NewCategory, NewReview, NewTool, NewToolTranslation, Review, Tool,
};
use crate::translation::{localize_review, localize_tool};

const RATING_RANGE: std::ops::RangeInclusive<i32> = 1..=5;

/// The cache namespaces a write can make stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Tool, category and translation writes.
    Catalog,
    /// Review writes change ratings on listings and tool pages only.
    Reviews,
}

impl InvalidationScope {
    pub fn namespaces(&self) -> &'static [Namespace] {
        match self {
            InvalidationScope::Catalog => &Namespace::ALL,
            InvalidationScope::Reviews => &[Namespace::Tools, Namespace::Tool],
        }
    }
}

impl fmt::Display for InvalidationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationScope::Catalog => f.write_str("catalog"),
            InvalidationScope::Reviews => f.write_str("reviews"),
        }
    }
}

impl Catalog {
    /// Drops every distributed-cache key in `scope` and clears the memo tier.
    /// Returns how many keys were deleted.
    pub async fn invalidate(&self, scope: InvalidationScope) -> u64 {
        let mut deleted = 0;
        for namespace in scope.namespaces() {
            let count = self.cache.delete_by_pattern(&namespace.pattern()).await;
            metrics::counter!(
                CACHE_INVALIDATED_KEYS_COUNTER,
                "namespace" => namespace.prefix()
            )
            .increment(count);
            deleted += count;
        }
        self.memo.clear();

        tracing::info!(%scope, deleted, "invalidated catalog cache");
        deleted
    }

    /// Creates a tool and returns it in the fallback language.
    pub async fn create_tool(&self, tool: &NewTool, owner_id: i64) -> Result<Tool, CatalogError> {
        if tool.translations.is_empty() {
            return Err(CatalogError::BadRequest(
                "a tool needs at least one translation".to_string(),
            ));
        }
        for translation in &tool.translations {
            validate_language(&translation.language_code)?;
        }

        let record = self.store.insert_tool(tool, owner_id).await?;
        self.invalidate(InvalidationScope::Catalog).await;

        Ok(localize_tool(&record, Language::FALLBACK))
    }

    pub async fn create_category(
        &self,
        category: &NewCategory,
    ) -> Result<CategoryRecord, CatalogError> {
        if category.translations.is_empty() {
            return Err(CatalogError::BadRequest(
                "a category needs at least one translation".to_string(),
            ));
        }
        for translation in &category.translations {
            validate_language(&translation.language_code)?;
        }

        let record = self.store.insert_category(category).await?;
        self.invalidate(InvalidationScope::Catalog).await;

        Ok(record)
    }

    /// Adds a review to the tool with `slug`; the tool's rating and review
    /// count are recomputed by the store.
    pub async fn create_review(
        &self,
        slug: &str,
        review: &NewReview,
        author_id: i64,
    ) -> Result<Review, CatalogError> {
        if !RATING_RANGE.contains(&review.rating) {
            return Err(CatalogError::BadRequest(format!(
                "rating must be between {} and {}",
                RATING_RANGE.start(),
                RATING_RANGE.end()
            )));
        }

        let record = self.store.insert_review(slug, review, author_id).await?;
        self.invalidate(InvalidationScope::Reviews).await;

        Ok(localize_review(&record))
    }

    pub async fn update_tool_translation(
        &self,
        slug: &str,
        translation: &NewToolTranslation,
    ) -> Result<(), CatalogError> {
        validate_language(&translation.language_code)?;
        if translation.name.trim().is_empty() {
            return Err(CatalogError::BadRequest(
                "translation name cannot be empty".to_string(),
            ));
        }

        self.store.upsert_tool_translation(slug, translation).await?;
        self.invalidate(InvalidationScope::Catalog).await;

        Ok(())
    }
}

fn validate_language(code: &str) -> Result<Language, CatalogError> {
    Language::from_code(code)
        .ok_or_else(|| CatalogError::BadRequest(format!("unsupported language {code:?}")))
}
