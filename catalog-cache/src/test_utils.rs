use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_redis::MockRedisClient;

use crate::cache::{DistributedCache, MemoTier};
use crate::catalog::{CacheTtls, Catalog};
use crate::errors::CatalogError;
use crate::models::{
    Author, CategoryRecord, CategoryTranslation, Language, NewCategory, NewReview, NewTool,
    NewToolTranslation, PricingModel, ReviewRecord, ToolFilter, ToolRecord, ToolSort,
    ToolTranslation,
};
use crate::store::{primary_name, slugify, unique_slug, CatalogStore};

const BASE_TIMESTAMP: i64 = 1_704_067_200;

fn timestamp(offset_secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_TIMESTAMP + offset_secs, 0).unwrap_or_default()
}

/// A tool with fixed, predictable fields. `created_at` grows with `id`, so
/// higher ids are newer.
pub fn tool_record(id: i64, slug: &str, names: &[(&str, &str)]) -> ToolRecord {
    ToolRecord {
        id,
        slug: slug.to_string(),
        url: Some(format!("https://{slug}.example.com")),
        icon_url: None,
        is_featured: false,
        created_at: timestamp(id),
        average_rating: Some(0.0),
        review_count: Some(0),
        pricing_model: PricingModel::Free,
        platforms: Some("web".to_string()),
        owner_id: 1,
        category: None,
        translations: names
            .iter()
            .map(|(lang, name)| ToolTranslation {
                language_code: lang.to_string(),
                name: name.to_string(),
                description: Some(format!("{name} description")),
                short_description: None,
            })
            .collect(),
        reviews: vec![],
    }
}

pub fn category_record(id: i64, slug: &str, names: &[(&str, &str)]) -> CategoryRecord {
    CategoryRecord {
        id,
        slug: slug.to_string(),
        translations: names
            .iter()
            .map(|(lang, name)| CategoryTranslation {
                language_code: lang.to_string(),
                name: name.to_string(),
            })
            .collect(),
    }
}

pub fn new_tool(category_id: i64, names: &[(&str, &str)]) -> NewTool {
    NewTool {
        url: None,
        icon_url: None,
        is_featured: false,
        category_id,
        translations: names
            .iter()
            .map(|(lang, name)| NewToolTranslation {
                language_code: lang.to_string(),
                name: name.to_string(),
                description: None,
                short_description: None,
            })
            .collect(),
        pricing_model: PricingModel::Free,
        platforms: Some(vec!["web".to_string()]),
    }
}

/// A catalog over `store`, backed by `redis` when given and by a disabled
/// distributed cache otherwise.
pub fn catalog_with(store: Arc<InMemoryStore>, redis: Option<MockRedisClient>) -> Catalog {
    let cache = match redis {
        Some(mock) => DistributedCache::with_client(Arc::new(mock), Duration::from_secs(300)),
        None => DistributedCache::disabled(),
    };

    Catalog::new(
        store,
        Arc::new(cache),
        MemoTier::new(128, Duration::from_secs(60)),
        CacheTtls::default(),
    )
}

#[derive(Default)]
struct StoreState {
    tools: Vec<ToolRecord>,
    categories: Vec<CategoryRecord>,
    next_review_id: i64,
    calls: HashMap<&'static str, usize>,
}

/// A [`CatalogStore`] kept in memory that counts calls per operation.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(self, tools: Vec<ToolRecord>) -> Self {
        self.lock().tools = tools;
        self
    }

    pub fn with_categories(self, categories: Vec<CategoryRecord>) -> Self {
        self.lock().categories = categories;
        self
    }

    /// Makes every later call fail as if the database were down.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, operation: &'static str) -> Result<MutexGuard<'_, StoreState>, CatalogError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::DatabaseUnavailable);
        }
        Ok(state)
    }
}

fn matches_filter(tool: &ToolRecord, lang: Language, filter: &ToolFilter) -> bool {
    if let Some(category_id) = filter.category_id {
        if tool.category.as_ref().map(|c| c.id) != Some(category_id) {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let found = tool
            .translations
            .iter()
            .filter(|t| t.language_code == lang.code())
            .any(|t| {
                t.name.to_lowercase().contains(&needle)
                    || t
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            });
        if !found {
            return false;
        }
    }
    if let Some(featured) = filter.featured {
        if tool.is_featured != featured {
            return false;
        }
    }
    if let Some(pricing_model) = filter.pricing_model {
        if tool.pricing_model != pricing_model {
            return false;
        }
    }
    if let Some(platform) = &filter.platform {
        let platform = platform.to_lowercase();
        if !tool
            .platforms
            .as_deref()
            .is_some_and(|p| p.to_lowercase().contains(&platform))
        {
            return false;
        }
    }
    true
}

fn sort_tools(tools: &mut [ToolRecord], sort: Option<ToolSort>) {
    match sort {
        Some(ToolSort::Rating) => tools.sort_by(|a, b| {
            b.average_rating
                .unwrap_or(0.0)
                .total_cmp(&a.average_rating.unwrap_or(0.0))
                .then(b.id.cmp(&a.id))
        }),
        Some(ToolSort::ReviewCount) => {
            tools.sort_by(|a, b| b.review_count.cmp(&a.review_count).then(b.id.cmp(&a.id)))
        }
        Some(ToolSort::CreatedAt) | None => {
            tools.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
        }
    }
}

fn page<T>(items: Vec<T>, skip: u64, limit: u64) -> Vec<T> {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(limit).collect()
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn fetch_tools(
        &self,
        lang: Language,
        filter: &ToolFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<ToolRecord>, CatalogError> {
        let state = self.enter("fetch_tools")?;
        let mut tools: Vec<ToolRecord> = state
            .tools
            .iter()
            .filter(|t| matches_filter(t, lang, filter))
            .cloned()
            .collect();
        sort_tools(&mut tools, filter.sort);
        Ok(page(tools, skip, limit))
    }

    async fn count_tools(&self, lang: Language, filter: &ToolFilter) -> Result<i64, CatalogError> {
        let state = self.enter("count_tools")?;
        let count = state
            .tools
            .iter()
            .filter(|t| matches_filter(t, lang, filter))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn fetch_tool_by_slug(&self, slug: &str) -> Result<Option<ToolRecord>, CatalogError> {
        let state = self.enter("fetch_tool_by_slug")?;
        Ok(state.tools.iter().find(|t| t.slug == slug).cloned())
    }

    async fn fetch_featured_tools(&self, limit: u64) -> Result<Vec<ToolRecord>, CatalogError> {
        let state = self.enter("fetch_featured_tools")?;
        let mut tools: Vec<ToolRecord> =
            state.tools.iter().filter(|t| t.is_featured).cloned().collect();
        tools.sort_by_key(|t| t.id);
        Ok(page(tools, 0, limit))
    }

    async fn fetch_latest_tools(&self, limit: u64) -> Result<Vec<ToolRecord>, CatalogError> {
        let state = self.enter("fetch_latest_tools")?;
        let mut tools = state.tools.clone();
        sort_tools(&mut tools, None);
        Ok(page(tools, 0, limit))
    }

    async fn fetch_tools_by_owner(&self, owner_id: i64) -> Result<Vec<ToolRecord>, CatalogError> {
        let state = self.enter("fetch_tools_by_owner")?;
        let mut tools: Vec<ToolRecord> = state
            .tools
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        sort_tools(&mut tools, None);
        Ok(tools)
    }

    async fn fetch_categories(
        &self,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<CategoryRecord>, CatalogError> {
        let state = self.enter("fetch_categories")?;
        let mut categories = state.categories.clone();
        categories.sort_by_key(|c| c.id);
        Ok(page(categories, skip, limit))
    }

    async fn fetch_reviews(
        &self,
        slug: &str,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<ReviewRecord>, CatalogError> {
        let state = self.enter("fetch_reviews")?;
        let reviews = state
            .tools
            .iter()
            .find(|t| t.slug == slug)
            .map(|t| t.reviews.clone())
            .unwrap_or_default();
        Ok(page(reviews, skip, limit))
    }

    async fn insert_tool(&self, tool: &NewTool, owner_id: i64) -> Result<ToolRecord, CatalogError> {
        let mut state = self.enter("insert_tool")?;

        let name = primary_name(
            &tool.translations,
            |t| t.language_code.as_str(),
            |t| t.name.as_str(),
        )
        .ok_or_else(|| CatalogError::BadRequest("a tool needs at least one translation".into()))?;
        let base = slugify(name);
        let category = state
            .categories
            .iter()
            .find(|c| c.id == tool.category_id)
            .cloned()
            .ok_or(CatalogError::CategoryNotFound(tool.category_id))?;

        let slug = unique_slug(&base, |candidate| {
            state.tools.iter().any(|t| t.slug == candidate)
        });
        let id = state.tools.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let created_at = state
            .tools
            .iter()
            .map(|t| t.created_at)
            .max()
            .map_or_else(|| timestamp(id), |latest| latest + chrono::Duration::seconds(1));

        let record = ToolRecord {
            id,
            slug,
            url: tool.url.clone(),
            icon_url: tool.icon_url.clone(),
            is_featured: tool.is_featured,
            created_at,
            average_rating: Some(0.0),
            review_count: Some(0),
            pricing_model: tool.pricing_model,
            platforms: tool.platforms.as_ref().map(|p| p.join(",")),
            owner_id,
            category: Some(category),
            translations: tool
                .translations
                .iter()
                .filter(|t| !t.name.is_empty())
                .map(|t| ToolTranslation {
                    language_code: t.language_code.clone(),
                    name: t.name.clone(),
                    description: t.description.clone(),
                    short_description: t.short_description.clone(),
                })
                .collect(),
            reviews: vec![],
        };
        state.tools.push(record.clone());
        Ok(record)
    }

    async fn insert_category(&self, category: &NewCategory) -> Result<CategoryRecord, CatalogError> {
        let mut state = self.enter("insert_category")?;

        let name = primary_name(
            &category.translations,
            |t| t.language_code.as_str(),
            |t| t.name.as_str(),
        )
        .ok_or_else(|| {
            CatalogError::BadRequest("a category needs at least one translation".into())
        })?;
        let base = slugify(name);
        let slug = unique_slug(&base, |candidate| {
            state.categories.iter().any(|c| c.slug == candidate)
        });
        let id = state.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1;

        let record = CategoryRecord {
            id,
            slug,
            translations: category
                .translations
                .iter()
                .map(|t| CategoryTranslation {
                    language_code: t.language_code.clone(),
                    name: t.name.clone(),
                })
                .collect(),
        };
        state.categories.push(record.clone());
        Ok(record)
    }

    async fn insert_review(
        &self,
        slug: &str,
        review: &NewReview,
        author_id: i64,
    ) -> Result<ReviewRecord, CatalogError> {
        let mut state = self.enter("insert_review")?;
        state.next_review_id += 1;
        let review_id = state.next_review_id;

        let tool = state
            .tools
            .iter_mut()
            .find(|t| t.slug == slug)
            .ok_or_else(|| CatalogError::ToolNotFound(slug.to_string()))?;

        let record = ReviewRecord {
            id: review_id,
            tool_id: tool.id,
            text: review.text.clone(),
            rating: review.rating,
            created_at: timestamp(1_000 + review_id),
            author: Author {
                id: author_id,
                email: format!("user{author_id}@example.com"),
            },
        };
        tool.reviews.insert(0, record.clone());

        let count = tool.reviews.len();
        let sum: i64 = tool.reviews.iter().map(|r| i64::from(r.rating)).sum();
        tool.review_count = Some(i64::try_from(count).unwrap_or(i64::MAX));
        tool.average_rating = Some(sum as f64 / count as f64);

        Ok(record)
    }

    async fn upsert_tool_translation(
        &self,
        slug: &str,
        translation: &NewToolTranslation,
    ) -> Result<(), CatalogError> {
        let mut state = self.enter("upsert_tool_translation")?;
        let tool = state
            .tools
            .iter_mut()
            .find(|t| t.slug == slug)
            .ok_or_else(|| CatalogError::ToolNotFound(slug.to_string()))?;

        let updated = ToolTranslation {
            language_code: translation.language_code.clone(),
            name: translation.name.clone(),
            description: translation.description.clone(),
            short_description: translation.short_description.clone(),
        };
        match tool
            .translations
            .iter_mut()
            .find(|t| t.language_code == translation.language_code)
        {
            Some(existing) => *existing = updated,
            None => tool.translations.push(updated),
        }
        Ok(())
    }
}
