use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};

use crate::errors::CatalogError;
use crate::models::{
    Author, CategoryRecord, CategoryTranslation, Language, NewCategory, NewReview, NewTool,
    NewToolTranslation, PricingModel, ReviewRecord, ToolFilter, ToolRecord, ToolSort,
    ToolTranslation,
};
use crate::store::{primary_name, slugify, unique_slug, CatalogStore};

const TOOL_COLUMNS: &str = "
    t.id,
    t.slug,
    t.url,
    t.icon_url,
    t.is_featured,
    t.created_at,
    t.average_rating,
    t.review_count,
    t.pricing_model::text AS pricing_model,
    t.platforms,
    t.category_id,
    t.owner_id
";

const REVIEW_COLUMNS: &str = "
    r.id,
    r.tool_id,
    r.text,
    r.rating,
    r.created_at,
    u.id AS author_id,
    u.email AS author_email
";

#[derive(Debug, FromRow)]
struct ToolRow {
    id: i32,
    slug: String,
    url: Option<String>,
    icon_url: Option<String>,
    is_featured: bool,
    created_at: DateTime<Utc>,
    average_rating: Option<f64>,
    review_count: Option<i32>,
    pricing_model: String,
    platforms: Option<String>,
    category_id: Option<i32>,
    owner_id: Option<i32>,
}

#[derive(Debug, FromRow)]
struct ToolTranslationRow {
    tool_id: i32,
    language_code: String,
    name: Option<String>,
    description: Option<String>,
    short_description: Option<String>,
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: i32,
    slug: String,
}

#[derive(Debug, FromRow)]
struct CategoryTranslationRow {
    category_id: i32,
    language_code: String,
    name: Option<String>,
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: i32,
    tool_id: i32,
    text: Option<String>,
    rating: i32,
    created_at: DateTime<Utc>,
    author_id: i32,
    author_email: Option<String>,
}

impl From<ReviewRow> for ReviewRecord {
    fn from(row: ReviewRow) -> Self {
        ReviewRecord {
            id: row.id.into(),
            tool_id: row.tool_id.into(),
            text: row.text,
            rating: row.rating,
            created_at: row.created_at,
            author: Author {
                id: row.author_id.into(),
                email: row.author_email.unwrap_or_default(),
            },
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_tool_filter(qb: &mut QueryBuilder<'_, Postgres>, lang: Language, filter: &ToolFilter) {
    qb.push(" WHERE TRUE");

    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(
            " AND EXISTS (SELECT 1 FROM tool_translations tt WHERE tt.tool_id = t.id AND tt.language_code = ",
        )
        .push_bind(lang.code())
        .push(" AND (tt.name ILIKE ")
        .push_bind(pattern.clone())
        .push(" OR tt.description ILIKE ")
        .push_bind(pattern)
        .push("))");
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND t.category_id = ").push_bind(category_id);
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND t.is_featured = ").push_bind(featured);
    }
    if let Some(pricing_model) = filter.pricing_model {
        qb.push(" AND t.pricing_model = ")
            .push_bind(pricing_model.as_db_str())
            .push("::pricingmodel");
    }
    if let Some(platform) = &filter.platform {
        qb.push(" AND t.platforms ILIKE ")
            .push_bind(format!("%{}%", escape_like(platform)));
    }
}

fn order_clause(sort: Option<ToolSort>) -> &'static str {
    match sort {
        Some(ToolSort::Rating) => " ORDER BY t.average_rating DESC NULLS LAST, t.id DESC",
        Some(ToolSort::ReviewCount) => " ORDER BY t.review_count DESC NULLS LAST, t.id DESC",
        Some(ToolSort::CreatedAt) | None => " ORDER BY t.created_at DESC, t.id DESC",
    }
}

pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .test_before_acquire(true)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    async fn fetch_tool_rows(
        &self,
        qb: &mut QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<ToolRecord>, CatalogError> {
        let rows: Vec<ToolRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.load_tools(rows).await
    }

    /// Attaches translations, categories and reviews to tool rows, keeping their order.
    async fn load_tools(&self, rows: Vec<ToolRow>) -> Result<Vec<ToolRecord>, CatalogError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let tool_ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let mut category_ids: Vec<i32> = rows.iter().filter_map(|row| row.category_id).collect();
        category_ids.sort_unstable();
        category_ids.dedup();

        let mut translations = self.load_tool_translations(&tool_ids).await?;
        let categories = self.load_categories(&category_ids).await?;
        let mut reviews = self.load_reviews(&tool_ids).await?;

        let records = rows
            .into_iter()
            .map(|row| -> Result<ToolRecord, CatalogError> {
                let pricing_model = PricingModel::from_db_str(&row.pricing_model).ok_or_else(|| {
                    CatalogError::Internal(format!(
                        "unknown pricing model {} on tool {}",
                        row.pricing_model, row.id
                    ))
                })?;

                Ok(ToolRecord {
                    id: row.id.into(),
                    slug: row.slug,
                    url: row.url,
                    icon_url: row.icon_url,
                    is_featured: row.is_featured,
                    created_at: row.created_at,
                    average_rating: row.average_rating,
                    review_count: row.review_count.map(i64::from),
                    pricing_model,
                    platforms: row.platforms,
                    owner_id: row.owner_id.map(i64::from).unwrap_or_default(),
                    category: row
                        .category_id
                        .and_then(|id| categories.get(&id).cloned()),
                    translations: translations.remove(&row.id).unwrap_or_default(),
                    reviews: reviews.remove(&row.id).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    async fn load_tool_translations(
        &self,
        tool_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<ToolTranslation>>, CatalogError> {
        let rows: Vec<ToolTranslationRow> = sqlx::query_as(
            "SELECT tool_id, language_code, name, description, short_description
             FROM tool_translations
             WHERE tool_id = ANY($1)
             ORDER BY id",
        )
        .bind(tool_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_tool: HashMap<i32, Vec<ToolTranslation>> = HashMap::new();
        for row in rows {
            by_tool.entry(row.tool_id).or_default().push(ToolTranslation {
                language_code: row.language_code,
                name: row.name.unwrap_or_default(),
                description: row.description,
                short_description: row.short_description,
            });
        }
        Ok(by_tool)
    }

    async fn load_categories(
        &self,
        category_ids: &[i32],
    ) -> Result<HashMap<i32, CategoryRecord>, CatalogError> {
        if category_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<CategoryRow> =
            sqlx::query_as("SELECT id, slug FROM categories WHERE id = ANY($1)")
                .bind(category_ids)
                .fetch_all(&self.pool)
                .await?;

        let mut translations = self.load_category_translations(category_ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let record = CategoryRecord {
                    id: row.id.into(),
                    slug: row.slug,
                    translations: translations.remove(&row.id).unwrap_or_default(),
                };
                (row.id, record)
            })
            .collect())
    }

    async fn load_category_translations(
        &self,
        category_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<CategoryTranslation>>, CatalogError> {
        let rows: Vec<CategoryTranslationRow> = sqlx::query_as(
            "SELECT category_id, language_code, name
             FROM category_translations
             WHERE category_id = ANY($1)
             ORDER BY id",
        )
        .bind(category_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_category: HashMap<i32, Vec<CategoryTranslation>> = HashMap::new();
        for row in rows {
            by_category
                .entry(row.category_id)
                .or_default()
                .push(CategoryTranslation {
                    language_code: row.language_code,
                    name: row.name.unwrap_or_default(),
                });
        }
        Ok(by_category)
    }

    async fn load_reviews(
        &self,
        tool_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<ReviewRecord>>, CatalogError> {
        let query = format!(
            "SELECT {REVIEW_COLUMNS}
             FROM reviews r
             JOIN users u ON u.id = r.author_id
             WHERE r.tool_id = ANY($1)
             ORDER BY r.created_at DESC, r.id DESC"
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&query)
            .bind(tool_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_tool: HashMap<i32, Vec<ReviewRecord>> = HashMap::new();
        for row in rows {
            by_tool.entry(row.tool_id).or_default().push(row.into());
        }
        Ok(by_tool)
    }

    async fn tool_id_by_slug(
        tx: &mut Transaction<'_, Postgres>,
        slug: &str,
    ) -> Result<i32, CatalogError> {
        sqlx::query_scalar("SELECT id FROM tools WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CatalogError::ToolNotFound(slug.to_string()))
    }

    /// Slugs already taken by `table` that could collide with `base` or its `-N` variants.
    async fn taken_slugs(
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        base: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let query = format!("SELECT slug FROM {table} WHERE slug = $1 OR slug LIKE $2");
        let slugs = sqlx::query_scalar(&query)
            .bind(base)
            .bind(format!("{}-%", escape_like(base)))
            .fetch_all(&mut **tx)
            .await?;
        Ok(slugs)
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn fetch_tools(
        &self,
        lang: Language,
        filter: &ToolFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<ToolRecord>, CatalogError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {TOOL_COLUMNS} FROM tools t"));
        push_tool_filter(&mut qb, lang, filter);
        qb.push(order_clause(filter.sort))
            .push(" OFFSET ")
            .push_bind(to_i64(skip))
            .push(" LIMIT ")
            .push_bind(to_i64(limit));

        self.fetch_tool_rows(&mut qb).await
    }

    async fn count_tools(&self, lang: Language, filter: &ToolFilter) -> Result<i64, CatalogError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) FROM tools t");
        push_tool_filter(&mut qb, lang, filter);

        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total)
    }

    async fn fetch_tool_by_slug(&self, slug: &str) -> Result<Option<ToolRecord>, CatalogError> {
        let query = format!("SELECT {TOOL_COLUMNS} FROM tools t WHERE t.slug = $1");
        let row: Option<ToolRow> = sqlx::query_as(&query)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.load_tools(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn fetch_featured_tools(&self, limit: u64) -> Result<Vec<ToolRecord>, CatalogError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TOOL_COLUMNS} FROM tools t WHERE t.is_featured ORDER BY t.id LIMIT "
        ));
        qb.push_bind(to_i64(limit));

        self.fetch_tool_rows(&mut qb).await
    }

    async fn fetch_latest_tools(&self, limit: u64) -> Result<Vec<ToolRecord>, CatalogError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TOOL_COLUMNS} FROM tools t ORDER BY t.created_at DESC, t.id DESC LIMIT "
        ));
        qb.push_bind(to_i64(limit));

        self.fetch_tool_rows(&mut qb).await
    }

    async fn fetch_tools_by_owner(&self, owner_id: i64) -> Result<Vec<ToolRecord>, CatalogError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TOOL_COLUMNS} FROM tools t WHERE t.owner_id = "
        ));
        qb.push_bind(owner_id).push(" ORDER BY t.id");

        self.fetch_tool_rows(&mut qb).await
    }

    async fn fetch_categories(
        &self,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<CategoryRecord>, CatalogError> {
        let rows: Vec<CategoryRow> =
            sqlx::query_as("SELECT id, slug FROM categories ORDER BY id OFFSET $1 LIMIT $2")
                .bind(to_i64(skip))
                .bind(to_i64(limit))
                .fetch_all(&self.pool)
                .await?;

        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let mut by_id = self.load_categories(&ids).await?;

        Ok(rows
            .iter()
            .filter_map(|row| by_id.remove(&row.id))
            .collect())
    }

    async fn fetch_reviews(
        &self,
        slug: &str,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<ReviewRecord>, CatalogError> {
        let query = format!(
            "SELECT {REVIEW_COLUMNS}
             FROM reviews r
             JOIN tools t ON t.id = r.tool_id
             JOIN users u ON u.id = r.author_id
             WHERE t.slug = $1
             ORDER BY r.created_at DESC, r.id DESC
             OFFSET $2 LIMIT $3"
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&query)
            .bind(slug)
            .bind(to_i64(skip))
            .bind(to_i64(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ReviewRecord::from).collect())
    }

    async fn insert_tool(&self, tool: &NewTool, owner_id: i64) -> Result<ToolRecord, CatalogError> {
        let name = primary_name(
            &tool.translations,
            |t| t.language_code.as_str(),
            |t| t.name.as_str(),
        )
        .ok_or_else(|| CatalogError::BadRequest("a tool needs at least one translation".into()))?;
        let base = slugify(name);
        if base.is_empty() {
            return Err(CatalogError::BadRequest(format!(
                "cannot derive a slug from {name:?}"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let category_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(tool.category_id)
                .fetch_one(&mut *tx)
                .await?;
        if !category_exists {
            return Err(CatalogError::CategoryNotFound(tool.category_id));
        }

        let taken = Self::taken_slugs(&mut tx, "tools", &base).await?;
        let slug = unique_slug(&base, |candidate| taken.iter().any(|s| s == candidate));

        let platforms = tool.platforms.as_ref().map(|platforms| platforms.join(","));
        let tool_id: i32 = sqlx::query_scalar(
            "INSERT INTO tools
                (slug, url, icon_url, is_featured, pricing_model, platforms, category_id, owner_id,
                 average_rating, review_count, created_at)
             VALUES ($1, $2, $3, $4, $5::pricingmodel, $6, $7, $8, 0, 0, now())
             RETURNING id",
        )
        .bind(&slug)
        .bind(&tool.url)
        .bind(&tool.icon_url)
        .bind(tool.is_featured)
        .bind(tool.pricing_model.as_db_str())
        .bind(platforms)
        .bind(tool.category_id)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        for translation in tool.translations.iter().filter(|t| !t.name.is_empty()) {
            sqlx::query(
                "INSERT INTO tool_translations
                    (tool_id, language_code, name, description, short_description, created_at)
                 VALUES ($1, $2, $3, $4, $5, now())",
            )
            .bind(tool_id)
            .bind(&translation.language_code)
            .bind(&translation.name)
            .bind(&translation.description)
            .bind(&translation.short_description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.fetch_tool_by_slug(&slug)
            .await?
            .ok_or_else(|| CatalogError::Internal(format!("tool {slug} missing after insert")))
    }

    async fn insert_category(&self, category: &NewCategory) -> Result<CategoryRecord, CatalogError> {
        let name = primary_name(
            &category.translations,
            |t| t.language_code.as_str(),
            |t| t.name.as_str(),
        )
        .ok_or_else(|| {
            CatalogError::BadRequest("a category needs at least one translation".into())
        })?;
        let base = slugify(name);
        if base.is_empty() {
            return Err(CatalogError::BadRequest(format!(
                "cannot derive a slug from {name:?}"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let taken = Self::taken_slugs(&mut tx, "categories", &base).await?;
        let slug = unique_slug(&base, |candidate| taken.iter().any(|s| s == candidate));

        let category_id: i32 =
            sqlx::query_scalar("INSERT INTO categories (slug) VALUES ($1) RETURNING id")
                .bind(&slug)
                .fetch_one(&mut *tx)
                .await?;

        let mut translations = Vec::with_capacity(category.translations.len());
        for translation in &category.translations {
            sqlx::query(
                "INSERT INTO category_translations (category_id, language_code, name)
                 VALUES ($1, $2, $3)",
            )
            .bind(category_id)
            .bind(&translation.language_code)
            .bind(&translation.name)
            .execute(&mut *tx)
            .await?;

            translations.push(CategoryTranslation {
                language_code: translation.language_code.clone(),
                name: translation.name.clone(),
            });
        }

        tx.commit().await?;

        Ok(CategoryRecord {
            id: category_id.into(),
            slug,
            translations,
        })
    }

    async fn insert_review(
        &self,
        slug: &str,
        review: &NewReview,
        author_id: i64,
    ) -> Result<ReviewRecord, CatalogError> {
        let mut tx = self.pool.begin().await?;
        let tool_id = Self::tool_id_by_slug(&mut tx, slug).await?;

        let review_id: i32 = sqlx::query_scalar(
            "INSERT INTO reviews (text, rating, tool_id, author_id, created_at)
             VALUES ($1, $2, $3, $4, now())
             RETURNING id",
        )
        .bind(&review.text)
        .bind(review.rating)
        .bind(tool_id)
        .bind(author_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE tools SET
                average_rating = (SELECT COALESCE(AVG(rating), 0) FROM reviews WHERE tool_id = $1),
                review_count = (SELECT COUNT(*) FROM reviews WHERE tool_id = $1)
             WHERE id = $1",
        )
        .bind(tool_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "SELECT {REVIEW_COLUMNS}
             FROM reviews r
             JOIN users u ON u.id = r.author_id
             WHERE r.id = $1"
        );
        let row: ReviewRow = sqlx::query_as(&query)
            .bind(review_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn upsert_tool_translation(
        &self,
        slug: &str,
        translation: &NewToolTranslation,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        let tool_id = Self::tool_id_by_slug(&mut tx, slug).await?;

        let updated = sqlx::query(
            "UPDATE tool_translations
             SET name = $3, description = $4, short_description = $5
             WHERE tool_id = $1 AND language_code = $2",
        )
        .bind(tool_id)
        .bind(&translation.language_code)
        .bind(&translation.name)
        .bind(&translation.description)
        .bind(&translation.short_description)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                "INSERT INTO tool_translations
                    (tool_id, language_code, name, description, short_description, created_at)
                 VALUES ($1, $2, $3, $4, $5, now())",
            )
            .bind(tool_id)
            .bind(&translation.language_code)
            .bind(&translation.name)
            .bind(&translation.description)
            .bind(&translation.short_description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("gpt"), "gpt");
        assert_eq!(escape_like("100%_off\\"), "100\\%\\_off\\\\");
    }

    #[test]
    fn test_filters_render_expected_sql() {
        let filter = ToolFilter {
            category_id: Some(3),
            search: Some("gpt".to_string()),
            featured: Some(true),
            pricing_model: Some(PricingModel::Paid),
            platform: Some("ios".to_string()),
            sort: Some(ToolSort::Rating),
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) FROM tools t");
        push_tool_filter(&mut qb, Language::En, &filter);
        qb.push(order_clause(filter.sort));
        let sql = qb.sql();

        assert!(sql.contains("tt.language_code = $1"));
        assert!(sql.contains("tt.name ILIKE $2 OR tt.description ILIKE $3"));
        assert!(sql.contains("t.category_id = $4"));
        assert!(sql.contains("t.is_featured = $5"));
        assert!(sql.contains("t.pricing_model = $6::pricingmodel"));
        assert!(sql.contains("t.platforms ILIKE $7"));
        assert!(sql.ends_with("ORDER BY t.average_rating DESC NULLS LAST, t.id DESC"));
    }

    #[test]
    fn test_unfiltered_query_has_no_conditions() {
        let filter = ToolFilter::default();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT count(*) FROM tools t");
        push_tool_filter(&mut qb, Language::Ru, &filter);
        qb.push(order_clause(filter.sort));

        assert_eq!(
            qb.sql(),
            "SELECT count(*) FROM tools t WHERE TRUE ORDER BY t.created_at DESC, t.id DESC"
        );
    }
}
