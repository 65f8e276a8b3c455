use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
    Uk,
}

impl Language {
    /// Language used when a record has no translation in the requested one.
    pub const FALLBACK: Language = Language::Ru;

    pub fn code(&self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
            Language::Uk => "uk",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        match code.trim().to_ascii_lowercase().as_str() {
            "ru" => Some(Language::Ru),
            "en" => Some(Language::En),
            "uk" => Some(Language::Uk),
            _ => None,
        }
    }

    /// Picks the language from an `Accept-Language` header.
    ///
    /// Only the first tag is considered, and only its primary subtag
    /// (`en-US,en;q=0.9` -> `en`). Anything unsupported falls back to Russian.
    pub fn from_accept_language(header: Option<&str>) -> Language {
        header
            .and_then(|value| value.split(',').next())
            .and_then(|tag| tag.split(';').next())
            .and_then(|tag| tag.split('-').next())
            .and_then(Language::from_code)
            .unwrap_or_default()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingModel {
    Free,
    Freemium,
    Paid,
    Trial,
}

impl PricingModel {
    /// Label stored in the `pricingmodel` column type.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PricingModel::Free => "FREE",
            PricingModel::Freemium => "FREEMIUM",
            PricingModel::Paid => "PAID",
            PricingModel::Trial => "TRIAL",
        }
    }

    pub fn from_db_str(value: &str) -> Option<PricingModel> {
        match value.to_ascii_uppercase().as_str() {
            "FREE" => Some(PricingModel::Free),
            "FREEMIUM" => Some(PricingModel::Freemium),
            "PAID" => Some(PricingModel::Paid),
            "TRIAL" => Some(PricingModel::Trial),
            _ => None,
        }
    }
}

// Raw records, as the data store returns them

#[derive(Debug, Clone, PartialEq)]
pub struct ToolTranslation {
    pub language_code: String,
    pub name: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTranslation {
    pub language_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRecord {
    pub id: i64,
    pub slug: String,
    pub translations: Vec<CategoryTranslation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub id: i64,
    pub tool_id: i64,
    pub text: Option<String>,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
    pub author: Author,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub id: i64,
    pub slug: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub average_rating: Option<f64>,
    pub review_count: Option<i64>,
    pub pricing_model: PricingModel,
    /// Comma-separated, as stored.
    pub platforms: Option<String>,
    pub owner_id: i64,
    pub category: Option<CategoryRecord>,
    pub translations: Vec<ToolTranslation>,
    pub reviews: Vec<ReviewRecord>,
}

// Projections handed to callers. These are also the cached payloads, so a
// value read back from the cache is indistinguishable from a fresh one.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub rating: i32,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author: Author,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: i64,
    pub slug: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category: Option<Category>,
    pub average_rating: f64,
    pub review_count: i64,
    pub pricing_model: PricingModel,
    pub platforms: Vec<String>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPage {
    pub items: Vec<Tool>,
    pub total: i64,
}

// Inputs for the write path

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewToolTranslation {
    pub language_code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTool {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    pub category_id: i64,
    pub translations: Vec<NewToolTranslation>,
    pub pricing_model: PricingModel,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategoryTranslation {
    pub language_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub translations: Vec<NewCategoryTranslation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub rating: i32,
    #[serde(default)]
    pub text: Option<String>,
}

// Listing queries

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSort {
    Rating,
    ReviewCount,
    CreatedAt,
}

impl ToolSort {
    /// Unknown values are ignored, which leaves the default (newest first).
    pub fn parse(value: &str) -> Option<ToolSort> {
        match value {
            "rating" => Some(ToolSort::Rating),
            "review_count" => Some(ToolSort::ReviewCount),
            "created_at" => Some(ToolSort::CreatedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ToolFilter {
    pub category_id: Option<i64>,
    /// Free-text search over the name and description in the query language.
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub pricing_model: Option<PricingModel>,
    pub platform: Option<String>,
    pub sort: Option<ToolSort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolQuery {
    pub lang: Language,
    pub filter: ToolFilter,
    pub skip: u64,
    pub limit: u64,
}

impl ToolQuery {
    pub fn page(lang: Language, skip: u64, limit: u64) -> Self {
        Self {
            lang,
            filter: ToolFilter::default(),
            skip,
            limit,
        }
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.filter.category_id = Some(category_id);
        self
    }

    pub fn with_filter(mut self, filter: ToolFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Only the language, category and page may vary for a listing to be cached.
    ///
    /// Any other dimension (search, featured flag, pricing, platform, explicit
    /// sort) sends the query straight to the data store.
    pub fn is_cacheable(&self) -> bool {
        let ToolFilter {
            category_id: _,
            search,
            featured,
            pricing_model,
            platform,
            sort,
        } = &self.filter;

        search.is_none()
            && featured.is_none()
            && pricing_model.is_none()
            && platform.is_none()
            && sort.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, Language::Ru)]
    #[case(Some("en"), Language::En)]
    #[case(Some("en-US,en;q=0.9"), Language::En)]
    #[case(Some("UK-ua"), Language::Uk)]
    #[case(Some("de-DE,en;q=0.5"), Language::Ru)]
    #[case(Some(""), Language::Ru)]
    #[case(Some("en;q=0.8"), Language::En)]
    fn test_language_from_accept_language(
        #[case] header: Option<&str>,
        #[case] expected: Language,
    ) {
        assert_eq!(Language::from_accept_language(header), expected);
    }

    #[test]
    fn test_pricing_model_db_labels_round_trip() {
        for model in [
            PricingModel::Free,
            PricingModel::Freemium,
            PricingModel::Paid,
            PricingModel::Trial,
        ] {
            assert_eq!(PricingModel::from_db_str(model.as_db_str()), Some(model));
        }
        assert_eq!(PricingModel::from_db_str("free"), Some(PricingModel::Free));
        assert_eq!(PricingModel::from_db_str("lifetime"), None);
    }

    #[test]
    fn test_only_plain_pages_are_cacheable() {
        let plain = ToolQuery::page(Language::Ru, 0, 12);
        assert!(plain.is_cacheable());
        assert!(plain.clone().with_category(3).is_cacheable());

        let filters = [
            ToolFilter {
                search: Some("gpt".to_string()),
                ..Default::default()
            },
            ToolFilter {
                featured: Some(true),
                ..Default::default()
            },
            ToolFilter {
                pricing_model: Some(PricingModel::Paid),
                ..Default::default()
            },
            ToolFilter {
                platform: Some("ios".to_string()),
                ..Default::default()
            },
            ToolFilter {
                sort: Some(ToolSort::Rating),
                ..Default::default()
            },
        ];
        for filter in filters {
            assert!(!plain.clone().with_filter(filter).is_cacheable());
        }
    }

    #[test]
    fn test_tool_sort_parse() {
        assert_eq!(ToolSort::parse("rating"), Some(ToolSort::Rating));
        assert_eq!(ToolSort::parse("review_count"), Some(ToolSort::ReviewCount));
        assert_eq!(ToolSort::parse("created_at"), Some(ToolSort::CreatedAt));
        assert_eq!(ToolSort::parse("popularity"), None);
    }
}
