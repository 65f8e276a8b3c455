use async_trait::async_trait;

use crate::errors::CatalogError;
use crate::models::{
    CategoryRecord, Language, NewCategory, NewReview, NewTool, NewToolTranslation, ReviewRecord,
    ToolFilter, ToolRecord,
};

pub mod postgres;

pub use postgres::PgCatalogStore;

/// The relational source of truth behind the caches.
///
/// Tool records come back fully loaded: translations, category (with its
/// translations) and reviews (with their authors).
#[async_trait]
pub trait CatalogStore {
    /// One page of tools matching `filter`. `lang` scopes free-text search.
    async fn fetch_tools(
        &self,
        lang: Language,
        filter: &ToolFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<ToolRecord>, CatalogError>;

    async fn count_tools(&self, lang: Language, filter: &ToolFilter) -> Result<i64, CatalogError>;

    async fn fetch_tool_by_slug(&self, slug: &str) -> Result<Option<ToolRecord>, CatalogError>;

    /// Featured tools, in insertion order.
    async fn fetch_featured_tools(&self, limit: u64) -> Result<Vec<ToolRecord>, CatalogError>;

    /// Newest tools first.
    async fn fetch_latest_tools(&self, limit: u64) -> Result<Vec<ToolRecord>, CatalogError>;

    async fn fetch_tools_by_owner(&self, owner_id: i64) -> Result<Vec<ToolRecord>, CatalogError>;

    async fn fetch_categories(
        &self,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<CategoryRecord>, CatalogError>;

    /// Reviews of the tool with `slug`, newest first. Empty when the tool doesn't exist.
    async fn fetch_reviews(
        &self,
        slug: &str,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<ReviewRecord>, CatalogError>;

    /// Inserts a tool under a unique slug derived from its primary name.
    async fn insert_tool(&self, tool: &NewTool, owner_id: i64)
        -> Result<ToolRecord, CatalogError>;

    async fn insert_category(&self, category: &NewCategory)
        -> Result<CategoryRecord, CatalogError>;

    /// Inserts a review and recomputes the tool's average rating and review count.
    async fn insert_review(
        &self,
        slug: &str,
        review: &NewReview,
        author_id: i64,
    ) -> Result<ReviewRecord, CatalogError>;

    async fn upsert_tool_translation(
        &self,
        slug: &str,
        translation: &NewToolTranslation,
    ) -> Result<(), CatalogError>;
}

/// The name a new record's slug is derived from: the first named translation
/// in the fallback language, else the first translation.
pub fn primary_name<'a, T>(
    translations: &'a [T],
    language_code: impl Fn(&T) -> &str,
    name: impl Fn(&T) -> &str,
) -> Option<&'a str> {
    translations
        .iter()
        .find(|t| language_code(t) == Language::FALLBACK.code() && !name(t).is_empty())
        .or_else(|| translations.first())
        .map(|t| name(t))
}

/// URL slug of a display name. Cyrillic is transliterated; anything else
/// that isn't alphanumeric becomes a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let piece = if c.is_ascii_alphanumeric() {
            Some(c.to_string())
        } else {
            transliterate(c).map(str::to_string)
        };

        match piece {
            Some(piece) => slug.push_str(&piece),
            None if !slug.is_empty() && !slug.ends_with('-') => slug.push('-'),
            None => {}
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// First slug in `base`, `base-1`, `base-2`, ... for which `taken` is false.
pub fn unique_slug(base: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = base.to_string();
    let mut counter = 1;
    while taken(&candidate) {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }
    candidate
}

fn transliterate(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'ґ' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "e",
        'є' => "ie",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'і' => "i",
        'ї' => "i",
        'й' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "iu",
        'я' => "ia",
        _ => return None,
    };
    Some(latin)
}
