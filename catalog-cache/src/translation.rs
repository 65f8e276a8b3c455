//! Localized projections of raw catalog records.
//!
//! Every record carries its translations; a projection picks the one in the
//! requested language, falling back to [`Language::FALLBACK`].

use crate::models::{
    Category, CategoryRecord, CategoryTranslation, Language, Review, ReviewRecord, Tool,
    ToolRecord, ToolTranslation,
};

pub const UNNAMED_CATEGORY: &str = "Unnamed Category";

fn pick<'a, T>(
    translations: &'a [T],
    lang: Language,
    language_code: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    translations
        .iter()
        .find(|t| language_code(t) == lang.code())
        .or_else(|| {
            translations
                .iter()
                .find(|t| language_code(t) == Language::FALLBACK.code())
        })
}

fn pick_tool_translation(translations: &[ToolTranslation], lang: Language) -> Option<&ToolTranslation> {
    pick(translations, lang, |t| t.language_code.as_str())
}

fn pick_category_translation(
    translations: &[CategoryTranslation],
    lang: Language,
) -> Option<&CategoryTranslation> {
    pick(translations, lang, |t| t.language_code.as_str())
}

/// Projects a category for listings. Categories with no usable translation
/// are dropped from listings, so this returns `None` for them.
pub fn localize_category(record: &CategoryRecord, lang: Language) -> Option<Category> {
    pick_category_translation(&record.translations, lang).map(|t| Category {
        id: record.id,
        name: t.name.clone(),
    })
}

/// Projects the category embedded in a tool, which always gets a name.
fn localize_tool_category(record: &CategoryRecord, lang: Language) -> Category {
    let name = pick_category_translation(&record.translations, lang)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| UNNAMED_CATEGORY.to_string());

    Category {
        id: record.id,
        name,
    }
}

pub fn localize_review(record: &ReviewRecord) -> Review {
    Review {
        id: record.id,
        rating: record.rating,
        text: record.text.clone(),
        created_at: record.created_at,
        author: record.author.clone(),
    }
}

pub fn split_platforms(platforms: Option<&str>) -> Vec<String> {
    platforms
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn localize_tool(record: &ToolRecord, lang: Language) -> Tool {
    let translation = pick_tool_translation(&record.translations, lang);

    Tool {
        id: record.id,
        slug: record.slug.clone(),
        url: record.url.clone(),
        icon_url: record.icon_url.clone(),
        is_featured: record.is_featured,
        created_at: record.created_at,
        owner_id: record.owner_id,
        name: translation.map(|t| t.name.clone()).unwrap_or_default(),
        description: translation.and_then(|t| t.description.clone()),
        short_description: translation.and_then(|t| t.short_description.clone()),
        category: record
            .category
            .as_ref()
            .map(|category| localize_tool_category(category, lang)),
        average_rating: record.average_rating.unwrap_or(0.0),
        review_count: record.review_count.unwrap_or(0),
        pricing_model: record.pricing_model,
        platforms: split_platforms(record.platforms.as_deref()),
        reviews: record.reviews.iter().map(localize_review).collect(),
    }
}

pub fn localize_tools(records: &[ToolRecord], lang: Language) -> Vec<Tool> {
    records.iter().map(|record| localize_tool(record, lang)).collect()
}

pub fn localize_categories(records: &[CategoryRecord], lang: Language) -> Vec<Category> {
    records
        .iter()
        .filter_map(|record| localize_category(record, lang))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{category_record, tool_record};

    #[test]
    fn test_tool_uses_requested_language() {
        let record = tool_record(1, "chatgpt", &[("ru", "ЧатГПТ"), ("en", "ChatGPT")]);

        assert_eq!(localize_tool(&record, Language::En).name, "ChatGPT");
        assert_eq!(localize_tool(&record, Language::Ru).name, "ЧатГПТ");
    }

    #[test]
    fn test_tool_falls_back_to_russian() {
        let record = tool_record(1, "chatgpt", &[("ru", "ЧатГПТ")]);
        assert_eq!(localize_tool(&record, Language::Uk).name, "ЧатГПТ");
    }

    #[test]
    fn test_tool_without_usable_translation_has_empty_name() {
        let record = tool_record(1, "chatgpt", &[("de", "ChatGPT")]);
        let tool = localize_tool(&record, Language::En);
        assert_eq!(tool.name, "");
        assert_eq!(tool.description, None);
    }

    #[test]
    fn test_missing_numbers_default_to_zero_and_platforms_split() {
        let mut record = tool_record(1, "chatgpt", &[("ru", "ЧатГПТ")]);
        record.average_rating = None;
        record.review_count = None;
        record.platforms = Some("web, ios,,android".to_string());

        let tool = localize_tool(&record, Language::Ru);
        assert_eq!(tool.average_rating, 0.0);
        assert_eq!(tool.review_count, 0);
        assert_eq!(tool.platforms, vec!["web", "ios", "android"]);

        record.platforms = None;
        assert!(localize_tool(&record, Language::Ru).platforms.is_empty());
    }

    #[test]
    fn test_embedded_category_gets_placeholder_name() {
        let mut record = tool_record(1, "chatgpt", &[("ru", "ЧатГПТ")]);
        record.category = Some(category_record(7, "chat", &[("de", "Chat")]));

        let category = localize_tool(&record, Language::En).category.unwrap();
        assert_eq!(category.id, 7);
        assert_eq!(category.name, UNNAMED_CATEGORY);
    }

    #[test]
    fn test_categories_without_translation_are_dropped_from_listing() {
        let records = vec![
            category_record(1, "chat", &[("ru", "Чат"), ("en", "Chat")]),
            category_record(2, "video", &[("de", "Video")]),
            category_record(3, "audio", &[("ru", "Аудио")]),
        ];

        let categories = localize_categories(&records, Language::En);
        assert_eq!(
            categories,
            vec![
                Category {
                    id: 1,
                    name: "Chat".to_string()
                },
                Category {
                    id: 3,
                    name: "Аудио".to_string()
                },
            ]
        );
    }
}
