//! Canonical cache keys.
//!
//! A key is a namespace prefix followed by an ordered list of typed parts,
//! joined with `:`. Text parts are percent-encoded so they can never contain
//! the separator or a glob metacharacter, which keeps keys collision-free and
//! keeps `namespace:*` from matching anything outside its namespace.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::models::Language;

const SEPARATOR: char = ':';

/// Placeholder for "no category filter".
pub const ALL: &str = "all";

const KEY_TEXT: &AsciiSet = &CONTROLS
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'%')
    .add(b' ');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Tools,
    Tool,
    Categories,
    ToolCount,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Tools,
        Namespace::Tool,
        Namespace::Categories,
        Namespace::ToolCount,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Tools => "tools",
            Namespace::Tool => "tool",
            Namespace::Categories => "categories",
            Namespace::ToolCount => "tool_count",
        }
    }

    /// Glob matching every key this namespace produces, and nothing else.
    pub fn pattern(&self) -> String {
        format!("{}{SEPARATOR}*", self.prefix())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, Copy)]
enum KeyPart<'a> {
    Text(&'a str),
    Count(u64),
    Lang(Language),
    /// Either a concrete id or the [`ALL`] sentinel.
    Filter(Option<i64>),
}

impl fmt::Display for KeyPart<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Text(text) => write!(f, "{}", utf8_percent_encode(text, KEY_TEXT)),
            KeyPart::Count(value) => write!(f, "{value}"),
            KeyPart::Lang(lang) => f.write_str(lang.code()),
            KeyPart::Filter(Some(id)) => write!(f, "{id}"),
            KeyPart::Filter(None) => f.write_str(ALL),
        }
    }
}

fn encode_key(namespace: Namespace, parts: &[KeyPart<'_>]) -> String {
    let mut key = namespace.prefix().to_string();
    for part in parts {
        key.push(SEPARATOR);
        key.push_str(&part.to_string());
    }
    key
}

pub fn tools_key(lang: Language, category_id: Option<i64>, skip: u64, limit: u64) -> String {
    encode_key(
        Namespace::Tools,
        &[
            KeyPart::Lang(lang),
            KeyPart::Filter(category_id),
            KeyPart::Count(skip),
            KeyPart::Count(limit),
        ],
    )
}

pub fn tool_key(slug: &str, lang: Language) -> String {
    encode_key(Namespace::Tool, &[KeyPart::Text(slug), KeyPart::Lang(lang)])
}

pub fn categories_key(lang: Language) -> String {
    encode_key(Namespace::Categories, &[KeyPart::Lang(lang)])
}

pub fn tool_count_key(category_id: Option<i64>) -> String {
    encode_key(Namespace::ToolCount, &[KeyPart::Filter(category_id)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case(tools_key(Language::Ru, None, 0, 12), "tools:ru:all:0:12")]
    #[case(tools_key(Language::En, Some(3), 24, 12), "tools:en:3:24:12")]
    #[case(tool_key("chatgpt", Language::Uk), "tool:chatgpt:uk")]
    #[case(categories_key(Language::Ru), "categories:ru")]
    #[case(tool_count_key(None), "tool_count:all")]
    #[case(tool_count_key(Some(-1)), "tool_count:-1")]
    fn test_key_format(#[case] key: String, #[case] expected: &str) {
        assert_eq!(key, expected);
    }

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(
            tools_key(Language::En, Some(5), 0, 12),
            tools_key(Language::En, Some(5), 0, 12)
        );
        assert_eq!(
            tool_key("a b", Language::Ru),
            tool_key("a b", Language::Ru)
        );
    }

    #[test]
    fn test_distinct_inputs_give_distinct_keys() {
        let languages = [Language::Ru, Language::En, Language::Uk];
        let categories = [None, Some(0), Some(1), Some(12)];
        let pages = [0u64, 1, 12, 120];

        let mut keys = HashSet::new();
        let mut expected = 0;
        for lang in languages {
            for category in categories {
                for skip in pages {
                    for limit in pages {
                        keys.insert(tools_key(lang, category, skip, limit));
                        expected += 1;
                    }
                }
            }
        }
        assert_eq!(keys.len(), expected);
    }

    #[test]
    fn test_text_parts_cannot_forge_separators_or_globs() {
        let forged = tool_key("a:en", Language::Ru);
        assert_eq!(forged, "tool:a%3Aen:ru");
        assert_ne!(forged, tool_key("a", Language::En));

        assert_eq!(tool_key("x*?[]", Language::Ru), "tool:x%2A%3F%5B%5D:ru");
        assert_eq!(tool_key("100%", Language::Ru), "tool:100%25:ru");
        assert_ne!(tool_key("%3A", Language::Ru), tool_key(":", Language::Ru));
    }

    #[test]
    fn test_namespace_patterns_do_not_overlap() {
        let patterns: Vec<String> = Namespace::ALL.iter().map(Namespace::pattern).collect();
        assert_eq!(
            patterns,
            vec!["tools:*", "tool:*", "categories:*", "tool_count:*"]
        );

        // "tool:*" must not cover "tools:..." or "tool_count:..."
        let tools = tools_key(Language::Ru, None, 0, 12);
        let count = tool_count_key(None);
        assert!(!tools.starts_with("tool:"));
        assert!(!count.starts_with("tool:"));
    }
}
