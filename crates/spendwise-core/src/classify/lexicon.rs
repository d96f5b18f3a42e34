//! Keyword lexicon for rule-based category matching
//!
//! The lexicon is a TOML data file. An embedded default is compiled in; a
//! file on disk replaces it without code changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::Category;

/// Embedded default lexicon
const DEFAULT_KEYWORDS: &str = include_str!("../../../../config/keywords.toml");

/// Environment variable pointing at a lexicon file
pub const KEYWORDS_ENV: &str = "SPENDWISE_KEYWORDS";

/// Default lexicon override path
pub fn default_keywords_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendwise").join("config").join("keywords.toml"))
}

/// Keywords for one category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryKeywords {
    pub store: Vec<String>,
    pub item: Vec<String>,
}

/// A keyword match: the category and the keywords that hit
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub category: Category,
    pub keywords: Vec<String>,
}

/// Category keyword tables, iterated in [`Category::all`] order
#[derive(Debug, Clone)]
pub struct KeywordLexicon {
    entries: Vec<(Category, CategoryKeywords)>,
}

#[derive(Debug, Deserialize)]
struct RawKeywords {
    #[serde(default)]
    store: Vec<String>,
    #[serde(default)]
    item: Vec<String>,
}

impl Default for KeywordLexicon {
    fn default() -> Self {
        // The embedded file is covered by tests; an empty lexicon only means
        // every keyword tier falls through.
        Self::parse(DEFAULT_KEYWORDS).unwrap_or_else(|_| Self {
            entries: Vec::new(),
        })
    }
}

impl KeywordLexicon {
    /// Parse a lexicon from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let raw: HashMap<String, RawKeywords> = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid keyword lexicon: {}", e)))?;

        let mut entries = Vec::new();
        for (code, keywords) in raw {
            let category: Category = code.parse().map_err(Error::Config)?;
            let normalize = |list: Vec<String>| -> Vec<String> {
                list.into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect()
            };
            entries.push((
                category,
                CategoryKeywords {
                    store: normalize(keywords.store),
                    item: normalize(keywords.item),
                },
            ));
        }
        entries.sort_by_key(|(category, _)| *category);

        Ok(Self { entries })
    }

    /// Load the lexicon: explicit path, then `SPENDWISE_KEYWORDS`, then the
    /// default override location, then the embedded default
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(KEYWORDS_ENV).ok().map(PathBuf::from);
        let candidates = path
            .map(Path::to_path_buf)
            .into_iter()
            .chain(env_path)
            .chain(default_keywords_path());

        for candidate in candidates {
            if candidate.exists() {
                let content = fs::read_to_string(&candidate)?;
                info!("Loaded keyword lexicon from {}", candidate.display());
                return Self::parse(&content);
            }
            debug!("No keyword lexicon at {}", candidate.display());
        }

        Self::parse(DEFAULT_KEYWORDS)
    }

    /// Keywords configured for a category
    pub fn keywords(&self, category: Category) -> Option<&CategoryKeywords> {
        self.entries
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, k)| k)
    }

    /// First category with a store keyword contained in the name
    pub fn match_store(&self, store_name: &str) -> Option<Category> {
        Self::first_match(&self.entries, store_name, |k| &k.store)
    }

    /// First category with an item keyword contained in the name
    pub fn match_item(&self, item_name: &str) -> Option<Category> {
        Self::first_match(&self.entries, item_name, |k| &k.item)
    }

    fn first_match(
        entries: &[(Category, CategoryKeywords)],
        text: &str,
        table: impl Fn(&CategoryKeywords) -> &Vec<String>,
    ) -> Option<Category> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        entries
            .iter()
            .find(|(_, keywords)| table(keywords).iter().any(|k| text.contains(k.as_str())))
            .map(|(category, _)| *category)
    }

    /// Every category with at least one keyword related to the text, with
    /// the keywords that matched
    ///
    /// A keyword is related when either contains the other, so short search
    /// text like "커" still surfaces "커피".
    pub fn related(&self, text: &str) -> Vec<KeywordMatch> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter_map(|(category, keywords)| {
                let mut hits: Vec<String> = Vec::new();
                for k in keywords.store.iter().chain(keywords.item.iter()) {
                    if (text.contains(k.as_str()) || k.contains(text.as_str()))
                        && !hits.contains(k)
                    {
                        hits.push(k.clone());
                    }
                }
                (!hits.is_empty()).then(|| KeywordMatch {
                    category: *category,
                    keywords: hits,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lexicon_parses() {
        let lexicon = KeywordLexicon::parse(DEFAULT_KEYWORDS).unwrap();
        assert!(lexicon.keywords(Category::Food).is_some());
        assert!(lexicon.keywords(Category::Health).is_some());
        assert!(lexicon.keywords(Category::Other).is_none());
        assert!(lexicon
            .keywords(Category::Food)
            .unwrap()
            .item
            .contains(&"아메리카노".to_string()));
    }

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let lexicon = KeywordLexicon::default();
        assert_eq!(lexicon.match_store("STARBUCKS Coffee 역삼"), Some(Category::Food));
        assert_eq!(lexicon.match_store("CGV 강남"), Some(Category::Entertainment));
        assert_eq!(lexicon.match_item("생맥주 500cc"), Some(Category::DiningOut));
        assert_eq!(lexicon.match_store("Unknown Shop"), None);
        assert_eq!(lexicon.match_item(""), None);
    }

    #[test]
    fn test_fixed_category_order_wins_on_overlap() {
        // File order is irrelevant; the earlier category in enum order wins
        let lexicon = KeywordLexicon::parse(
            r#"
            [dining_out]
            store = ["bakery"]
            [food]
            store = ["bakery"]
            "#,
        )
        .unwrap();
        assert_eq!(lexicon.match_store("Paris Bakery"), Some(Category::Food));
    }

    #[test]
    fn test_unknown_category_code_is_rejected() {
        let err = KeywordLexicon::parse("[groceries]\nstore = [\"mart\"]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.toml");
        std::fs::write(&path, "[health]\nstore = [\"Vet\"]\n").unwrap();

        let lexicon = KeywordLexicon::load(Some(&path)).unwrap();
        assert_eq!(lexicon.match_store("City Vet Clinic"), Some(Category::Health));
        assert_eq!(lexicon.match_store("스타벅스"), None);
    }

    #[test]
    fn test_related_keywords() {
        let lexicon = KeywordLexicon::default();
        let related = lexicon.related("스타벅스 아메리카노");
        assert_eq!(related[0].category, Category::Food);
        assert!(related[0].keywords.contains(&"스타벅스".to_string()));
        assert!(related[0].keywords.contains(&"아메리카노".to_string()));
    }
}
