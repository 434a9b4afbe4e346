use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One collected news or paper item, as handed to brief rendering and publishing.
///
/// `title` and `link` are always non-empty; use [`ItemRecord::new`] to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeSet<String>>,
}

impl ItemRecord {
    /// Returns `None` when the trimmed title or link is empty.
    pub fn new(
        title: &str,
        link: &str,
        published_at: DateTime<Utc>,
        summary: &str,
        source_name: &str,
    ) -> Option<Self> {
        let title = title.trim();
        let link = link.trim();
        if title.is_empty() || link.is_empty() {
            return None;
        }

        Some(Self {
            title: title.to_owned(),
            link: link.to_owned(),
            published_at,
            summary: summary.trim().to_owned(),
            source_name: source_name.to_owned(),
            authors: None,
            categories: None,
        })
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        let authors: Vec<String> = authors
            .into_iter()
            .map(|a| a.trim().to_owned())
            .filter(|a| !a.is_empty())
            .collect();
        self.authors = if authors.is_empty() { None } else { Some(authors) };
        self
    }

    pub fn with_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let categories: BTreeSet<String> = categories
            .into_iter()
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .collect();
        self.categories = if categories.is_empty() { None } else { Some(categories) };
        self
    }
}

// Object style note:
// Consumers of ItemRecord (brief generation, markdown/json writers, the
// publishing channels) run after a collection pass has finished. Records are
// handed over by value and never mutated once the pass returns.
