use crate::politeness::{DelayRange, PolitenessConfig};
use crate::relevance::RelevanceConfig;
use crate::types::{CollectorError, FetchConfig, Result};
use crate::utils::url::{host_key, parse_http_url};
use anyhow::Context;
use scraper::Selector;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// Query endpoint used by `api` sources that leave `url` empty.
pub const ARXIV_QUERY_ENDPOINT: &str = "http://export.arxiv.org/api/query";

/// Static description of one source, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub kind: SourceKind,
    /// Overrides the gate's default pause for this source's host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceKind {
    #[serde(alias = "rss", alias = "atom")]
    Feed,
    #[serde(alias = "web")]
    Scrape { selectors: SelectorSet },
    #[serde(alias = "arxiv")]
    Api {
        #[serde(default)]
        query: ApiQuery,
    },
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Scrape { .. } => "scrape",
            SourceKind::Api { .. } => "api",
        }
    }
}

/// CSS selector chains for a scraped page. Each chain is tried in order and
/// the first selector that matches wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSet {
    #[serde(alias = "selector", deserialize_with = "one_or_many")]
    pub container: Vec<String>,
    #[serde(alias = "title_selector", deserialize_with = "one_or_many")]
    pub title: Vec<String>,
    #[serde(alias = "link_selector", deserialize_with = "one_or_many")]
    pub link: Vec<String>,
    #[serde(
        default,
        alias = "date_selector",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub date: Vec<String>,
    #[serde(
        default,
        alias = "summary_selector",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub summary: Vec<String>,
}

impl SelectorSet {
    fn chains(&self) -> [(&'static str, &Vec<String>); 5] {
        [
            ("container", &self.container),
            ("title", &self.title),
            ("link", &self.link),
            ("date", &self.date),
            ("summary", &self.summary),
        ]
    }

    fn validate(&self) -> Result<()> {
        for (role, chain) in self.chains() {
            let required = matches!(role, "container" | "title" | "link");
            if required && chain.iter().all(|s| s.trim().is_empty()) {
                return Err(CollectorError::Config(format!(
                    "Missing {} selector",
                    role
                )));
            }
            for selector in chain {
                Selector::parse(selector).map_err(|e| CollectorError::Selector {
                    selector: selector.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let chain = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(selector) => vec![selector],
        OneOrMany::Many(selectors) => selectors,
    };
    Ok(chain
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiQuery {
    /// Topic keywords, OR-joined into the search query.
    pub keywords: Vec<String>,
    pub max_results: u32,
    pub start: u32,
}

impl Default for ApiQuery {
    fn default() -> Self {
        Self {
            keywords: vec![
                "large language model".to_string(),
                "LLM".to_string(),
                "generative AI".to_string(),
            ],
            max_results: 20,
            start: 0,
        }
    }
}

impl SourceDescriptor {
    /// URL the adapter fetches. `api` sources fall back to the arXiv endpoint.
    pub fn target_url(&self) -> Result<Url> {
        match (&self.kind, self.url.trim().is_empty()) {
            (SourceKind::Api { .. }, true) => parse_http_url(ARXIV_QUERY_ENDPOINT),
            _ => parse_http_url(&self.url),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CollectorError::Config("Source without a name".to_string()));
        }
        self.target_url()?;
        match &self.kind {
            SourceKind::Scrape { selectors } => selectors.validate(),
            SourceKind::Api { query } if query.keywords.iter().all(|k| k.trim().is_empty()) => {
                Err(CollectorError::Config(format!(
                    "API source {} has no query keywords",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Everything a collection pass needs. Passed by value to the aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub fetch: FetchConfig,
    pub politeness: PolitenessConfig,
    pub relevance: RelevanceConfig,
    /// Reject entries whose parsed timestamp is older than this many hours.
    pub max_item_age_hours: Option<u64>,
    /// Cancel the pass after this many seconds, keeping what was collected.
    pub pass_deadline_secs: Option<u64>,
    pub sources: Vec<SourceDescriptor>,
}

/// Top level with sources left raw, so one bad entry cannot sink the file.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    fetch: FetchConfig,
    #[serde(default)]
    politeness: PolitenessConfig,
    #[serde(default)]
    relevance: RelevanceConfig,
    #[serde(default)]
    max_item_age_hours: Option<u64>,
    #[serde(default)]
    pass_deadline_secs: Option<u64>,
    #[serde(default)]
    sources: Vec<serde_json::Value>,
}

impl CollectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;

        let mut sources = Vec::with_capacity(raw.sources.len());
        for (index, value) in raw.sources.into_iter().enumerate() {
            let label = value
                .get("name")
                .and_then(|n| n.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index));

            let descriptor = match serde_json::from_value::<SourceDescriptor>(value) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Skipping malformed source {}: {}", label, e);
                    continue;
                }
            };
            if let Err(e) = descriptor.validate() {
                warn!("Skipping invalid source {}: {}", label, e);
                continue;
            }
            sources.push(descriptor);
        }

        Ok(Self {
            fetch: raw.fetch,
            politeness: raw.politeness,
            relevance: raw.relevance,
            max_item_age_hours: raw.max_item_age_hours,
            pass_deadline_secs: raw.pass_deadline_secs,
            sources,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading source config {}", path.display()))?;
        let config = Self::from_json_str(&json)
            .with_context(|| format!("parsing source config {}", path.display()))?;
        info!(
            "Loaded {} sources from {}",
            config.sources.len(),
            path.display()
        );
        Ok(config)
    }

    /// Per-host delay overrides declared by the sources.
    pub fn host_delays(&self) -> HashMap<String, DelayRange> {
        self.sources
            .iter()
            .filter_map(|source| {
                let delay = source.delay?;
                let url = source.target_url().ok()?;
                Some((host_key(&url), delay))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = r#"{
        "politeness": { "requests_per_window": 50 },
        "max_item_age_hours": 24,
        "sources": [
            { "name": "OpenAI Blog", "type": "rss", "url": "https://openai.com/blog/rss.xml" },
            {
                "name": "Anthropic News",
                "type": "web",
                "url": "https://www.anthropic.com/news",
                "selectors": {
                    "selector": ["article", "div.post-card"],
                    "title_selector": "h3",
                    "link_selector": "a"
                }
            },
            { "name": "arXiv", "type": "api", "delay": { "min_ms": 3000, "max_ms": 5000 } },
            { "name": "Broken", "type": "ftp", "url": "ftp://nowhere" },
            { "name": "No link", "type": "scrape", "url": "https://x.org",
              "selectors": { "container": "div", "title": "h2", "link": [] } },
            { "name": "Bad css", "type": "scrape", "url": "https://x.org",
              "selectors": { "container": "div[", "title": "h2", "link": "a" } }
        ]
    }"#;

    #[test]
    fn skips_malformed_sources_and_keeps_the_rest() {
        let config = CollectorConfig::from_json_str(MIXED).unwrap();
        let names: Vec<_> = config.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["OpenAI Blog", "Anthropic News", "arXiv"]);

        assert!(matches!(config.sources[0].kind, SourceKind::Feed));
        match &config.sources[1].kind {
            SourceKind::Scrape { selectors } => {
                assert_eq!(selectors.container, vec!["article", "div.post-card"]);
                assert_eq!(selectors.title, vec!["h3"]);
                assert!(selectors.date.is_empty());
            }
            other => panic!("expected scrape source, got {:?}", other),
        }

        assert_eq!(config.politeness.requests_per_window, 50);
        assert_eq!(config.politeness.window_seconds, 3_600);
        assert_eq!(config.max_item_age_hours, Some(24));
        assert_eq!(config.fetch.max_attempts, 3);
    }

    #[test]
    fn api_source_defaults_to_arxiv_endpoint() {
        let config = CollectorConfig::from_json_str(MIXED).unwrap();
        let arxiv = &config.sources[2];
        assert_eq!(arxiv.target_url().unwrap().as_str(), ARXIV_QUERY_ENDPOINT);
        match &arxiv.kind {
            SourceKind::Api { query } => assert_eq!(query.max_results, 20),
            other => panic!("expected api source, got {:?}", other),
        }
        assert_eq!(
            config.host_delays().get("export.arxiv.org"),
            Some(&DelayRange::new(3_000, 5_000))
        );
    }

    #[test]
    fn invalid_top_level_is_an_error() {
        assert!(CollectorConfig::from_json_str("{ not json").is_err());
        let empty = CollectorConfig::from_json_str("{}").unwrap();
        assert!(empty.sources.is_empty());
    }

    #[test]
    fn bundled_source_file_parses() {
        let json = include_str!("../config/news_sources.json");
        let config = CollectorConfig::from_json_str(json).unwrap();
        assert!(config.sources.len() >= 5);
        for kind in ["feed", "scrape", "api"] {
            assert!(
                config.sources.iter().any(|s| s.kind.label() == kind),
                "bundled config has no {} source",
                kind
            );
        }
    }
}
