use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub use interfaces::defs::ItemRecord;

/// Browser identities rotated across requests.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36 Edg/129.0.0.0",
];

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,application/rss+xml;q=0.9,*/*;q=0.8";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agents: Vec<String>,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    /// Target sites with broken certificate chains are still fetched. This
    /// trades transport authenticity for availability.
    pub accept_invalid_certs: bool,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            timeout_seconds: 30,
            max_attempts: 3,
            backoff_min_ms: 2_000,
            backoff_max_ms: 5_000,
            accept_invalid_certs: true,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

/// A successful or status-bearing HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub url: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub authors: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Dropped entry: {0}")]
    InvalidRecord(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Robots.txt disallows access to {url}")]
    RobotsDisallowed { url: String },

    #[error("Response size exceeds limit: {size_mb}MB")]
    BodyTooLarge { size_mb: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collection pass cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollectorError {
    /// Conditions worth another attempt: gateway/server hiccups and
    /// connection or timeout failures.
    pub fn is_transient(&self) -> bool {
        match self {
            CollectorError::Http(e) => e.is_timeout() || e.is_connect(),
            CollectorError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

pub type Result<T> = std::result::Result<T, CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_gateway_and_server_errors_are_transient() {
        for status in [500, 502, 503, 504] {
            let err = CollectorError::Status { url: "u".into(), status };
            assert!(err.is_transient(), "{status} should be retried");
        }
        for status in [400, 403, 404, 429, 501] {
            let err = CollectorError::Status { url: "u".into(), status };
            assert!(!err.is_transient(), "{status} should not be retried");
        }
        assert!(!CollectorError::RobotsDisallowed { url: "u".into() }.is_transient());
        assert!(!CollectorError::Cancelled.is_transient());
    }

    #[test]
    fn default_fetch_config_matches_documented_policy() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.max_attempts, 3);
        assert_eq!((config.backoff_min_ms, config.backoff_max_ms), (2_000, 5_000));
        assert!(config.accept_invalid_certs);
        assert!(config.user_agents.len() > 1);
    }
}
