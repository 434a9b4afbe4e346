/// URL helpers shared by the politeness gate and the adapters
pub mod url {
    use crate::types::{CollectorError, Result};
    use url::Url;

    /// Parse an absolute http(s) URL.
    pub fn parse_http_url(url_str: &str) -> Result<Url> {
        let url = Url::parse(url_str.trim())?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            _ => Err(CollectorError::Config(format!(
                "Unsupported URL (need absolute http/https): {}",
                url_str
            ))),
        }
    }

    /// Key for per-origin state: scheme, host and explicit port.
    pub fn origin_key(url: &Url) -> String {
        url.origin().ascii_serialization()
    }

    /// Host (with port when present), used for rate budgets and delays.
    pub fn host_key(url: &Url) -> String {
        match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        }
    }

    pub fn robots_url(url: &Url) -> Result<Url> {
        Ok(url.join("/robots.txt")?)
    }

    /// Resolve a possibly relative href against the page it was found on.
    /// Only http(s) results are kept; `javascript:`/`mailto:` links yield `None`.
    pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let resolved = base.join(href).ok()?;
        match resolved.scheme() {
            "http" | "https" => Some(resolved.to_string()),
            _ => None,
        }
    }
}

/// Text clean-up for titles and summaries
pub mod text {
    use scraper::Html;

    /// Collapse runs of whitespace (including newlines) into single spaces.
    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Drop markup from feed summaries, keeping the visible text.
    pub fn strip_html(text: &str) -> String {
        if !text.contains('<') {
            return collapse_whitespace(text);
        }
        let fragment = Html::parse_fragment(text);
        let visible = fragment.root_element().text().collect::<Vec<_>>().join(" ");
        collapse_whitespace(&visible)
    }
}

/// Time parsing and cancellable sleeps
pub mod time {
    use crate::types::{CollectorError, Result};
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d %B %Y",
        "%d %b %Y",
    ];

    /// Best-effort timestamp parsing for scraped pages. Offsets are honoured;
    /// naive values are taken as UTC.
    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(naive.and_utc());
            }
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            }
        }
        None
    }

    /// Sleep unless the pass is cancelled first.
    pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CollectorError::Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(CollectorError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
