use crate::types::{CollectorError, ItemRecord, ParsedEntry, ParsedFeed, Result};
use crate::utils::text::{collapse_whitespace, strip_html};
use crate::utils::url::resolve_link;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use tracing::{debug, info};
use url::Url;

/// RSS/Atom parsing shared by the feed and API adapters.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| CollectorError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let entries: Vec<ParsedEntry> = feed.entries.into_iter().map(Self::parse_entry).collect();

        info!("Parsed feed with {} entries", entries.len());
        Ok(ParsedFeed { title, entries })
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> ParsedEntry {
        // The alternate link is the human-readable page; arXiv also lists a PDF.
        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone());

        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body));

        ParsedEntry {
            url,
            title: entry.title.map(|t| t.content),
            summary,
            authors: entry.authors.into_iter().map(|a| a.name).collect(),
            published_at: entry.published,
            updated_at: entry.updated,
            tags: entry.categories.into_iter().map(|c| c.term).collect(),
        }
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        let has_feed_indicators = content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("xmlns=\"http://www.w3.org/2005/atom\"")
            || content_lower.contains("<channel");

        let looks_like_json_feed = content.trim_start().starts_with('{')
            && content_lower.contains("jsonfeed.org");

        has_feed_indicators || looks_like_json_feed
    }

    /// Map a parsed entry into an output record. Timestamps fall back from
    /// `published` to `updated` to the collection time; relative links are
    /// resolved against the feed URL.
    pub fn to_item_record(
        entry: &ParsedEntry,
        source_name: &str,
        base_url: &Url,
        collected_at: DateTime<Utc>,
    ) -> Result<ItemRecord> {
        let title = entry
            .title
            .as_deref()
            .map(collapse_whitespace)
            .unwrap_or_default();
        let link = entry
            .url
            .as_deref()
            .and_then(|href| resolve_link(base_url, href))
            .unwrap_or_default();
        let summary = entry.summary.as_deref().map(strip_html).unwrap_or_default();
        let published_at = entry.published_at.or(entry.updated_at).unwrap_or(collected_at);

        ItemRecord::new(&title, &link, published_at, &summary, source_name).ok_or_else(|| {
            CollectorError::InvalidRecord(format!(
                "entry from {} lacks a title or link (title: {:?}, link: {:?})",
                source_name, entry.title, entry.url
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Lab blog</title>
  <item>
    <title>Introducing a  new
      model</title>
    <link>https://lab.example/blog/new-model</link>
    <description>&lt;p&gt;Our &lt;b&gt;latest&lt;/b&gt; model&lt;/p&gt;</description>
    <pubDate>Sun, 18 Oct 2026 09:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Undated post</title>
    <link>/blog/undated</link>
    <pubDate>sometime last week</pubDate>
  </item>
  <item>
    <description>No title here</description>
    <link>https://lab.example/blog/untitled</link>
  </item>
</channel></rss>"#;

    fn base() -> Url {
        Url::parse("https://lab.example/feed.xml").unwrap()
    }

    #[test]
    fn parses_rss_and_maps_records() {
        let parser = FeedParser::new();
        let feed = parser.parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Lab blog"));
        assert_eq!(feed.entries.len(), 3);

        let collected_at = Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap();
        let first = FeedParser::to_item_record(&feed.entries[0], "Lab", &base(), collected_at).unwrap();
        assert_eq!(first.title, "Introducing a new model");
        assert_eq!(first.summary, "Our latest model");
        assert_eq!(
            first.published_at,
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
        );

        let undated =
            FeedParser::to_item_record(&feed.entries[1], "Lab", &base(), collected_at).unwrap();
        assert_eq!(undated.published_at, collected_at);
        assert_eq!(undated.link, "https://lab.example/blog/undated");

        let untitled = FeedParser::to_item_record(&feed.entries[2], "Lab", &base(), collected_at);
        assert!(matches!(untitled, Err(CollectorError::InvalidRecord(_))));
    }

    #[test]
    fn atom_prefers_alternate_link_and_keeps_authors() {
        let atom = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>query results</title>
  <entry>
    <id>http://arxiv.org/abs/2610.00001v1</id>
    <updated>2026-10-17T12:00:00Z</updated>
    <title>Sparse Attention for Long Contexts</title>
    <summary>We study attention.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/pdf/2610.00001v1" rel="related" title="pdf"/>
    <link href="http://arxiv.org/abs/2610.00001v1" rel="alternate" type="text/html"/>
    <category term="cs.CL"/>
    <category term="cs.LG"/>
  </entry>
</feed>"#;
        let feed = FeedParser::new().parse_feed(atom).unwrap();
        let entry = &feed.entries[0];
        assert_eq!(entry.url.as_deref(), Some("http://arxiv.org/abs/2610.00001v1"));
        assert_eq!(entry.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(entry.tags, vec!["cs.CL", "cs.LG"]);

        let record = FeedParser::to_item_record(entry, "arXiv", &base(), Utc::now()).unwrap();
        assert_eq!(
            record.published_at,
            Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_non_feed_content() {
        assert!(FeedParser::new().parse_feed("<html><body>nope</body></html>").is_err());
        assert!(FeedParser::is_valid_feed_content(RSS));
        assert!(!FeedParser::is_valid_feed_content("<html><body></body></html>"));
    }
}
