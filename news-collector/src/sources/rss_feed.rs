use crate::config::SourceDescriptor;
use crate::parser::FeedParser;
use crate::traits::{CollectContext, SourceAdapter};
use crate::types::{ItemRecord, Result};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

/// RSS/Atom feeds.
#[derive(Debug, Default)]
pub struct FeedAdapter {
    parser: FeedParser,
}

impl FeedAdapter {
    pub fn new() -> Self {
        Self {
            parser: FeedParser::new(),
        }
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn kind(&self) -> &'static str {
        "feed"
    }

    #[instrument(skip_all, fields(source = %descriptor.name))]
    async fn collect(
        &self,
        descriptor: &SourceDescriptor,
        ctx: CollectContext<'_>,
    ) -> Result<Vec<ItemRecord>> {
        let url = descriptor.target_url()?;
        info!("Pulling RSS feed: {}", url);

        let response = ctx.client.fetch(&url, ctx.cancel).await?;
        if !FeedParser::is_valid_feed_content(&response.body) {
            warn!("Response from {} does not look like a feed; parsing anyway", url);
        }
        let feed = self.parser.parse_feed(&response.body)?;

        let mut items = Vec::with_capacity(feed.entries.len());
        for entry in &feed.entries {
            match FeedParser::to_item_record(entry, &descriptor.name, &response.url, ctx.collected_at)
            {
                Ok(item) => items.push(item),
                Err(e) => debug!("Skipping entry: {}", e),
            }
        }

        info!(
            "Successfully pulled {} items from RSS feed {}",
            items.len(),
            url
        );
        Ok(items)
    }
}
