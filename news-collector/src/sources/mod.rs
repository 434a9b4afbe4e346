pub mod arxiv_api;
pub mod rss_feed;
pub mod scrape_page;

pub use arxiv_api::ApiAdapter;
pub use rss_feed::FeedAdapter;
pub use scrape_page::ScrapeAdapter;

use crate::config::SourceKind;
use crate::traits::SourceAdapter;

/// The adapter that handles a given source kind.
pub fn adapter_for(kind: &SourceKind) -> Box<dyn SourceAdapter> {
    match kind {
        SourceKind::Feed => Box::new(FeedAdapter::new()),
        SourceKind::Scrape { .. } => Box::new(ScrapeAdapter::new()),
        SourceKind::Api { .. } => Box::new(ApiAdapter::new()),
    }
}
