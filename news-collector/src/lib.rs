pub mod types;
pub mod utils;
pub mod config;
pub mod politeness;
pub mod fetcher;
pub mod parser;
pub mod relevance;
pub mod traits;
pub mod sources;
pub mod aggregator;

pub use types::*;
pub use config::{CollectorConfig, SourceDescriptor, SourceKind};
pub use politeness::{DelayRange, PolitenessConfig, PolitenessGate};
pub use fetcher::{build_fetch_client, Fetch, FetchClient, Transport};
pub use parser::FeedParser;
pub use relevance::RelevanceFilter;
pub use traits::{CollectContext, SourceAdapter};
pub use aggregator::{Aggregator, CollectionOutcome, SourceReport};
