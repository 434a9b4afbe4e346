use crate::config::SourceDescriptor;
use crate::fetcher::Fetch;
use crate::types::{ItemRecord, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Per-pass state handed to every adapter.
#[derive(Clone, Copy)]
pub struct CollectContext<'a> {
    pub client: &'a dyn Fetch,
    pub cancel: &'a CancellationToken,
    /// Timestamp given to entries whose own date is missing or unparseable.
    pub collected_at: DateTime<Utc>,
}

/// Turns one source into candidate records. Adapters do not filter for
/// relevance; the aggregator does.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> &'static str;

    /// A failing entry is skipped; only whole-source failures are errors.
    async fn collect(
        &self,
        descriptor: &SourceDescriptor,
        ctx: CollectContext<'_>,
    ) -> Result<Vec<ItemRecord>>;
}
