use crate::config::{CollectorConfig, SourceDescriptor};
use crate::fetcher::{build_fetch_client, Fetch};
use crate::relevance::RelevanceFilter;
use crate::sources::adapter_for;
use crate::traits::CollectContext;
use crate::types::{CollectorError, ItemRecord, Result};
use crate::utils::time::sleep_or_cancel;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What one source contributed to a pass.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub kind: &'static str,
    pub candidates: usize,
    pub accepted: usize,
    pub irrelevant: usize,
    pub too_old: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl SourceReport {
    fn new(descriptor: &SourceDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            kind: descriptor.kind.label(),
            candidates: 0,
            accepted: 0,
            irrelevant: 0,
            too_old: 0,
            error: None,
            elapsed_ms: 0,
        }
    }

    fn cancelled(descriptor: &SourceDescriptor) -> Self {
        Self {
            error: Some(CollectorError::Cancelled.to_string()),
            ..Self::new(descriptor)
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of a pass. `Empty` lets callers skip publishing without inspecting
/// the item list.
#[derive(Debug, Clone)]
pub enum CollectionOutcome {
    Collected {
        items: Vec<ItemRecord>,
        reports: Vec<SourceReport>,
    },
    Empty {
        reports: Vec<SourceReport>,
    },
}

impl CollectionOutcome {
    fn from_parts(items: Vec<ItemRecord>, reports: Vec<SourceReport>) -> Self {
        if items.is_empty() {
            CollectionOutcome::Empty { reports }
        } else {
            CollectionOutcome::Collected { items, reports }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CollectionOutcome::Empty { .. })
    }

    pub fn items(&self) -> &[ItemRecord] {
        match self {
            CollectionOutcome::Collected { items, .. } => items,
            CollectionOutcome::Empty { .. } => &[],
        }
    }

    pub fn reports(&self) -> &[SourceReport] {
        match self {
            CollectionOutcome::Collected { reports, .. } | CollectionOutcome::Empty { reports } => {
                reports
            }
        }
    }

    pub fn into_items(self) -> Vec<ItemRecord> {
        match self {
            CollectionOutcome::Collected { items, .. } => items,
            CollectionOutcome::Empty { .. } => Vec::new(),
        }
    }
}

/// Oldest publication time kept by a recency window of `hours`. A window
/// reaching past the representable range means no cutoff.
pub fn age_cutoff(collected_at: DateTime<Utc>, hours: u64) -> Option<DateTime<Utc>> {
    let hours = i64::try_from(hours).ok()?;
    let window = TimeDelta::try_hours(hours)?;
    collected_at.checked_sub_signed(window)
}

/// Runs every configured source once, in order, and merges what they return.
pub struct Aggregator {
    config: CollectorConfig,
    client: Arc<dyn Fetch>,
    relevance: RelevanceFilter,
}

impl Aggregator {
    /// Builds the default politeness + retry + reqwest stack from `config`.
    pub fn new(config: CollectorConfig) -> Result<Self> {
        let client = build_fetch_client(
            &config.fetch,
            config.politeness.clone(),
            config.host_delays(),
        )?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    pub fn with_client(config: CollectorConfig, client: Arc<dyn Fetch>) -> Self {
        let relevance = RelevanceFilter::from_config(&config.relevance);
        if relevance.is_empty() {
            warn!("Relevance keyword list is empty; every candidate will be rejected");
        }
        Self {
            config,
            client,
            relevance,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub async fn collect_all(&self) -> CollectionOutcome {
        self.collect_all_with_cancel(&CancellationToken::new()).await
    }

    /// Like [`Aggregator::collect_all`], stopping early when `cancel` fires or
    /// the configured pass deadline elapses. Items gathered before that are
    /// kept.
    #[instrument(skip_all, fields(sources = self.config.sources.len()))]
    pub async fn collect_all_with_cancel(&self, cancel: &CancellationToken) -> CollectionOutcome {
        let pass = cancel.child_token();
        let deadline = self.config.pass_deadline_secs.map(|secs| {
            let token = pass.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                warn!("Pass deadline of {}s reached; cancelling remaining work", secs);
                token.cancel();
            })
        });

        let started = Instant::now();
        let collected_at = Utc::now();
        let cutoff = self
            .config
            .max_item_age_hours
            .and_then(|hours| age_cutoff(collected_at, hours));

        let mut items = Vec::new();
        let mut reports = Vec::with_capacity(self.config.sources.len());

        for (index, descriptor) in self.config.sources.iter().enumerate() {
            if index > 0 {
                let pause = self.config.politeness.inter_source_delay.sample();
                if sleep_or_cancel(pause, &pass).await.is_err() {
                    debug!("Cancelled between sources");
                }
            }
            if pass.is_cancelled() {
                warn!("Skipping {}: pass cancelled", descriptor.name);
                reports.push(SourceReport::cancelled(descriptor));
                continue;
            }

            let (accepted, report) = self
                .collect_source(descriptor, &pass, collected_at, cutoff)
                .await;
            items.extend(accepted);
            reports.push(report);
        }

        if let Some(handle) = deadline {
            handle.abort();
        }

        // Stable: items with equal timestamps keep source order.
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let failed = reports.iter().filter(|r| r.failed()).count();
        info!(
            items = items.len(),
            sources = reports.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collection pass finished"
        );
        if items.is_empty() {
            warn!("No items collected from any source");
        }

        CollectionOutcome::from_parts(items, reports)
    }

    async fn collect_source(
        &self,
        descriptor: &SourceDescriptor,
        cancel: &CancellationToken,
        collected_at: DateTime<Utc>,
        cutoff: Option<DateTime<Utc>>,
    ) -> (Vec<ItemRecord>, SourceReport) {
        let started = Instant::now();
        let mut report = SourceReport::new(descriptor);
        let adapter = adapter_for(&descriptor.kind);
        debug!("Running {} adapter for {}", adapter.kind(), descriptor.name);
        let ctx = CollectContext {
            client: self.client.as_ref(),
            cancel,
            collected_at,
        };

        let mut accepted = Vec::new();
        match adapter.collect(descriptor, ctx).await {
            Ok(candidates) => {
                report.candidates = candidates.len();
                for item in candidates {
                    if cutoff.is_some_and(|cutoff| item.published_at < cutoff) {
                        report.too_old += 1;
                        continue;
                    }
                    match self.relevance.matched_keyword(&item.title, &item.summary) {
                        Some(keyword) => {
                            debug!("Keeping \"{}\" (matched {})", item.title, keyword);
                            accepted.push(item);
                        }
                        None => report.irrelevant += 1,
                    }
                }
                report.accepted = accepted.len();
                info!(
                    "{}: {} candidates, {} accepted",
                    descriptor.name, report.candidates, report.accepted
                );
            }
            Err(e @ CollectorError::RobotsDisallowed { .. }) => {
                warn!("Skipping {}: {}", descriptor.name, e);
                report.error = Some(e.to_string());
            }
            Err(e) => {
                error!("Failed to collect from {}: {}", descriptor.name, e);
                report.error = Some(e.to_string());
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        (accepted, report)
    }
}
