use crate::config::{SelectorSet, SourceDescriptor, SourceKind};
use crate::traits::{CollectContext, SourceAdapter};
use crate::types::{CollectorError, ItemRecord, Result};
use crate::utils::text::collapse_whitespace;
use crate::utils::time::parse_timestamp;
use crate::utils::url::resolve_link;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// HTML pages described by CSS selector chains.
#[derive(Debug, Default)]
pub struct ScrapeAdapter;

impl ScrapeAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Parsed selector chains, in fallback order.
#[derive(Debug)]
pub struct CompiledSelectors {
    container: Vec<Selector>,
    title: Vec<Selector>,
    link: Vec<Selector>,
    date: Vec<Selector>,
    summary: Vec<Selector>,
}

fn compile_chain(chain: &[String]) -> Result<Vec<Selector>> {
    chain
        .iter()
        .map(|s| {
            Selector::parse(s).map_err(|e| CollectorError::Selector {
                selector: s.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl CompiledSelectors {
    pub fn compile(set: &SelectorSet) -> Result<Self> {
        Ok(Self {
            container: compile_chain(&set.container)?,
            title: compile_chain(&set.title)?,
            link: compile_chain(&set.link)?,
            date: compile_chain(&set.date)?,
            summary: compile_chain(&set.summary)?,
        })
    }
}

/// Items found on one page, plus how many containers matched.
#[derive(Debug)]
pub struct PageExtraction {
    pub containers: usize,
    pub items: Vec<ItemRecord>,
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// First non-empty text among the chain's matches.
fn first_text(container: ElementRef<'_>, chain: &[Selector]) -> Option<String> {
    chain.iter().find_map(|selector| {
        container
            .select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

fn first_href(container: ElementRef<'_>, chain: &[Selector]) -> Option<String> {
    let from_chain = chain.iter().find_map(|selector| {
        container
            .select(selector)
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())
            .map(str::to_string)
    });
    // A container that is itself the anchor carries the link.
    from_chain.or_else(|| {
        container
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string)
    })
}

fn first_date(container: ElementRef<'_>, chain: &[Selector]) -> Option<DateTime<Utc>> {
    chain.iter().find_map(|selector| {
        container.select(selector).find_map(|el| {
            el.value()
                .attr("datetime")
                .and_then(parse_timestamp)
                .or_else(|| parse_timestamp(&element_text(el)))
        })
    })
}

/// Pure extraction step, kept synchronous since `Html` is not `Send`.
pub fn extract_items(
    html: &str,
    page_url: &Url,
    selectors: &CompiledSelectors,
    source_name: &str,
    collected_at: DateTime<Utc>,
) -> PageExtraction {
    let document = Html::parse_document(html);

    let containers: Vec<ElementRef<'_>> = selectors
        .container
        .iter()
        .map(|selector| document.select(selector).collect::<Vec<_>>())
        .find(|matched| !matched.is_empty())
        .unwrap_or_default();

    let mut items = Vec::with_capacity(containers.len());
    for container in &containers {
        let Some(title) = first_text(*container, &selectors.title) else {
            debug!("Skipping container without title");
            continue;
        };
        let Some(link) = first_href(*container, &selectors.link)
            .and_then(|href| resolve_link(page_url, &href))
        else {
            debug!("Skipping \"{}\": no usable link", title);
            continue;
        };

        let published_at = first_date(*container, &selectors.date).unwrap_or(collected_at);
        let summary = first_text(*container, &selectors.summary).unwrap_or_default();

        if let Some(item) = ItemRecord::new(&title, &link, published_at, &summary, source_name) {
            items.push(item);
        }
    }

    PageExtraction {
        containers: containers.len(),
        items,
    }
}

#[async_trait]
impl SourceAdapter for ScrapeAdapter {
    fn kind(&self) -> &'static str {
        "scrape"
    }

    #[instrument(skip_all, fields(source = %descriptor.name))]
    async fn collect(
        &self,
        descriptor: &SourceDescriptor,
        ctx: CollectContext<'_>,
    ) -> Result<Vec<ItemRecord>> {
        let SourceKind::Scrape { selectors } = &descriptor.kind else {
            return Err(CollectorError::Config(format!(
                "{} is not a scrape source",
                descriptor.name
            )));
        };
        let compiled = CompiledSelectors::compile(selectors)?;
        let url = descriptor.target_url()?;
        info!("Scraping page: {}", url);

        let response = ctx.client.fetch(&url, ctx.cancel).await?;
        let extraction = extract_items(
            &response.body,
            &response.url,
            &compiled,
            &descriptor.name,
            ctx.collected_at,
        );

        if extraction.containers == 0 {
            warn!(
                "No containers matched {:?} on {}; the page layout may have changed",
                selectors.container, url
            );
        } else {
            info!(
                "Scraped {} items from {} containers on {}",
                extraction.items.len(),
                extraction.containers,
                url
            );
        }
        Ok(extraction.items)
    }
}
