//! Assessor detail pages for every previously scraped sale listing.
//!
//! Input keys come from the sale-listing CSV. Pages are fetched by a pool of
//! workers, each driving its own browser over a round-robin share of the keys.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::FutureExt;
use regex::Regex;
use scraper::{ElementRef, Html};

use civicfeeds_transport::{resolve_link, with_browser, BrowserLauncher, BrowserSession};

use crate::config::{BrowserSettings, SourceConfig, SourceKind};
use crate::error::ScrapeError;
use crate::html::{cell_text, selector};
use crate::record::{Record, RecordSet};
use crate::retry::{Politeness, RetryPolicy};
use crate::sink::{read_record_set, ProjectLayout};
use crate::workers::run_partitioned;

use super::sale_listings::launch_as_acquisition;
use super::{load_with_retry, wrong_kind, Extractor};

pub const DETAIL_COLUMNS: [&str; 9] = [
    "Unique ID",
    "Sale Date",
    "Assessor Link",
    "Neighborhood",
    "Land Acres",
    "Built Sq ft",
    "Bedrooms",
    "Bathrooms",
    "Year Built",
];

const MISSING: &str = "0";

/// One sale to enrich: the listing's date and its assessor link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyKey {
    pub sale_date: String,
    pub link: String,
}

impl PropertyKey {
    /// Join key shared with the listing data.
    pub fn unique_id(&self) -> String {
        format!("{}_sep_{}", self.sale_date, self.link)
    }
}

/// Keys of every listing row that carries an assessor link.
pub fn keys_from_listings(listings: &RecordSet) -> Vec<PropertyKey> {
    listings
        .records()
        .iter()
        .filter_map(|r| {
            let link = r.text("Assessor Link")?.trim();
            if link.is_empty() {
                return None;
            }
            Some(PropertyKey {
                sale_date: r.text("Sale Date").unwrap_or_default().to_string(),
                link: link.to_string(),
            })
        })
        .collect()
}

/// Fields read from one assessor page. Anything not found is `"0"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDetail {
    pub neighborhood: String,
    pub land_acres: String,
    pub built_sq_ft: String,
    pub bedrooms: String,
    pub bathrooms: String,
    pub year_built: String,
}

impl Default for PropertyDetail {
    fn default() -> Self {
        Self {
            neighborhood: MISSING.into(),
            land_acres: MISSING.into(),
            built_sq_ft: MISSING.into(),
            bedrooms: MISSING.into(),
            bathrooms: MISSING.into(),
            year_built: MISSING.into(),
        }
    }
}

impl PropertyDetail {
    fn into_record(self, key: &PropertyKey) -> Record {
        Record::new()
            .with("Unique ID", key.unique_id())
            .with("Sale Date", key.sale_date.as_str())
            .with("Assessor Link", key.link.as_str())
            .with("Neighborhood", self.neighborhood)
            .with("Land Acres", self.land_acres)
            .with("Built Sq ft", self.built_sq_ft)
            .with("Bedrooms", self.bedrooms)
            .with("Bathrooms", self.bathrooms)
            .with("Year Built", self.year_built)
    }
}

fn year_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]{4}$").ok()).as_ref()
}

/// Header and data cells of a section, in document order.
fn section_cells<'a>(doc: &'a Html, css: &str) -> Result<Option<Vec<ElementRef<'a>>>, ScrapeError> {
    let cells = selector("th, td")?;
    Ok(doc
        .select(&selector(css)?)
        .next()
        .map(|section| section.select(&cells).collect()))
}

/// Text of the `skip`-th `<td>` following the cell labelled `label`.
fn value_after(cells: &[ElementRef<'_>], label: &str, skip: usize) -> Option<String> {
    let at = cells.iter().position(|c| cell_text(*c) == label)?;
    cells[at + 1..]
        .iter()
        .filter(|c| c.value().name() == "td")
        .nth(skip)
        .map(|c| cell_text(*c))
        .filter(|text| !text.is_empty())
}

/// Sum of every `Bath*` row. Any unparseable count, or an overflowing sum,
/// voids the total.
fn bathroom_total(cells: &[ElementRef<'_>]) -> Option<String> {
    let mut total = 0u32;
    for (at, cell) in cells.iter().enumerate() {
        if !cell_text(*cell).contains("Bath") {
            continue;
        }
        let value = cells[at + 1..]
            .iter()
            .find(|c| c.value().name() == "td")
            .map(|c| cell_text(*c))?;
        total = total.checked_add(value.trim().parse::<u32>().ok()?)?;
    }
    Some(total.to_string())
}

/// Extracts the enrichment fields from an assessor detail page.
///
/// Row-level gaps degrade to `"0"`. When the building section (or its
/// `State Code:` row) is missing, all building fields stay `"0"`.
pub fn parse_property_detail(html: &str) -> Result<PropertyDetail, ScrapeError> {
    let doc = Html::parse_document(html);
    let mut detail = PropertyDetail::default();

    if let Some(cells) = section_cells(&doc, "div#propertyDetails")? {
        if let Some(v) = value_after(&cells, "Neighborhood:", 0) {
            detail.neighborhood = v;
        }
        if let Some(v) = value_after(&cells, "Legal Acres:", 0) {
            detail.land_acres = v;
        }
    }

    let Some(building) = section_cells(&doc, "div#improvementBuildingDetails")? else {
        return Ok(detail);
    };
    let Some(sq_ft) = value_after(&building, "State Code:", 1) else {
        return Ok(detail);
    };
    detail.built_sq_ft = sq_ft;
    if let Some(v) = value_after(&building, "Number of Bedrooms:", 0) {
        detail.bedrooms = v;
    }
    if let Some(v) = bathroom_total(&building) {
        detail.bathrooms = v;
    }

    let year = match (doc.select(&selector("table.improvementDetails")?).next(), year_pattern()) {
        (Some(table), Some(pattern)) => table
            .text()
            .map(str::trim)
            .find(|t| pattern.is_match(t))
            .map(str::to_string),
        _ => None,
    };
    if let Some(v) = year {
        detail.year_built = v;
    }

    Ok(detail)
}

pub struct PropertyDetailExtractor {
    launcher: Arc<dyn BrowserLauncher>,
    browser: BrowserSettings,
    layout: ProjectLayout,
}

impl PropertyDetailExtractor {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        browser: BrowserSettings,
        layout: ProjectLayout,
    ) -> Self {
        Self {
            launcher,
            browser,
            layout,
        }
    }
}

#[async_trait]
impl Extractor for PropertyDetailExtractor {
    async fn extract(&self, config: &SourceConfig) -> Result<RecordSet, ScrapeError> {
        let SourceKind::PropertyDetails(opts) = &config.kind else {
            return Err(wrong_kind("property_details", config));
        };

        let input = self.layout.data_dir(&opts.input_dir).join(&opts.input_file);
        let listings = read_record_set(&input)?;
        let keys = keys_from_listings(&listings);
        if keys.is_empty() {
            tracing::warn!("No assessor links in {}", input.display());
            return Ok(RecordSet::with_columns(&DETAIL_COLUMNS));
        }
        tracing::info!(
            "Scraping {} properties with {} workers",
            keys.len(),
            opts.workers.min(keys.len())
        );

        let options = self.browser.options(opts.headless, config.timeout());
        let job = Arc::new(DetailJob {
            base_url: config.url.clone(),
            policy: RetryPolicy::from_config(config),
            politeness: Politeness::new(config.rate_limit()),
        });

        let parts = run_partitioned(keys, opts.workers, |worker, keys| {
            let job = Arc::clone(&job);
            let launcher = Arc::clone(&self.launcher);
            let options = options.clone();
            async move {
                with_browser(&*launcher, &options, move |session| {
                    async move { job.scrape_partition(worker, session, keys).await }.boxed()
                })
                .await
                .map_err(launch_as_acquisition)
            }
        })
        .await?;

        let total = parts.iter().map(|p| p.records.len() + p.failed).sum::<usize>();
        let failed = parts.iter().map(|p| p.failed).sum::<usize>();
        if failed == total {
            let last = parts
                .into_iter()
                .rev()
                .find_map(|p| p.last_error)
                .unwrap_or_default();
            return Err(ScrapeError::Exhausted { failed, last });
        }

        let mut all = RecordSet::with_columns(&DETAIL_COLUMNS);
        for part in parts {
            all.append(part.records);
        }
        Ok(all)
    }
}

/// One worker's records plus its failure tally.
struct DetailPartition {
    records: RecordSet,
    failed: usize,
    last_error: Option<String>,
}

struct DetailJob {
    base_url: String,
    policy: RetryPolicy,
    politeness: Politeness,
}

impl DetailJob {
    async fn scrape_partition(
        &self,
        worker: usize,
        session: &mut dyn BrowserSession,
        keys: Vec<PropertyKey>,
    ) -> Result<DetailPartition, ScrapeError> {
        let mut set = RecordSet::with_columns(&DETAIL_COLUMNS);
        let mut failed = 0usize;
        let mut last_error = None;

        for (done, key) in keys.iter().enumerate() {
            match self.scrape_one(session, key).await {
                Ok(detail) => set.push(detail.into_record(key)),
                Err(e) => {
                    tracing::error!("Worker {}: error scraping {}: {}", worker, key.link, e);
                    failed += 1;
                    last_error = Some(e.to_string());
                }
            }
            self.politeness.pause().await;
            if (done + 1) % 50 == 0 {
                tracing::info!("Worker {}: {}/{} properties", worker, done + 1, keys.len());
            }
        }

        if failed > 0 {
            tracing::warn!("Worker {}: {} of {} properties failed", worker, failed, keys.len());
        }
        Ok(DetailPartition {
            records: set,
            failed,
            last_error,
        })
    }

    async fn scrape_one(
        &self,
        session: &mut dyn BrowserSession,
        key: &PropertyKey,
    ) -> Result<PropertyDetail, ScrapeError> {
        let url = resolve_link(&self.base_url, &key.link)?;
        tracing::debug!("Loading {}", url);
        load_with_retry(session, &self.policy, &key.link, &url, None).await?;
        let source = session.page_source().await?;
        parse_property_detail(&source)
    }
}
