//! Client-rendered sale-listing grid paged through a browser.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use scraper::Html;

use civicfeeds_transport::{with_browser, BrowserLauncher, BrowserSession, TransportError};

use crate::config::{BrowserSettings, SaleListingOptions, SourceConfig, SourceKind};
use crate::error::{acquisition_error, ScrapeError};
use crate::html::{cell_text, data_rows, first_href, selector};
use crate::record::{Record, RecordSet};
use crate::retry::{Politeness, RetryPolicy};

use super::{load_with_retry, wrong_kind, Extractor};

pub const LISTING_COLUMNS: [&str; 4] = ["Assessor Link", "Address", "Sale Date", "Sale Price"];

/// Parses one rendered page of the listing grid.
///
/// Rows with fewer than four cells (pager rows, spacers) are skipped. A page
/// without the grid yields an empty set.
pub fn parse_listing_page(html: &str, grid_id: &str) -> Result<RecordSet, ScrapeError> {
    let doc = Html::parse_document(html);
    let mut set = RecordSet::with_columns(&LISTING_COLUMNS);
    let Some(grid) = doc.select(&selector(&format!("#{grid_id}"))?).next() else {
        return Ok(set);
    };

    for cells in data_rows(grid)? {
        if cells.len() < 4 {
            continue;
        }
        set.push(
            Record::new()
                .with("Assessor Link", first_href(cells[0])?)
                .with("Address", cell_text(cells[1]))
                .with("Sale Date", cell_text(cells[2]))
                .with("Sale Price", cell_text(cells[3])),
        );
    }
    Ok(set)
}

pub struct SaleListingExtractor {
    launcher: Arc<dyn BrowserLauncher>,
    browser: BrowserSettings,
}

impl SaleListingExtractor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, browser: BrowserSettings) -> Self {
        Self { launcher, browser }
    }
}

#[async_trait]
impl Extractor for SaleListingExtractor {
    async fn extract(&self, config: &SourceConfig) -> Result<RecordSet, ScrapeError> {
        let SourceKind::SaleListings(opts) = &config.kind else {
            return Err(wrong_kind("sale_listings", config));
        };

        let options = self.browser.options(opts.headless, config.timeout());
        let job = PageWalk {
            url: config.url.clone(),
            opts: opts.clone(),
            timeout: config.timeout(),
            policy: RetryPolicy::from_config(config),
            politeness: Politeness::new(config.rate_limit()),
        };

        with_browser(&*self.launcher, &options, move |session| {
            async move { job.collect(session).await }.boxed()
        })
        .await
        .map_err(launch_as_acquisition)
    }
}

/// Launch failures arrive from `with_browser` as transport errors.
pub(super) fn launch_as_acquisition(err: ScrapeError) -> ScrapeError {
    match err {
        ScrapeError::Transport(e @ TransportError::Launch(_)) => acquisition_error(e),
        other => other,
    }
}

/// Owned state of one pagination pass over the grid.
struct PageWalk {
    url: String,
    opts: SaleListingOptions,
    timeout: Duration,
    policy: RetryPolicy,
    politeness: Politeness,
}

impl PageWalk {
    fn grid(&self) -> String {
        format!("#{}", self.opts.grid_id)
    }

    async fn collect(&self, session: &mut dyn BrowserSession) -> Result<RecordSet, ScrapeError> {
        let grid = self.grid();
        load_with_retry(
            session,
            &self.policy,
            "page 1",
            &self.url,
            Some((grid.as_str(), self.timeout)),
        )
        .await?;

        let mut all = RecordSet::with_columns(&LISTING_COLUMNS);
        let mut current = self.scrape_page(session, 1, &mut all).await?;

        for page in 2..=self.opts.max_pages {
            if !self.advance(session, &grid, page, &current).await? {
                break;
            }
            self.politeness.pause().await;
            current = self.scrape_page(session, page, &mut all).await?;
        }

        Ok(all)
    }

    /// Clicks the numbered page link and waits for the grid to re-render,
    /// retrying transient browser errors under the policy.
    ///
    /// `Ok(false)` is the exhaustion signal: no link for `page`, or the grid
    /// never changed within the timeout. A retry after a successful click only
    /// repeats the wait.
    async fn advance(
        &self,
        session: &mut dyn BrowserSession,
        grid: &str,
        page: u32,
        previous: &str,
    ) -> Result<bool, ScrapeError> {
        let label = format!("page {page} transition");
        let mut clicked = false;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_advance(session, grid, page, previous, &mut clicked).await {
                Ok(moved) => return Ok(moved),
                Err(e) => {
                    if !self.policy.backoff(&label, attempt, &e).await {
                        return Err(e.into());
                    }
                }
            }
        }
    }

    async fn try_advance(
        &self,
        session: &mut dyn BrowserSession,
        grid: &str,
        page: u32,
        previous: &str,
        clicked: &mut bool,
    ) -> Result<bool, TransportError> {
        if !*clicked {
            if !session.click_link(&page.to_string()).await? {
                tracing::info!("No link for page {}; pagination exhausted", page);
                return Ok(false);
            }
            *clicked = true;
        }
        match session.wait_for_change(grid, previous, self.timeout).await {
            Ok(()) => Ok(true),
            Err(e @ TransportError::RenderTimeout { .. }) => {
                tracing::warn!("Stopped at page {}: {}", page, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Appends the current page's rows and returns the grid HTML for change detection.
    async fn scrape_page(
        &self,
        session: &mut dyn BrowserSession,
        page: u32,
        all: &mut RecordSet,
    ) -> Result<String, ScrapeError> {
        tracing::info!("Scraping page {}", page);
        let (source, grid_html) = self.read_page(session, page).await?;
        let rows = parse_listing_page(&source, &self.opts.grid_id)?;
        tracing::debug!("Page {}: {} rows", page, rows.len());
        all.append(rows);
        Ok(grid_html)
    }

    /// Rendered source plus grid HTML, read under the retry policy.
    async fn read_page(
        &self,
        session: &mut dyn BrowserSession,
        page: u32,
    ) -> Result<(String, String), TransportError> {
        let label = format!("page {page}");
        let grid = self.grid();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let read = match session.page_source().await {
                Ok(source) => session
                    .element_html(&grid)
                    .await
                    .map(|html| (source, html.unwrap_or_default())),
                Err(e) => Err(e),
            };
            match read {
                Ok(pair) => return Ok(pair),
                Err(e) => {
                    if !self.policy.backoff(&label, attempt, &e).await {
                        return Err(e);
                    }
                }
            }
        }
    }
}
