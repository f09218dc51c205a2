//! Source extractors: one type per transport contract, one shared capability.

mod incident_form;
mod open_data;
mod property_details;
mod sale_listings;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use civicfeeds_transport::{BrowserLauncher, BrowserSession};

use crate::config::{BrowserSettings, SourceConfig, SourceKind};
use crate::error::ScrapeError;
use crate::record::RecordSet;
use crate::retry::RetryPolicy;
use crate::sink::ProjectLayout;

pub use incident_form::{
    extract_form_tokens, parse_incident_table, FormTokens, IncidentFormExtractor,
    INCIDENT_COLUMNS,
};
pub use open_data::{flatten_json_records, OpenDataExtractor};
pub use property_details::{
    keys_from_listings, parse_property_detail, PropertyDetail, PropertyDetailExtractor,
    PropertyKey, DETAIL_COLUMNS,
};
pub use sale_listings::{parse_listing_page, SaleListingExtractor, LISTING_COLUMNS};

/// Produces a record set from one configured source.
///
/// Implementations own their transient session or browser state and release
/// it before returning, on every path.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, config: &SourceConfig) -> Result<RecordSet, ScrapeError>;
}

/// Shared collaborators handed to extractors that need them.
#[derive(Clone)]
pub struct ExtractorDeps {
    pub launcher: Arc<dyn BrowserLauncher>,
    pub browser: BrowserSettings,
    pub layout: ProjectLayout,
}

/// Picks the extractor matching a source's `kind`.
pub fn extractor_for(config: &SourceConfig, deps: &ExtractorDeps) -> Box<dyn Extractor> {
    match &config.kind {
        SourceKind::IncidentForm(_) => Box::new(IncidentFormExtractor),
        SourceKind::OpenData(_) => Box::new(OpenDataExtractor),
        SourceKind::SaleListings(_) => Box::new(SaleListingExtractor::new(
            Arc::clone(&deps.launcher),
            deps.browser.clone(),
        )),
        SourceKind::PropertyDetails(_) => Box::new(PropertyDetailExtractor::new(
            Arc::clone(&deps.launcher),
            deps.browser.clone(),
            deps.layout.clone(),
        )),
    }
}

fn wrong_kind(expected: &'static str, config: &SourceConfig) -> ScrapeError {
    ScrapeError::WrongKind {
        expected,
        found: config.kind.label(),
    }
}

/// Navigates to `url` and optionally waits for `ready`, retrying the pair
/// under `policy`.
async fn load_with_retry(
    session: &mut dyn BrowserSession,
    policy: &RetryPolicy,
    label: &str,
    url: &str,
    ready: Option<(&str, Duration)>,
) -> Result<(), ScrapeError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let loaded = match (session.navigate(url).await, ready) {
            (Ok(()), Some((selector, timeout))) => session.wait_for(selector, timeout).await,
            (outcome, _) => outcome,
        };
        match loaded {
            Ok(()) => return Ok(()),
            Err(e) => {
                if !policy.backoff(label, attempt, &e).await {
                    return Err(e.into());
                }
            }
        }
    }
}
