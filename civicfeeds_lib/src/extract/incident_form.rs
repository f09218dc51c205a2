//! Stateful postback form queried one calendar month at a time.
//!
//! Each month is one GET (to read fresh anti-forgery tokens) followed by one
//! POST echoing them back with the month's date range. The server rotates the
//! tokens on every response, so they are never reused across submissions.

use async_trait::async_trait;
use scraper::Html;

use civicfeeds_transport::HttpSession;

use crate::calendar::{form_date, month_bounds, months_between};
use crate::categorize::{categorize, split_offense};
use crate::config::{IncidentFormOptions, SourceConfig, SourceKind};
use crate::error::{acquisition_error, ScrapeError};
use crate::html::{cell_text, data_rows, input_value, selector};
use crate::record::{Record, RecordSet};
use crate::retry::{Politeness, RetryPolicy};

use super::{wrong_kind, Extractor};

pub const INCIDENT_COLUMNS: [&str; 5] =
    ["Date", "Location", "Offence", "Crime Category", "Case Details"];

const VIEW_STATE: &str = "__VIEWSTATE";
const VIEW_STATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
const EVENT_VALIDATION: &str = "__EVENTVALIDATION";

/// The three anti-forgery tokens of one form response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormTokens {
    pub view_state: String,
    pub view_state_generator: String,
    pub event_validation: String,
}

/// Reads the anti-forgery tokens from a form page.
///
/// Any missing token input means the markup changed; that fails the attempt.
pub fn extract_form_tokens(html: &str) -> Result<FormTokens, ScrapeError> {
    let doc = Html::parse_document(html);
    let token = |name: &'static str| -> Result<String, ScrapeError> {
        input_value(&doc, name)?.ok_or(ScrapeError::TokenExtraction { token: name })
    };
    Ok(FormTokens {
        view_state: token(VIEW_STATE)?,
        view_state_generator: token(VIEW_STATE_GENERATOR)?,
        event_validation: token(EVENT_VALIDATION)?,
    })
}

/// Parses the first result table of a submission response.
///
/// The header row is skipped and rows with fewer than three cells are ignored.
/// A page without any table yields an empty set.
pub fn parse_incident_table(html: &str) -> Result<RecordSet, ScrapeError> {
    let doc = Html::parse_document(html);
    let mut set = RecordSet::with_columns(&INCIDENT_COLUMNS);
    let Some(table) = doc.select(&selector("table")?).next() else {
        return Ok(set);
    };

    for cells in data_rows(table)? {
        if cells.len() < 3 {
            continue;
        }
        let (offence, case_details) = split_offense(&cell_text(cells[2]));
        let category = categorize(&offence);
        set.push(
            Record::new()
                .with("Date", cell_text(cells[0]))
                .with("Location", cell_text(cells[1]))
                .with("Offence", offence)
                .with("Crime Category", category.as_str())
                .with("Case Details", case_details),
        );
    }
    Ok(set)
}

/// Extractor for the police-activity postback form.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncidentFormExtractor;

impl IncidentFormExtractor {
    async fn scrape_month(
        &self,
        session: &HttpSession,
        config: &SourceConfig,
        opts: &IncidentFormOptions,
        politeness: Politeness,
        year: i32,
        month: u32,
    ) -> Result<RecordSet, ScrapeError> {
        let page = session.get_html(&config.url).await?;
        let tokens = extract_form_tokens(&page)?;

        let (first, last) = month_bounds(year, month)?;
        let fields = &opts.form_fields;
        let form = vec![
            (VIEW_STATE.to_string(), tokens.view_state),
            (VIEW_STATE_GENERATOR.to_string(), tokens.view_state_generator),
            (EVENT_VALIDATION.to_string(), tokens.event_validation),
            (fields.start_date.clone(), form_date(first)),
            (fields.end_date.clone(), form_date(last)),
            (fields.submit.clone(), fields.submit_value.clone()),
        ];

        let submitted = session.post_form(&config.url, &form).await;
        politeness.pause().await;
        let body = submitted?;

        parse_incident_table(&body)
    }
}

#[async_trait]
impl Extractor for IncidentFormExtractor {
    async fn extract(&self, config: &SourceConfig) -> Result<RecordSet, ScrapeError> {
        let SourceKind::IncidentForm(opts) = &config.kind else {
            return Err(wrong_kind("incident_form", config));
        };

        let session = HttpSession::new(config.timeout()).map_err(acquisition_error)?;
        let policy = RetryPolicy::from_config(config);
        let politeness = Politeness::new(config.rate_limit());

        let months = months_between(
            (opts.start_year, opts.start_month),
            (opts.resolved_end_year(), opts.end_month),
        );

        let mut all = RecordSet::with_columns(&INCIDENT_COLUMNS);
        let mut failed = 0usize;
        let mut last_error = None;

        let session = &session;
        for (year, month) in months.iter().copied() {
            let label = format!("{}-{:02}", year, month);
            tracing::info!("Scraping data for {}", label);

            let result = policy
                .run(&label, |_| {
                    self.scrape_month(session, config, opts, politeness, year, month)
                })
                .await;

            match result {
                Ok(month_set) => {
                    tracing::debug!("{}: {} records", label, month_set.len());
                    if !month_set.is_empty() {
                        all.append(month_set);
                    }
                }
                Err(e) => {
                    tracing::error!("Error scraping {}: {}", label, e);
                    failed += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        if failed > 0 {
            tracing::warn!(
                "{} of {} months failed; continuing with {} records",
                failed,
                months.len(),
                all.len()
            );
        }
        if failed == months.len() && failed > 0 {
            return Err(ScrapeError::Exhausted {
                failed,
                last: last_error.unwrap_or_default(),
            });
        }

        Ok(all)
    }
}
