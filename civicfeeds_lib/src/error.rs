//! Error types for the library layer.

use civicfeeds_transport::TransportError;

use crate::sink::SinkError;

/// Errors produced while extracting a record set from a source.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    /// HTTP or browser failure, including render timeouts and non-2xx statuses.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A required anti-forgery token input is missing from the form page.
    #[error("form token {token} not found in page")]
    TokenExtraction { token: &'static str },
    /// The response body was not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The response parsed but did not have the expected shape.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
    /// A selector or pattern could not be compiled, or a value could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A browser or session could not be created.
    #[error("could not acquire {0}")]
    ResourceAcquisition(String),
    /// An extractor was handed the configuration of another source kind.
    #[error("expected a {expected} source, got {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
    /// Every sub-unit of a ranged extraction failed; nothing was collected.
    #[error("all {failed} sub-units failed; last error: {last}")]
    Exhausted { failed: usize, last: String },
    /// A year/month pair outside the calendar.
    #[error("invalid date: {year}-{month:02}")]
    InvalidDate { year: i32, month: u32 },
    /// Reading an input file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

impl ScrapeError {
    /// Whether another attempt at the same sub-unit may succeed.
    ///
    /// Transport failures and missing form tokens are retried; shape, parse,
    /// resource-acquisition and persistence errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::TokenExtraction { .. } => true,
            _ => false,
        }
    }
}

/// Convert a browser launch failure into the resource-acquisition variant so the
/// orchestrator can tell it apart from an ordinary transport error.
pub(crate) fn acquisition_error(err: TransportError) -> ScrapeError {
    match err {
        TransportError::Launch(msg) => ScrapeError::ResourceAcquisition(format!("browser: {msg}")),
        other => ScrapeError::Transport(other),
    }
}
