//! Error types for the transport layer.

use std::time::Duration;

/// Errors raised while talking to a remote source, over HTTP or through a browser.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read
    /// (connection refused, DNS failure, request timeout).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// A URL could not be built from the configured endpoint.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// The browser process could not be started.
    #[error("failed to launch browser: {0}")]
    Launch(String),
    /// A browser command (navigate, click, evaluate) failed.
    #[error("browser command failed: {0}")]
    Browser(String),
    /// A rendered-DOM wait expired before the element appeared.
    #[error("timed out after {waited:?} waiting for {selector}")]
    RenderTimeout { selector: String, waited: Duration },
}

impl TransportError {
    /// Whether a fresh attempt has a chance of succeeding.
    ///
    /// Launch failures are resource-acquisition errors and are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Browser(_) | Self::RenderTimeout { .. } => true,
            Self::HttpStatus { .. } => true,
            Self::InvalidUrl { .. } | Self::Launch(_) => false,
        }
    }
}
