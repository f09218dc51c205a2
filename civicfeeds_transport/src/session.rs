//! Cookie-carrying HTTP session used by the form and open-data sources.

use std::time::Duration;

use url::Url;

use crate::{user_agent::get_user_agent, TransportError};

/// An HTTP session that keeps cookies across requests.
///
/// Server-side form applications bind their anti-forgery tokens to the
/// session cookie, so the same `HttpSession` must be used for the GET that
/// reads the tokens and the POST that echoes them back.
pub struct HttpSession {
    http: reqwest::Client,
}

impl HttpSession {
    /// Creates a session with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// GETs an HTML page and returns its body.
    pub async fn get_html(&self, url: &str) -> Result<String, TransportError> {
        let resp = self
            .http
            .get(parse_url(url)?)
            .header("accept", "text/html,application/xhtml+xml")
            .header("accept-language", "en-US,en;q=0.9")
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .send()
            .await?;
        read_success_body(resp).await
    }

    /// GETs a JSON document with the given query parameters and returns the raw body.
    pub async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<String, TransportError> {
        let resp = self
            .http
            .get(parse_url(url)?)
            .query(params)
            .header("accept", "application/json, text/plain, */*")
            .send()
            .await?;
        read_success_body(resp).await
    }

    /// POSTs an urlencoded form and returns the response HTML.
    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<String, TransportError> {
        let resp = self
            .http
            .post(parse_url(url)?)
            .header("accept", "text/html,application/xhtml+xml")
            .header("referer", url)
            .form(fields)
            .send()
            .await?;
        read_success_body(resp).await
    }
}

fn parse_url(url: &str) -> Result<Url, TransportError> {
    Url::parse(url).map_err(|e| {
        tracing::error!("Invalid URL {}: {}", url, e);
        TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        }
    })
}

async fn read_success_body(resp: reqwest::Response) -> Result<String, TransportError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        let snippet = truncate_body(&body);
        tracing::warn!("Request failed with status {}: {}", status, snippet);
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
            body: snippet,
        });
    }

    Ok(body)
}

/// Resolves a possibly-relative link against a base page URL.
pub fn resolve_link(base: &str, link: &str) -> Result<String, TransportError> {
    let base = parse_url(base)?;
    base.join(link)
        .map(|u| u.to_string())
        .map_err(|e| TransportError::InvalidUrl {
            url: link.to_string(),
            reason: e.to_string(),
        })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}
