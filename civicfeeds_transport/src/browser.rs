//! Browser-automation capability used by the rendered-table sources.
//!
//! Extractors only talk to [`BrowserSession`]; the Chromium implementation
//! lives in [`crate::chromium`] and tests substitute an in-memory fake.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::TransportError;

/// How often rendered-DOM waits re-check the page.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Launch settings for one browser session.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Explicit browser executable. `None` lets the driver locate one.
    pub chrome_path: Option<PathBuf>,
    /// Extra command-line switches appended after the defaults.
    pub args: Vec<String>,
    /// Upper bound for a single browser command.
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            args: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BrowserOptions {
    /// Switches passed to every launched browser, defaults first.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }
}

/// One live browser tab.
#[async_trait]
pub trait BrowserSession: Send {
    /// Loads `url` in the current tab.
    async fn navigate(&mut self, url: &str) -> Result<(), TransportError>;

    /// Outer HTML of the first element matching a CSS selector, or `None` when absent.
    async fn element_html(&mut self, selector: &str) -> Result<Option<String>, TransportError>;

    /// Fully rendered page source.
    async fn page_source(&mut self) -> Result<String, TransportError>;

    /// Clicks the first link whose visible text equals `text`.
    ///
    /// Returns `Ok(false)` when no such link exists on the page.
    async fn click_link(&mut self, text: &str) -> Result<bool, TransportError>;

    /// Closes the browser and releases its process.
    async fn quit(self: Box<Self>) -> Result<(), TransportError>;

    /// Blocks until `selector` is present, up to `timeout`.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), TransportError> {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                if self.element_html(selector).await?.is_some() {
                    return Ok::<(), TransportError>(());
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;

        match waited {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::RenderTimeout {
                selector: selector.to_string(),
                waited: timeout,
            }),
        }
    }

    /// Blocks until `selector` is present and its HTML differs from `previous`.
    ///
    /// Used after clicking a pagination control: the grid node usually stays in
    /// the DOM while its rows are swapped, so presence alone proves nothing.
    async fn wait_for_change(
        &mut self,
        selector: &str,
        previous: &str,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                if let Some(html) = self.element_html(selector).await? {
                    if html != previous {
                        return Ok::<(), TransportError>(());
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;

        match waited {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::RenderTimeout {
                selector: selector.to_string(),
                waited: timeout,
            }),
        }
    }
}

/// Factory for browser sessions. Each call yields an independent browser.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        options: &BrowserOptions,
    ) -> Result<Box<dyn BrowserSession>, TransportError>;
}

/// Runs `f` against a freshly launched browser and always quits it afterwards,
/// whether `f` succeeds or fails.
///
/// A launch failure is returned as-is and `f` is never called.
pub async fn with_browser<T, E, F>(
    launcher: &dyn BrowserLauncher,
    options: &BrowserOptions,
    f: F,
) -> Result<T, E>
where
    E: From<TransportError>,
    F: for<'a> FnOnce(&'a mut dyn BrowserSession) -> BoxFuture<'a, Result<T, E>>,
{
    let mut session = launcher.launch(options).await?;
    let result = f(session.as_mut()).await;
    if let Err(e) = session.quit().await {
        tracing::warn!("Error quitting browser: {}", e);
    } else {
        tracing::debug!("Browser session closed");
    }
    result
}
