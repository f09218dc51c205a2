//! Chromium-backed [`BrowserSession`] built on chromiumoxide.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::browser::{BrowserLauncher, BrowserOptions, BrowserSession};
use crate::TransportError;

/// Launches one Chromium process per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        options: &BrowserOptions,
    ) -> Result<Box<dyn BrowserSession>, TransportError> {
        let mut builder = BrowserConfig::builder().request_timeout(options.request_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        for arg in options.launch_args() {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(TransportError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            tracing::error!("Failed to launch Chromium: {}", e);
            TransportError::Launch(e.to_string())
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(TransportError::Launch(format!("failed to open tab: {e}")));
            }
        };

        tracing::info!("Chromium session started (headless: {})", options.headless);
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }
}

/// A single Chromium process with one tab.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), TransportError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| TransportError::Browser(format!("navigation to {url} failed: {e}")))?;
        Ok(())
    }

    async fn element_html(&mut self, selector: &str) -> Result<Option<String>, TransportError> {
        match self.page.find_element(selector).await {
            Ok(element) => element
                .outer_html()
                .await
                .map_err(|e| TransportError::Browser(e.to_string())),
            // chromiumoxide reports a missing node as a command error
            Err(_) => Ok(None),
        }
    }

    async fn page_source(&mut self) -> Result<String, TransportError> {
        self.page
            .content()
            .await
            .map_err(|e| TransportError::Browser(format!("failed to read page source: {e}")))
    }

    async fn click_link(&mut self, text: &str) -> Result<bool, TransportError> {
        let Some(literal) = xpath_literal(text) else {
            return Ok(false);
        };
        let xpath = format!("//a[normalize-space(.)={literal}]");
        let element = match self.page.find_xpath(xpath).await {
            Ok(element) => element,
            Err(_) => return Ok(false),
        };
        element
            .click()
            .await
            .map_err(|e| TransportError::Browser(format!("click on link {text:?} failed: {e}")))?;
        Ok(true)
    }

    async fn quit(mut self: Box<Self>) -> Result<(), TransportError> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        closed
            .map(|_| ())
            .map_err(|e| TransportError::Browser(format!("failed to close browser: {e}")))
    }
}

fn xpath_literal(text: &str) -> Option<String> {
    if !text.contains('\'') {
        Some(format!("'{text}'"))
    } else if !text.contains('"') {
        Some(format!("\"{text}\""))
    } else {
        None
    }
}
