#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use civicfeeds_lib::civicfeeds_transport::{
    BrowserLauncher, BrowserOptions, BrowserSession, TransportError,
};

/// Static content served by the fake browser.
#[derive(Default)]
pub struct FakeSite {
    /// Rendered listing grid, page `n` at index `n - 1`.
    pub listing_pages: Vec<String>,
    /// Detail pages keyed by absolute URL.
    pub details: HashMap<String, String>,
    /// URLs whose navigation always fails.
    pub failing: Vec<String>,
    /// Listing page number -> remaining `page_source` failures on that page.
    pub read_failures: Mutex<HashMap<usize, usize>>,
    /// Listing page number -> remaining failures clicking its link.
    pub click_failures: Mutex<HashMap<usize, usize>>,
    pub visits: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    fn take_failure(map: &Mutex<HashMap<usize, usize>>, page: usize) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(&page) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

pub struct FakeBrowser {
    site: Arc<FakeSite>,
    current: String,
    page: usize,
    quits: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), TransportError> {
        self.site.visits.lock().unwrap().push(url.to_string());
        if self.site.failing.iter().any(|u| u == url) {
            return Err(TransportError::Browser(format!("net::ERR_FAILED at {url}")));
        }
        self.current = match self.site.details.get(url) {
            Some(html) => html.clone(),
            None => self.site.listing_pages.first().cloned().unwrap_or_default(),
        };
        self.page = 1;
        Ok(())
    }

    async fn element_html(&mut self, selector: &str) -> Result<Option<String>, TransportError> {
        let id = selector.trim_start_matches('#');
        if self.current.contains(&format!("id=\"{id}\"")) {
            Ok(Some(self.current.clone()))
        } else {
            Ok(None)
        }
    }

    async fn page_source(&mut self) -> Result<String, TransportError> {
        if FakeSite::take_failure(&self.site.read_failures, self.page) {
            return Err(TransportError::Browser("target closed while reading".into()));
        }
        Ok(self.current.clone())
    }

    async fn click_link(&mut self, text: &str) -> Result<bool, TransportError> {
        match text.parse::<usize>() {
            Ok(n) if n >= 1 && n <= self.site.listing_pages.len() => {
                if FakeSite::take_failure(&self.site.click_failures, n) {
                    return Err(TransportError::Browser("node is detached".into()));
                }
                self.current = self.site.listing_pages[n - 1].clone();
                self.page = n;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn quit(self: Box<Self>) -> Result<(), TransportError> {
        self.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub site: Arc<FakeSite>,
    pub launches: AtomicUsize,
    pub quits: Arc<AtomicUsize>,
    pub fail: bool,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Arc<Self> {
        Arc::new(Self {
            site: Arc::new(site),
            launches: AtomicUsize::new(0),
            quits: Arc::new(AtomicUsize::new(0)),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            site: Arc::new(FakeSite::default()),
            launches: AtomicUsize::new(0),
            quits: Arc::new(AtomicUsize::new(0)),
            fail: true,
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(
        &self,
        _options: &BrowserOptions,
    ) -> Result<Box<dyn BrowserSession>, TransportError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TransportError::Launch("chrome binary not found".into()));
        }
        Ok(Box::new(FakeBrowser {
            site: Arc::clone(&self.site),
            current: String::new(),
            page: 0,
            quits: Arc::clone(&self.quits),
        }))
    }
}

/// One rendered grid page with `rows` sale rows numbered from `first`.
pub fn listing_page(page: usize, first: usize, rows: usize) -> String {
    let mut html = String::from(
        "<table id=\"GridView1\"><tr><th>Link</th><th>Address</th><th>Sale Date</th><th>Price</th></tr>",
    );
    for n in first..first + rows {
        html.push_str(&format!(
            "<tr><td><a href=\"Property.aspx?prop_id={n}\">View</a></td>\
             <td>{n} Holly St</td><td>03/{day:02}/2021</td><td>${n}00,000</td></tr>",
            day = page,
        ));
    }
    html.push_str(&format!("<tr><td colspan=\"4\">page {page}</td></tr></table>"));
    html
}

/// Assessor page for property `n`.
pub fn detail_page(n: usize) -> String {
    format!(
        r#"<div id="propertyDetails"><table>
            <tr><th>Neighborhood:</th><td>Hood {n}</td></tr>
            <tr><th>Legal Acres:</th><td>0.{n}</td></tr>
        </table></div>
        <div id="improvementBuildingDetails"><table>
            <tr><th>State Code:</th><td>11</td><th>Living Area:</th><td>{n}000</td></tr>
            <tr><th>Number of Bedrooms:</th><td>{n}</td></tr>
            <tr><th>Bath - Full:</th><td>1</td></tr>
        </table>
        <table class="improvementDetails"><tr><td>19{n:02}</td></tr></table></div>"#
    )
}
