//! Small helpers over `scraper` for table-shaped pages.
//!
//! `scraper::Html` is not `Send`, so every function here parses and returns
//! owned data synchronously; callers never hold a document across an await.

use scraper::{ElementRef, Html, Selector};

use crate::error::ScrapeError;

pub fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse(format!("invalid selector {css:?}: {e}")))
}

/// Visible text of an element: each text node trimmed, empty ones dropped,
/// the rest joined by single spaces.
pub fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `value` attribute of the first `<input name=...>`.
pub fn input_value(doc: &Html, name: &str) -> Result<Option<String>, ScrapeError> {
    let sel = selector(&format!("input[name=\"{name}\"]"))?;
    Ok(doc
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(str::to_string))
}

/// Data rows of a table (header row skipped), each as its `<td>` cells.
pub fn data_rows<'a>(table: ElementRef<'a>) -> Result<Vec<Vec<ElementRef<'a>>>, ScrapeError> {
    let tr = selector("tr")?;
    let td = selector("td")?;
    Ok(table
        .select(&tr)
        .skip(1)
        .map(|row| row.select(&td).collect())
        .collect())
}

/// `href` of the first link inside an element, or an empty string.
pub fn first_href(el: ElementRef<'_>) -> Result<String, ScrapeError> {
    let a = selector("a[href]")?;
    Ok(el
        .select(&a)
        .next()
        .and_then(|link| link.value().attr("href"))
        .unwrap_or_default()
        .to_string())
}
