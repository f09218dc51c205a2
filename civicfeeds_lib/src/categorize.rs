//! Free-text normalization for incident reports: offense categories and the
//! combined "offense - case" cell.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Fixed offense taxonomy. Declaration order is match priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CrimeCategory {
    Property,
    Violent,
    Drug,
    Traffic,
    Other,
}

/// Keyword classes checked in order; the first class with a matching keyword wins.
const KEYWORD_CLASSES: &[(CrimeCategory, &[&str])] = &[
    (CrimeCategory::Property, &["theft", "burglary", "robbery", "stolen"]),
    (CrimeCategory::Violent, &["assault", "battery", "homicide", "violence"]),
    (CrimeCategory::Drug, &["drug", "narcotic", "controlled substance"]),
    (CrimeCategory::Traffic, &["traffic", "dui", "driving"]),
];

impl CrimeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Property => "Property",
            Self::Violent => "Violent",
            Self::Drug => "Drug",
            Self::Traffic => "Traffic",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for CrimeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an offense description to its category by case-insensitive substring match.
///
/// Total: anything that matches no keyword is `Other`.
pub fn categorize(offense: &str) -> CrimeCategory {
    let lower = offense.to_lowercase();
    KEYWORD_CLASSES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(CrimeCategory::Other)
}

fn case_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)^(.*?)\s*-\s*Case\s*#?\s*(.+)$").ok())
        .as_ref()
}

/// Splits `"<offense> - Case #<id>"` into offense and case id.
///
/// Without the delimiter the whole (trimmed) cell is the offense and the case id is empty.
pub fn split_offense(cell: &str) -> (String, String) {
    let cell = cell.trim();
    match case_pattern().and_then(|re| re.captures(cell)) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (cell.to_string(), String::new()),
    }
}
