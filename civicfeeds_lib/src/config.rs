//! Scraper configuration loaded from YAML.
//!
//! One `AppConfig` holds the data-directory layout, browser settings and a
//! `SourceConfig` per named source. Source-specific knobs live in the
//! `kind`-tagged [`SourceKind`] enum.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Datelike;
use civicfeeds_transport::BrowserOptions;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides `browser.chrome_path`.
pub const CHROME_PATH_ENV: &str = "CIVICFEEDS_CHROME_PATH";
pub const CONFIG_ENV: &str = "CIVICFEEDS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Config file to read: the explicit path, else `$CIVICFEEDS_CONFIG`, else `config.yaml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("scraper configuration not found: {0}")]
    UnknownSource(String),
    #[error("invalid configuration for {source_name}: {reason}")]
    Invalid { source_name: String, reason: String },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Root that relative data directories are resolved against.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default)]
    pub data_dirs: DataDirs,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub scrapers: BTreeMap<String, SourceConfig>,
}

/// Logical data directories and where they live relative to the project root.
#[derive(Debug, Clone, Deserialize)]
pub struct DataDirs {
    #[serde(default = "default_external_dir")]
    pub external: PathBuf,
    #[serde(default = "default_raw_dir")]
    pub raw: PathBuf,
    #[serde(default = "default_interim_dir")]
    pub interim: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed: PathBuf,
}

impl Default for DataDirs {
    fn default() -> Self {
        Self {
            external: default_external_dir(),
            raw: default_raw_dir(),
            interim: default_interim_dir(),
            processed: default_processed_dir(),
        }
    }
}

impl DataDirs {
    pub const NAMES: [&'static str; 4] = ["external", "raw", "interim", "processed"];

    /// Maps a logical directory name to a path relative to the project root.
    ///
    /// Unknown names are used literally under `data/`.
    pub fn relative(&self, dir: &str) -> PathBuf {
        match dir {
            "external" => self.external.clone(),
            "raw" => self.raw.clone(),
            "interim" => self.interim.clone(),
            "processed" => self.processed.clone(),
            other => Path::new("data").join(other),
        }
    }
}

fn default_external_dir() -> PathBuf {
    PathBuf::from("data/0_external")
}
fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/1_raw")
}
fn default_interim_dir() -> PathBuf {
    PathBuf::from("data/2_interim")
}
fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/3_processed")
}

/// Browser deployment settings shared by every browser-driven source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowserSettings {
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl BrowserSettings {
    pub fn options(&self, headless: bool, timeout: Duration) -> BrowserOptions {
        BrowserOptions {
            headless,
            chrome_path: self.chrome_path.clone(),
            args: self.args.clone(),
            request_timeout: timeout,
        }
    }
}

/// Immutable settings for one source, read-only for the whole run.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Human-readable name used in logs. Defaults to the config key.
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    pub output_file: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Politeness delay after every request, in seconds.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: f64,
    /// Total attempt budget for one sub-unit (month, page, bulk request).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request and per-wait timeout, in seconds.
    #[serde(default = "default_timeout", rename = "timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(flatten)]
    pub kind: SourceKind,
}

fn default_output_dir() -> String {
    "raw".to_string()
}
fn default_rate_limit() -> f64 {
    2.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout() -> u64 {
    30
}

/// Exponential backoff settings: `base * 2^attempt`, clamped to `[min, max]`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_min_ms")]
    pub min_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            min_ms: default_min_ms(),
            max_ms: default_max_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_base_ms() -> u64 {
    1000
}
fn default_min_ms() -> u64 {
    2000
}
fn default_max_ms() -> u64 {
    10000
}
fn default_jitter() -> bool {
    true
}

/// Source-specific settings, selected by the `kind` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Server-rendered postback form queried month by month.
    IncidentForm(IncidentFormOptions),
    /// REST/JSON open-data endpoint fetched in one bulk request.
    OpenData(OpenDataOptions),
    /// Client-rendered paginated sale listing grid.
    SaleListings(SaleListingOptions),
    /// Per-property assessor detail pages, fetched by a worker pool.
    PropertyDetails(PropertyDetailOptions),
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::IncidentForm(_) => "incident_form",
            Self::OpenData(_) => "open_data",
            Self::SaleListings(_) => "sale_listings",
            Self::PropertyDetails(_) => "property_details",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentFormOptions {
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// Defaults to the current calendar year.
    #[serde(default)]
    pub end_year: Option<i32>,
    /// First month scraped in `start_year`.
    #[serde(default = "default_start_month")]
    pub start_month: u32,
    /// Last month scraped in the final year.
    #[serde(default = "default_end_month")]
    pub end_month: u32,
    #[serde(default)]
    pub form_fields: FormFields,
}

impl IncidentFormOptions {
    pub fn resolved_end_year(&self) -> i32 {
        self.end_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}

fn default_start_year() -> i32 {
    2015
}
fn default_start_month() -> u32 {
    1
}
fn default_end_month() -> u32 {
    12
}

/// Names of the postback form inputs carrying the date range.
#[derive(Debug, Clone, Deserialize)]
pub struct FormFields {
    #[serde(default = "default_start_field")]
    pub start_date: String,
    #[serde(default = "default_end_field")]
    pub end_date: String,
    #[serde(default = "default_submit_field")]
    pub submit: String,
    #[serde(default = "default_submit_value")]
    pub submit_value: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            start_date: default_start_field(),
            end_date: default_end_field(),
            submit: default_submit_field(),
            submit_value: default_submit_value(),
        }
    }
}

fn default_start_field() -> String {
    "ctl00$ContentPlaceHolder1$txtStartDate".to_string()
}
fn default_end_field() -> String {
    "ctl00$ContentPlaceHolder1$txtEndDate".to_string()
}
fn default_submit_field() -> String {
    "ctl00$ContentPlaceHolder1$btnSubmit".to_string()
}
fn default_submit_value() -> String {
    "Submit".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenDataOptions {
    /// Server-side record cap (`$limit`).
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Deterministic ordering clause (`$order`).
    #[serde(default = "default_order_by")]
    pub order_by: String,
}

fn default_limit() -> u64 {
    1_000_000
}
fn default_order_by() -> String {
    "occurred_date_or_date_range_start DESC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaleListingOptions {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// DOM id of the result grid.
    #[serde(default = "default_grid_id")]
    pub grid_id: String,
}

fn default_max_pages() -> u32 {
    200
}
fn default_headless() -> bool {
    true
}
fn default_grid_id() -> String {
    "GridView1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDetailOptions {
    /// Sale listing CSV providing the (Sale Date, Assessor Link) keys.
    pub input_file: String,
    #[serde(default = "default_output_dir")]
    pub input_dir: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_workers() -> usize {
    4
}

/// Where a finished record set is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// Logical data directory (`raw`, `interim`, ...).
    pub dir: String,
    pub file: String,
}

impl SourceConfig {
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(key)
    }

    pub fn output(&self) -> OutputTarget {
        OutputTarget {
            dir: self.output_dir.clone(),
            file: self.output_file.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Pause between requests. Values `validate` rejects map to zero.
    pub fn rate_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.rate_limit_seconds).unwrap_or_default()
    }

    /// Checks invariants that serde defaults cannot express.
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            source_name: key.to_string(),
            reason: reason.to_string(),
        };

        if self.url.trim().is_empty() {
            return Err(invalid("url must not be empty"));
        }
        if self.output_file.trim().is_empty() {
            return Err(invalid("output_file must not be empty"));
        }
        if self.max_retries == 0 {
            return Err(invalid("max_retries must be at least 1"));
        }
        if Duration::try_from_secs_f64(self.rate_limit_seconds).is_err() {
            return Err(invalid(
                "rate_limit_seconds must be a non-negative number of representable size",
            ));
        }
        if self.backoff.min_ms > self.backoff.max_ms {
            return Err(invalid("backoff.min_ms must not exceed backoff.max_ms"));
        }

        match &self.kind {
            SourceKind::IncidentForm(opts) => {
                if !(1..=12).contains(&opts.start_month) || !(1..=12).contains(&opts.end_month) {
                    return Err(invalid("start_month and end_month must be within 1..=12"));
                }
                let end_year = opts.resolved_end_year();
                if end_year < opts.start_year {
                    return Err(invalid("end_year must not precede start_year"));
                }
                if end_year == opts.start_year && opts.end_month < opts.start_month {
                    return Err(invalid("end_month must not precede start_month"));
                }
            }
            SourceKind::OpenData(opts) => {
                if opts.limit == 0 {
                    return Err(invalid("limit must be at least 1"));
                }
            }
            SourceKind::SaleListings(opts) => {
                if opts.max_pages == 0 {
                    return Err(invalid("max_pages must be at least 1"));
                }
            }
            SourceKind::PropertyDetails(opts) => {
                if opts.workers == 0 {
                    return Err(invalid("workers must be at least 1"));
                }
                if opts.input_file.trim().is_empty() {
                    return Err(invalid("input_file must not be empty"));
                }
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Reads and parses a YAML configuration file, then applies env overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(CHROME_PATH_ENV) {
            if !path.trim().is_empty() {
                self.browser.chrome_path = Some(PathBuf::from(path));
            }
        }
    }

    /// Project root, falling back to `cwd` when the file does not set one.
    pub fn project_root(&self, cwd: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => cwd.join(root),
            None => cwd.to_path_buf(),
        }
    }

    /// Looks up a source by key and validates it.
    pub fn source(&self, key: &str) -> Result<&SourceConfig, ConfigError> {
        let source = self
            .scrapers
            .get(key)
            .ok_or_else(|| ConfigError::UnknownSource(key.to_string()))?;
        source.validate(key)?;
        Ok(source)
    }

    /// Keys of every source marked `enabled`, in key order.
    pub fn enabled_sources(&self) -> Vec<&str> {
        self.scrapers
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}
