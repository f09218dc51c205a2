//! Core of civicfeeds: per-source extractors for civic record feeds, the
//! lifecycle that drives them, and the CSV sink they persist through.
//!
//! Transport concerns (HTTP sessions, browser automation) live in
//! `civicfeeds_transport`; this crate turns their output into record sets.

pub mod calendar;
pub mod categorize;
pub mod config;
pub mod error;
pub mod extract;
pub mod html;
pub mod orchestrator;
pub mod record;
pub mod retry;
pub mod sink;
pub mod workers;

pub use civicfeeds_transport;

pub use categorize::{categorize, split_offense, CrimeCategory};
pub use config::{AppConfig, ConfigError, SourceConfig, SourceKind};
pub use error::ScrapeError;
pub use extract::{extractor_for, Extractor, ExtractorDeps};
pub use orchestrator::{run, Orchestrator, RunOutcome, RunSummary, SourceReport};
pub use record::{FieldValue, Record, RecordSet};
pub use retry::{Politeness, RetryPolicy};
pub use sink::{read_record_set, CsvSink, ProjectLayout, Sink, SinkError};
