//! Bulk JSON feed with a server-side record cap and explicit ordering.

use async_trait::async_trait;
use serde_json::{Map, Value};

use civicfeeds_transport::HttpSession;

use crate::config::{SourceConfig, SourceKind};
use crate::error::{acquisition_error, ScrapeError};
use crate::record::{FieldValue, Record, RecordSet};
use crate::retry::{Politeness, RetryPolicy};

use super::{wrong_kind, Extractor};

/// Flattens a JSON array of objects into records.
///
/// Nested objects become dotted keys (`location.latitude`), arrays are kept as
/// their JSON text. The schema is the union of keys across records: records are
/// visited in order, and each record contributes its new keys sorted by name.
/// Keys missing from a record stay absent.
pub fn flatten_json_records(payload: &Value) -> Result<RecordSet, ScrapeError> {
    let Value::Array(items) = payload else {
        return Err(ScrapeError::UnexpectedPayload(format!(
            "expected a JSON array, got {}",
            json_kind(payload)
        )));
    };

    let mut set = RecordSet::default();
    for item in items {
        let Value::Object(map) = item else {
            return Err(ScrapeError::UnexpectedPayload(format!(
                "expected array of objects, found {}",
                json_kind(item)
            )));
        };
        let mut record = Record::new();
        flatten_into(&mut record, "", map);
        set.push(record);
    }
    Ok(set)
}

fn flatten_into(record: &mut Record, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(record, &name, inner),
            Value::String(s) => record.insert(&name, s.as_str()),
            Value::Number(n) => record.insert(&name, FieldValue::Number(n.clone())),
            Value::Bool(b) => record.insert(&name, FieldValue::Bool(*b)),
            Value::Null => record.insert(&name, FieldValue::Null),
            Value::Array(_) => record.insert(&name, value.to_string()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenDataExtractor;

#[async_trait]
impl Extractor for OpenDataExtractor {
    async fn extract(&self, config: &SourceConfig) -> Result<RecordSet, ScrapeError> {
        let SourceKind::OpenData(opts) = &config.kind else {
            return Err(wrong_kind("open_data", config));
        };

        let session = HttpSession::new(config.timeout()).map_err(acquisition_error)?;
        let policy = RetryPolicy::from_config(config);
        let politeness = Politeness::new(config.rate_limit());
        let params = [
            ("$limit", opts.limit.to_string()),
            ("$order", opts.order_by.clone()),
        ];

        let (session, params) = (&session, &params);
        tracing::info!("Fetching up to {} records from {}", opts.limit, config.url);
        let body = policy
            .run("bulk request", |_| async move {
                let fetched = session.get_json(&config.url, params).await;
                politeness.pause().await;
                fetched.map_err(ScrapeError::from)
            })
            .await?;

        let payload: Value = serde_json::from_str(&body)?;
        let set = flatten_json_records(&payload)?;
        tracing::info!("Retrieved {} records", set.len());
        Ok(set)
    }
}
