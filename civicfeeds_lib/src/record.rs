//! Normalized records and ordered record sets.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// One cell value. JSON sources keep their scalar types; HTML sources produce text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Rendering used for delimited output. `Null` becomes an empty cell.
    pub fn as_cell(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Null => String::new(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_cell())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// One normalized row: a reported event or a property sale.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text value of a field, if present and textual.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Ordered records sharing one schema.
///
/// `columns` is the schema: every field of every record is one of the columns.
/// Records may omit a column (absent, not defaulted). Emptiness is a valid
/// state and is reported as "no data" by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSet {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl RecordSet {
    /// An empty set with a fixed schema.
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            records: Vec::new(),
        }
    }

    /// Appends a record, widening the schema with any field it introduces.
    ///
    /// New columns are added in first-seen order, which makes the schema the
    /// ordered union of keys over all records.
    pub fn push(&mut self, record: Record) {
        for name in record.field_names() {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
            }
        }
        self.records.push(record);
    }

    /// Concatenates `other` onto this set, preserving order and widening the schema.
    pub fn append(&mut self, other: RecordSet) {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self.records.extend(other.records);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cells of one record in column order.
    pub fn row(&self, index: usize) -> Option<Vec<String>> {
        let record = self.records.get(index)?;
        Some(
            self.columns
                .iter()
                .map(|c| record.get(c).map(FieldValue::as_cell).unwrap_or_default())
                .collect(),
        )
    }

    /// Iterates every record as cells in column order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        (0..self.records.len()).filter_map(move |i| self.row(i))
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut set = RecordSet::default();
        for record in iter {
            set.push(record);
        }
        set
    }
}
