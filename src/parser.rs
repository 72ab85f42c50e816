use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::dataset::{Dataset, DatasetConfig, DatasetError};
use crate::ir::{Identifier, Publication, PublicationSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Json5,
    /// Tab-separated `subject predicate object` lines.
    Triples,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "json5" => Some(Self::Json5),
            "tsv" | "triples" | "nt" => Some(Self::Triples),
            _ => None,
        }
    }
}

impl FromStr for InputFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json5" => Ok(Self::Json5),
            "triples" | "tsv" => Ok(Self::Triples),
            other => Err(ParseError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown input format `{0}`")]
    UnknownFormat(String),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid JSON5: {0}")]
    Json5(#[from] json5::Error),
    #[error("line {line}: expected 3 tab-separated fields, found {found}")]
    Triple { line: usize, found: usize },
    #[error("publication at position {index} has an empty id")]
    EmptyId { index: usize },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    List(Vec<Record>),
    Wrapped { publications: Vec<Record> },
}

#[derive(Debug, Deserialize)]
struct Record {
    id: Identifier,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<DateValue>,
    #[serde(default)]
    dates: Vec<DateValue>,
    #[serde(default)]
    references: Vec<Identifier>,
}

/// Dates are free text, but plain years are often written as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DateValue {
    Text(String),
    Number(i64),
}

impl DateValue {
    fn into_string(self) -> String {
        match self {
            DateValue::Text(text) => text,
            DateValue::Number(value) => value.to_string(),
        }
    }
}

pub fn parse_document(
    input: &str,
    format: InputFormat,
    dataset: &DatasetConfig,
) -> Result<PublicationSet, ParseError> {
    match format {
        InputFormat::Json => parse_json(input),
        InputFormat::Json5 => parse_json5(input),
        InputFormat::Triples => parse_triples(input, dataset),
    }
}

pub fn parse_json(input: &str) -> Result<PublicationSet, ParseError> {
    let document: Document = serde_json::from_str(input)?;
    collect_records(document)
}

pub fn parse_json5(input: &str) -> Result<PublicationSet, ParseError> {
    let document: Document = json5::from_str(input)?;
    collect_records(document)
}

fn collect_records(document: Document) -> Result<PublicationSet, ParseError> {
    let records = match document {
        Document::List(records) | Document::Wrapped { publications: records } => records,
    };
    let mut set = PublicationSet::new();
    for (index, record) in records.into_iter().enumerate() {
        if record.id.is_empty() {
            return Err(ParseError::EmptyId { index });
        }
        // Repeated ids accumulate into one publication.
        let mut publication = set
            .publications
            .remove(&record.id)
            .unwrap_or_else(|| Publication::new(record.id.clone()));
        if let Some(title) = record.title {
            publication.title = Some(title);
        }
        publication
            .dates
            .extend(record.date.into_iter().chain(record.dates).map(DateValue::into_string));
        publication.references.extend(record.references);
        set.insert(publication);
    }
    Ok(set)
}

/// Tab-separated facts, one per line. Blank lines and `#` comments are
/// skipped; every other line must have exactly three fields.
pub fn parse_triples(input: &str, config: &DatasetConfig) -> Result<PublicationSet, ParseError> {
    let mut dataset = Dataset::new(config.clone());
    for (idx, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            return Err(ParseError::Triple {
                line: idx + 1,
                found: fields.len(),
            });
        }
        dataset.add_fact(fields[0], fields[1], fields[2].trim());
    }
    Ok(dataset.finish()?)
}
