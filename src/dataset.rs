//! Assembly of publication records from `(subject, predicate, object)` facts.

use std::collections::hash_map::Entry as CacheEntry;
use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::{Identifier, Publication, PublicationSet};

static IRI: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^<[^<>"{}|^`\\\s]*>$"#).expect("valid IRI pattern"));
static PREFIXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][\w.-]*:[\w.:%-]*$").expect("valid prefixed-name pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetConfig {
    pub date_predicate: String,
    pub title_predicate: String,
    pub reference_predicate: String,
    /// The last match inside a date value becomes the stored date.
    pub date_regex: String,
    /// Turn every reference of a listed publication into a publication of
    /// its own, so cited works show up even without data.
    pub include_referenced: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            date_predicate: "akt:has-date".to_string(),
            title_predicate: "akt:has-title".to_string(),
            reference_predicate: "akt:cites-publication-reference".to_string(),
            date_regex: "[0-9]{4}".to_string(),
            include_referenced: true,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("{predicate} isn't an IRI or prefixed name")]
    InvalidPredicate { predicate: String },
    #[error("invalid date pattern `{pattern}`: {message}")]
    InvalidDateRegex { pattern: String, message: String },
    #[error("unexpected predicate {predicate} for {subject}")]
    UnexpectedPredicate { subject: String, predicate: String },
    #[error("empty subject in fact with predicate {predicate}")]
    EmptySubject { predicate: String },
}

#[derive(Debug, Clone)]
struct Entry {
    publication: Publication,
    /// Listed directly rather than only referenced.
    recurse: bool,
}

/// Accumulates facts into publications. The first error wins: once set,
/// later facts are ignored and [`Dataset::finish`] reports it.
#[derive(Debug, Clone)]
pub struct Dataset {
    config: DatasetConfig,
    date_regex: Option<Regex>,
    entries: BTreeMap<Identifier, Entry>,
    error: Option<DatasetError>,
}

impl Dataset {
    pub fn new(config: DatasetConfig) -> Self {
        let mut dataset = Self {
            config,
            date_regex: None,
            entries: BTreeMap::new(),
            error: None,
        };
        let predicates = [
            dataset.config.date_predicate.clone(),
            dataset.config.title_predicate.clone(),
            dataset.config.reference_predicate.clone(),
        ];
        for (idx, predicate) in predicates.iter().enumerate() {
            // date and title are optional; the reference predicate is not
            if predicate.is_empty() && idx < 2 {
                continue;
            }
            if !is_predicate(predicate) {
                dataset.set_error(DatasetError::InvalidPredicate {
                    predicate: predicate.clone(),
                });
            }
        }
        match Regex::new(&dataset.config.date_regex) {
            Ok(regex) => dataset.date_regex = Some(regex),
            Err(err) => {
                let pattern = dataset.config.date_regex.clone();
                dataset.set_error(DatasetError::InvalidDateRegex {
                    pattern,
                    message: err.to_string(),
                });
            }
        }
        dataset
    }

    pub fn error(&self) -> Option<&DatasetError> {
        self.error.as_ref()
    }

    fn set_error(&mut self, error: DatasetError) {
        if self.error.is_some() {
            return;
        }
        tracing::error!(%error, "dataset error");
        self.error = Some(error);
    }

    /// Register a publication that was asked for directly.
    pub fn add_seed(&mut self, id: impl Into<Identifier>) {
        let id = id.into();
        if self.error.is_some() || id.is_empty() {
            return;
        }
        let entry = self.entries.entry(id.clone()).or_insert_with(|| Entry {
            publication: Publication::new(id),
            recurse: true,
        });
        if entry.recurse {
            return;
        }
        entry.recurse = true;
        let references: Vec<Identifier> = entry.publication.references.iter().cloned().collect();
        if self.config.include_referenced {
            for reference in references {
                self.add_placeholder(reference);
            }
        }
    }

    fn add_placeholder(&mut self, id: Identifier) {
        self.entries.entry(id.clone()).or_insert_with(|| Entry {
            publication: Publication::new(id),
            recurse: false,
        });
    }

    pub fn add_fact(&mut self, subject: &str, predicate: &str, object: &str) {
        if self.error.is_some() {
            return;
        }
        let subject = subject.trim();
        if subject.is_empty() {
            self.set_error(DatasetError::EmptySubject {
                predicate: predicate.to_string(),
            });
            return;
        }
        let id = Identifier::new(strip_iri(subject));
        if !self.entries.contains_key(&id) {
            self.add_seed(id.clone());
        }

        if self.matches(&self.config.date_predicate, predicate) {
            let date = match self.date_regex.as_ref().and_then(|re| re.find_iter(object).last()) {
                Some(found) => found.as_str().to_string(),
                None => {
                    tracing::warn!(value = object, "can't find date substring");
                    object.to_string()
                }
            };
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.publication.dates.push(date);
            }
        } else if self.matches(&self.config.title_predicate, predicate) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.publication.title = Some(object.to_string());
            }
        } else if self.matches(&self.config.reference_predicate, predicate) {
            let reference = Identifier::new(strip_iri(object.trim()));
            let recurse = match self.entries.get_mut(&id) {
                Some(entry) => {
                    entry.publication.references.insert(reference.clone());
                    entry.recurse
                }
                None => false,
            };
            if recurse && self.config.include_referenced {
                self.add_placeholder(reference);
            }
        } else {
            self.set_error(DatasetError::UnexpectedPredicate {
                subject: subject.to_string(),
                predicate: predicate.to_string(),
            });
        }
    }

    fn matches(&self, configured: &str, predicate: &str) -> bool {
        !configured.is_empty() && strip_iri(configured) == strip_iri(predicate.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Result<PublicationSet, DatasetError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(self.entries.into_values().map(|entry| entry.publication).collect())
    }
}

fn is_predicate(text: &str) -> bool {
    IRI.is_match(text) || PREFIXED.is_match(text)
}

fn strip_iri(text: &str) -> &str {
    text.strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(text)
}

/// Caller-owned store of finished publication sets keyed by their source
/// (a file path, a query string).
#[derive(Debug, Clone, Default)]
pub struct PublicationCache {
    entries: HashMap<String, PublicationSet>,
}

impl PublicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PublicationSet> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, publications: PublicationSet) {
        self.entries.insert(key.into(), publications);
    }

    /// Cached set for `key`, loading and storing it on a miss. Failed loads
    /// are not cached.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: &str,
        load: impl FnOnce() -> Result<PublicationSet, E>,
    ) -> Result<&PublicationSet, E> {
        match self.entries.entry(key.to_string()) {
            CacheEntry::Occupied(entry) => Ok(entry.into_mut()),
            CacheEntry::Vacant(entry) => Ok(entry.insert(load()?)),
        }
    }

    pub fn invalidate(&mut self, key: &str) -> Option<PublicationSet> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
