use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Opaque publication key.
///
/// Ordering compares the precomputed hash first and falls back to the text,
/// so map iteration order is stable for a given input but not alphabetical.
#[derive(Clone)]
pub struct Identifier {
    text: String,
    hash: u64,
}

impl Identifier {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();
        Self { text, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn stable_hash(&self) -> u64 {
        self.hash
    }

    /// An empty identifier means "unset".
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.text == other.text
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.text.cmp(&other.text))
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.text)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Identifier::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub id: Identifier,
    pub title: Option<String>,
    /// Every date observed for this publication; duplicates are kept.
    pub dates: Vec<String>,
    pub references: BTreeSet<Identifier>,
}

impl Publication {
    pub fn new(id: impl Into<Identifier>) -> Self {
        Self {
            id: id.into(),
            title: None,
            dates: Vec::new(),
            references: BTreeSet::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.dates.push(date.into());
        self
    }

    pub fn citing(mut self, reference: impl Into<Identifier>) -> Self {
        self.references.insert(reference.into());
        self
    }

    pub fn non_empty_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => self.id.as_str(),
        }
    }

    /// Lower median of the observed dates.
    pub fn representative_date(&self) -> Option<String> {
        if self.dates.is_empty() {
            return None;
        }
        let mut sorted: Vec<&String> = self.dates.iter().collect();
        sorted.sort();
        Some(sorted[(sorted.len() - 1) / 2].clone())
    }
}

/// Finalized publication records keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationSet {
    pub publications: BTreeMap<Identifier, Publication>,
}

impl PublicationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, publication: Publication) {
        self.publications.insert(publication.id.clone(), publication);
    }

    pub fn get(&self, id: &Identifier) -> Option<&Publication> {
        self.publications.get(id)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.publications.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.publications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Publication> {
        self.publications.values()
    }
}

impl FromIterator<Publication> for PublicationSet {
    fn from_iter<I: IntoIterator<Item = Publication>>(iter: I) -> Self {
        let mut set = PublicationSet::new();
        for publication in iter {
            set.insert(publication);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_orders_by_hash_then_text() {
        let a = Identifier::new("a");
        let b = Identifier::new("b");
        assert_eq!(a.cmp(&b), a.stable_hash().cmp(&b.stable_hash()));
        assert_eq!(a.cmp(&Identifier::new("a")), Ordering::Equal);
    }

    #[test]
    fn identifier_round_trips_as_plain_string() {
        let id = Identifier::new("http://example.org/p1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"http://example.org/p1\"");
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn representative_date_is_lower_median() {
        let p = Publication::new("p")
            .with_date("2021")
            .with_date("2019")
            .with_date("2020")
            .with_date("2022");
        assert_eq!(p.representative_date().as_deref(), Some("2020"));
        assert_eq!(Publication::new("q").representative_date(), None);
    }

    #[test]
    fn non_empty_title_falls_back_to_id() {
        let p = Publication::new("urn:x").with_title("  ");
        assert_eq!(p.non_empty_title(), "urn:x");
        let q = Publication::new("urn:y").with_title("Paper");
        assert_eq!(q.non_empty_title(), "Paper");
    }
}
