//! Core record types shared by the writer, the index builder and the client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Closed set of article partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleType {
    Person,
    Place,
    Org,
    Work,
    Event,
    Other,
}

impl ArticleType {
    /// All types, in partition order.
    pub const ALL: [ArticleType; 6] = [
        ArticleType::Person,
        ArticleType::Place,
        ArticleType::Org,
        ArticleType::Work,
        ArticleType::Event,
        ArticleType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleType::Person => "person",
            ArticleType::Place => "place",
            ArticleType::Org => "org",
            ArticleType::Work => "work",
            ArticleType::Event => "event",
            ArticleType::Other => "other",
        }
    }
}

impl fmt::Display for ArticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArticleType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::validation(format!("unknown article type '{}'", s)))
    }
}

/// Geographic coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

/// A single infobox value.
///
/// Serialized untagged, so the overflow JSON reads naturally:
/// `{"born": "1879", "height_m": 1.75, "living": false, "spouses": ["A", "B"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoboxValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// Kind of an [`InfoboxValue`], used to pick a shredded column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Number,
    Flag,
    List,
}

impl InfoboxValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            InfoboxValue::Flag(_) => ValueKind::Flag,
            InfoboxValue::Number(_) => ValueKind::Number,
            InfoboxValue::Text(_) => ValueKind::Text,
            InfoboxValue::List(_) => ValueKind::List,
        }
    }

    /// Approximate encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            InfoboxValue::Flag(_) => 1,
            InfoboxValue::Number(_) => 8,
            InfoboxValue::Text(s) => s.len(),
            InfoboxValue::List(items) => items.iter().map(|s| s.len() + 3).sum::<usize>() + 2,
        }
    }

    /// Text values used as relationship targets.
    pub fn as_texts(&self) -> Vec<&str> {
        match self {
            InfoboxValue::Text(s) => vec![s.as_str()],
            InfoboxValue::List(items) => items.iter().map(|s| s.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Heterogeneous infobox map. Ordered so serialization is deterministic.
pub type Infobox = BTreeMap<String, InfoboxValue>;

/// One encyclopedia article as produced by the upstream parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: String,
    pub article_type: ArticleType,
    pub title: String,
    pub description: String,
    pub wikidata_id: Option<String>,
    pub coords: Option<Coords>,
    pub infobox: Infobox,
    pub content: String,
    /// Last revision time, epoch milliseconds.
    pub updated_at: i64,
}

/// Decoded articles have exactly the shape of the ingested records.
pub type Article = ArticleRecord;

impl ArticleRecord {
    /// Approximate serialized size, used for file-size accounting.
    pub fn estimated_size(&self) -> u64 {
        let fixed = self.id.len()
            + self.article_type.as_str().len()
            + self.title.len()
            + self.description.len()
            + self.wikidata_id.as_ref().map_or(0, |s| s.len())
            + self.coords.map_or(0, |_| 16)
            + self.content.len()
            + 8;
        let infobox: usize = self
            .infobox
            .iter()
            .map(|(k, v)| k.len() + v.encoded_len() + 6)
            .sum();
        (fixed + infobox) as u64
    }
}

/// Location of one row inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowPointer {
    pub path: String,
    pub row_group: u32,
    pub row: u32,
}
