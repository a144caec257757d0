//! Core data models used throughout finqa.
//!
//! These types represent the dataset rows, the normalized records, and the
//! search-index documents that flow through the ingestion and query
//! pipelines.

use serde::{Deserialize, Serialize};

/// One row of the source CSV before any processing.
///
/// Extra columns are ignored; `ticker` and `filing` are carried through
/// loading but are not indexed.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawRecord {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub filing: Option<String>,
}

/// A deduplicated, shuffled, normalized dataset row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Ordinal position after shuffling.
    pub id: u64,
    pub question: String,
    pub answer: String,
    pub context: String,
}

/// A record together with the embedding of each text field.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedRecord {
    pub record: Record,
    pub question_vec: Vec<f32>,
    pub answer_vec: Vec<f32>,
    pub context_vec: Vec<f32>,
}

/// The document stored in the search index.
///
/// Field names are short because they double as the index mapping and the
/// boosted field list of the lexical query (`q^3`, `a`, `c^0.5`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDocument {
    pub i: u64,
    pub q: String,
    pub a: String,
    pub c: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub q_: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub a_: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub c_: Vec<f32>,
}

impl From<&EmbeddedRecord> for IndexDocument {
    fn from(r: &EmbeddedRecord) -> Self {
        Self {
            i: r.record.id,
            q: r.record.question.clone(),
            a: r.record.answer.clone(),
            c: r.record.context.clone(),
            q_: r.question_vec.clone(),
            a_: r.answer_vec.clone(),
            c_: r.context_vec.clone(),
        }
    }
}

/// A single ranked match returned by a [`SearchIndex`](crate::index::SearchIndex).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub score: f64,
    pub question: String,
    pub answer: String,
    pub context: String,
}
