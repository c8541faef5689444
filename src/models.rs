//! Core data models that flow through the pipeline.
//!
//! A [`Record`] is discovered by the harvester, a [`StageItem`] carries one
//! document's text through categorize → sanitize → summarize, and an
//! [`IndexChunk`] is what ends up in the similarity index.

use serde::{Deserialize, Serialize};

/// Metadata for one discovered regulatory document.
///
/// Serialized with the field names of the persisted metadata artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable unique key (a CELEX number for EUR-Lex).
    #[serde(rename = "celex")]
    pub identifier: String,
    pub title: String,
    pub link: String,
    /// Publication date in the listing's original free-text format.
    pub date: Option<String>,
    /// Listing page the record was discovered on.
    pub page: u32,
    /// Listing category the record was harvested under.
    #[serde(default)]
    pub category: Option<String>,
}

/// One document's text as it moves through the processing stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageItem {
    pub identifier: String,
    /// Assigned by the categorize stage; `None` before it runs.
    pub category: Option<String>,
    pub text: String,
}

/// Raw document text loaded from the raw artifact directory.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub identifier: String,
    pub text: String,
}

/// A bounded slice of a summarized artifact, ready for embedding.
#[derive(Debug, Clone)]
pub struct IndexChunk {
    pub id: String,
    /// File name of the artifact the chunk came from (e.g. `32025R0001.txt`).
    pub source: String,
    pub identifier: String,
    pub category: Option<String>,
    pub chunk_index: i64,
    /// Character offset of the chunk within the artifact text.
    pub offset: i64,
    pub text: String,
    pub hash: String,
}

/// A similarity search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source: String,
    pub identifier: String,
    pub category: Option<String>,
    pub score: f32,
    pub text: String,
}
