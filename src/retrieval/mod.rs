//! Document retrieval
//!
//! The store splits ingested documents into chunks, embeds them into a flat
//! vector index and answers top-k similarity queries. State is persisted as
//! a three-file snapshot bundle.

pub mod bundle;
mod provenance;
mod store;

pub use provenance::{ChunkMetadata, DocumentMeta, ScoredChunk};
pub use store::{IngestReport, RetrievalStore, SharedStore, StoreStats};

use serde::{Deserialize, Serialize};

/// Search parameters beyond the query text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results
    pub top_k: usize,

    /// Only return chunks from documents with this source name
    pub source_name: Option<String>,
}

impl SearchOptions {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            source_name: None,
        }
    }

    pub fn with_source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }
}

/// Join result texts into one context block for a text generator
pub fn build_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
