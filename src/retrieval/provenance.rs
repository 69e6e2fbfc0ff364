//! Per-chunk provenance and scored results

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata stored alongside every chunk, positionally aligned with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Identifier of the originating document
    pub source_id: Uuid,

    /// Document name as given at ingestion (file name by default)
    pub source_name: String,

    /// File the document was read from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_path: Option<String>,

    /// Most recent header seen before the chunk ("" if none)
    pub heading: String,

    /// Position in the store's chunk sequence
    pub position: usize,

    /// Position within the originating document
    pub chunk_index: usize,

    pub char_count: usize,
    pub token_count: usize,
}

/// One ingested document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub source_id: Uuid,
    pub source_name: String,
    pub origin_path: Option<String>,
    pub chunk_count: usize,
}

impl DocumentMeta {
    /// Rebuild the document list from chunk metadata, in first-seen order
    pub fn collect(metadata: &[ChunkMetadata]) -> Vec<DocumentMeta> {
        let mut documents: Vec<DocumentMeta> = Vec::new();
        for meta in metadata {
            match documents.last_mut() {
                Some(doc) if doc.source_id == meta.source_id => doc.chunk_count += 1,
                _ => documents.push(DocumentMeta {
                    source_id: meta.source_id,
                    source_name: meta.source_name.clone(),
                    origin_path: meta.origin_path.clone(),
                    chunk_count: 1,
                }),
            }
        }
        documents
    }
}

/// A search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Chunk text
    pub text: String,

    /// Chunk metadata
    pub metadata: ChunkMetadata,

    /// Cosine similarity of query and chunk, in `[-1, 1]`
    pub score: f32,

    /// Score mapped into `[0, 1]`
    pub similarity: f32,
}

impl ScoredChunk {
    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.text[..cut]),
            None => self.text.clone(),
        }
    }
}
