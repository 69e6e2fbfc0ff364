//! Lorestore - Document Retrieval for Story Writing
//!
//! Ingests notes, manuscripts and PDFs, splits them into structure-aware
//! chunks, embeds them locally and serves top-k semantic search with a
//! snapshot persisted to disk.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod retrieval;

pub use error::{LoreError, Result};
pub use extract::DocumentInput;
pub use retrieval::{build_context, RetrievalStore, ScoredChunk, SearchOptions};
