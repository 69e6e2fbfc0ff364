//! Document chunking
//!
//! Turns raw document text into token-budgeted chunks that follow the
//! document's structure: markdown headers first, then paragraphs, then
//! sentences.

mod splitter;
mod tokenizer;

pub use splitter::{SplitChunk, StructuralSplitter};
pub use tokenizer::count_tokens;

use serde::{Deserialize, Serialize};

/// Token budget for the structural splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Chunks below this are merged into their predecessor when possible
    pub min_tokens: usize,
    /// Hard ceiling for a chunk, except for a single oversized sentence
    pub max_tokens: usize,
    /// Trailing content carried into the next chunk on a forced split
    pub overlap_tokens: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            min_tokens: 40,
            max_tokens: 300,
            overlap_tokens: 40,
        }
    }
}
