mod cache;
mod cached;
/// Embedding & Indexing
///
/// This module provides embedding generation and the vector index.
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - MockEmbeddingProvider for deterministic offline runs
/// - EmbeddingCache + CachedEmbeddingProvider for on-disk memoization
/// - Flat inner-product VectorIndex for exact similarity search
mod provider;
mod vector_index;

pub use cache::EmbeddingCache;
pub use cached::CachedEmbeddingProvider;
pub use provider::{
    resolve_model, EmbeddingError, EmbeddingProvider, FastEmbedProvider, MockEmbeddingProvider,
    DEFAULT_MOCK_DIMENSION,
};
pub use vector_index::{l2_normalize, SearchResult, VectorIndex, VectorIndexError};

use crate::config::EmbeddingConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Provider backend names accepted in configuration
pub const PROVIDER_MOCK: &str = "mock";
pub const PROVIDER_FASTEMBED: &str = "fastembed";

/// Build the configured embedding provider
///
/// The backend is picked once here; callers only see the trait object.
/// When `cache_path` is given the provider is wrapped in the on-disk cache,
/// and a cache that cannot be opened is skipped with a warning.
pub fn build_provider(
    config: &EmbeddingConfig,
    cache_path: Option<&Path>,
    model_dir: Option<PathBuf>,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        PROVIDER_MOCK => Arc::new(MockEmbeddingProvider::new(config.dimension)),
        PROVIDER_FASTEMBED => {
            let provider = FastEmbedProvider::new(&config.model, model_dir)?;
            if provider.dimension() != config.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: config.dimension,
                    actual: provider.dimension(),
                });
            }
            Arc::new(provider)
        }
        other => {
            return Err(EmbeddingError::InitializationError(format!(
                "Unknown embedding provider: {} (expected '{}' or '{}')",
                other, PROVIDER_MOCK, PROVIDER_FASTEMBED
            )));
        }
    };

    let Some(path) = cache_path else {
        return Ok(provider);
    };

    match EmbeddingCache::open(path) {
        Ok(cache) => {
            tracing::debug!("Embedding cache opened at {}", path.display());
            Ok(Arc::new(CachedEmbeddingProvider::new(provider, cache)))
        }
        Err(e) => {
            tracing::warn!(
                "Embedding cache unavailable at {}, continuing without it: {}",
                path.display(),
                e
            );
            Ok(provider)
        }
    }
}
