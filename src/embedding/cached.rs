/// Memoizing wrapper around any embedding provider
use super::{EmbeddingCache, EmbeddingError, EmbeddingProvider};
use ahash::{HashMap, HashMapExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Provider that consults an on-disk cache before computing
///
/// Lookup-or-compute: every text is looked up by its exact content; misses
/// are computed in one batch by the inner provider, written back and
/// returned. Any cache failure degrades to computing everything, so a
/// missing, cold or corrupt cache never fails a call.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    fn lookup(&self, texts: &[&str]) -> Vec<Option<Vec<f32>>> {
        let dimension = self.inner.dimension();
        match self.cache.get_many(self.inner.model_name(), texts) {
            Ok(found) => found
                .into_iter()
                .map(|v| v.filter(|v| v.len() == dimension))
                .collect(),
            Err(e) => {
                warn!("Embedding cache lookup failed, recomputing: {}", e);
                vec![None; texts.len()]
            }
        }
    }
}

impl EmbeddingProvider for CachedEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Identical texts inside one batch are looked up and computed once
        let mut unique: Vec<&str> = Vec::new();
        let mut slot_of: HashMap<&str, usize> = HashMap::new();
        let slots: Vec<usize> = texts
            .iter()
            .map(|text| {
                *slot_of.entry(text.as_str()).or_insert_with(|| {
                    unique.push(text.as_str());
                    unique.len() - 1
                })
            })
            .collect();

        let mut vectors = self.lookup(&unique);
        let misses: Vec<usize> = (0..unique.len()).filter(|&i| vectors[i].is_none()).collect();

        debug!(
            "Embedding cache: {} hits, {} misses",
            unique.len() - misses.len(),
            misses.len()
        );

        if !misses.is_empty() {
            let to_compute: Vec<String> = misses.iter().map(|&i| unique[i].to_string()).collect();
            let computed = self.inner.embed_batch(&to_compute)?;
            if computed.len() != to_compute.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    to_compute.len(),
                    computed.len()
                )));
            }

            let entries: Vec<(&str, &[f32])> = misses
                .iter()
                .zip(computed.iter())
                .map(|(&i, v)| (unique[i], v.as_slice()))
                .collect();
            if let Err(e) = self.cache.put_many(self.inner.model_name(), &entries) {
                warn!("Failed to write embedding cache: {}", e);
            }

            for (&i, vector) in misses.iter().zip(computed) {
                vectors[i] = Some(vector);
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                vectors[slot].clone().ok_or_else(|| {
                    EmbeddingError::GenerationError("Missing embedding after compute".to_string())
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts how many texts reach the inner provider
    struct CountingProvider {
        inner: MockEmbeddingProvider,
        computed: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.computed.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn counting() -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            inner: MockEmbeddingProvider::new(16),
            computed: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_cache_hits_skip_compute() {
        let temp = TempDir::new().unwrap();
        let counter = counting();
        let cache = EmbeddingCache::open(&temp.path().join("embeddings.sqlite")).unwrap();
        let provider = CachedEmbeddingProvider::new(counter.clone(), cache);

        let texts = vec!["north gate".to_string(), "south gate".to_string()];
        let first = provider.embed_batch(&texts).unwrap();
        assert_eq!(counter.computed.load(Ordering::SeqCst), 2);

        let second = provider.embed_batch(&texts).unwrap();
        assert_eq!(counter.computed.load(Ordering::SeqCst), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicates_in_batch_computed_once() {
        let temp = TempDir::new().unwrap();
        let counter = counting();
        let cache = EmbeddingCache::open(&temp.path().join("embeddings.sqlite")).unwrap();
        let provider = CachedEmbeddingProvider::new(counter.clone(), cache);

        let texts = vec!["echo".to_string(), "other".to_string(), "echo".to_string()];
        let vectors = provider.embed_batch(&texts).unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        assert_eq!(counter.computed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cached_matches_uncached() {
        let temp = TempDir::new().unwrap();
        let cache = EmbeddingCache::open(&temp.path().join("embeddings.sqlite")).unwrap();
        let mock = MockEmbeddingProvider::new(16);
        let provider = CachedEmbeddingProvider::new(Arc::new(mock.clone()), cache);

        assert_eq!(provider.embed("ruins").unwrap(), mock.embed("ruins").unwrap());
        assert_eq!(provider.embed("ruins").unwrap(), mock.embed("ruins").unwrap());
        assert_eq!(provider.dimension(), 16);
        assert_eq!(provider.cache().len().unwrap(), 1);
    }

    #[test]
    fn test_cache_survives_restart() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("embeddings.sqlite");

        {
            let cache = EmbeddingCache::open(&path).unwrap();
            let provider = CachedEmbeddingProvider::new(counting(), cache);
            provider.embed("remembered").unwrap();
        }

        let counter = counting();
        let cache = EmbeddingCache::open(&path).unwrap();
        let provider = CachedEmbeddingProvider::new(counter.clone(), cache);
        provider.embed("remembered").unwrap();
        assert_eq!(counter.computed.load(Ordering::SeqCst), 0);
    }
}
