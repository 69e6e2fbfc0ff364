//! Retrieval store: ingestion, search and persistence over one index

use super::{bundle, ChunkMetadata, DocumentMeta, ScoredChunk, SearchOptions};
use crate::chunking::{SplitChunk, SplitterConfig, StructuralSplitter};
use crate::config::Config;
use crate::embedding::{build_provider, EmbeddingError, EmbeddingProvider, VectorIndex};
use crate::error::{LoreError, Result};
use crate::extract::{extract_text, DocumentInput};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Store shared between threads
///
/// Searches take the read lock; ingest, load and reset take the write lock.
pub type SharedStore = Arc<RwLock<RetrievalStore>>;

/// Outcome of one ingestion call
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Documents that produced chunks
    pub documents: usize,
    /// Inputs skipped because they had no text
    pub skipped: Vec<String>,
    /// Chunks added to the store
    pub chunks: usize,
    pub duration_ms: u64,
}

/// Summary of the store's contents
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunks: usize,
    pub documents: usize,
    /// `None` until the first vectors arrive
    pub dimension: Option<usize>,
    pub index_dir: PathBuf,
    pub snapshot_on_disk: bool,
}

/// Document store with semantic search
///
/// Chunk texts, chunk metadata and index rows are kept positionally
/// aligned: every mutating call either commits all three or leaves the
/// store as it was.
pub struct RetrievalStore {
    provider: Arc<dyn EmbeddingProvider>,
    splitter: StructuralSplitter,
    batch_size: usize,
    index_dir: PathBuf,
    index: Option<VectorIndex>,
    chunks: Vec<String>,
    metadata: Vec<ChunkMetadata>,
    documents: Vec<DocumentMeta>,
    rejected_snapshot: Option<PathBuf>,
}

/// Chunks of one document waiting to be embedded
struct PendingDocument {
    meta: DocumentMeta,
    chunks: Vec<SplitChunk>,
}

impl RetrievalStore {
    /// Create an empty store
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        splitter: SplitterConfig,
        index_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            splitter: StructuralSplitter::new(splitter),
            batch_size: 32,
            index_dir: index_dir.into(),
            index: None,
            chunks: Vec::new(),
            metadata: Vec::new(),
            documents: Vec::new(),
            rejected_snapshot: None,
        }
    }

    /// Create an empty store from configuration, including the provider
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache_path = config.cache_path()?;
        let provider = build_provider(
            &config.embedding,
            cache_path.as_deref(),
            Some(config.model_dir()?),
        )?;

        Ok(
            Self::new(provider, SplitterConfig::from(&config.chunking), config.index_dir()?)
                .with_batch_size(config.embedding.batch_size),
        )
    }

    /// Number of texts sent to the provider per call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Wrap the store for use from several threads
    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// Ingest documents, appending their chunks to the store
    ///
    /// Inputs without text are skipped with a warning. The call fails only
    /// when no input has text, or when embedding fails; in both cases the
    /// store is unchanged.
    pub fn ingest_docs(&mut self, inputs: &[DocumentInput]) -> Result<IngestReport> {
        let start = Instant::now();
        if inputs.is_empty() {
            return Err(LoreError::InvalidInput("No documents to ingest".to_string()));
        }

        let mut pending = Vec::new();
        let mut skipped = Vec::new();

        for input in inputs {
            let source_name = input.source_name();
            let text = extract_text(input);
            if text.trim().is_empty() {
                warn!("Skipping {}: no extractable text", source_name);
                skipped.push(source_name);
                continue;
            }

            let chunks = self.splitter.split(&text);
            debug!("{}: {} chunks", source_name, chunks.len());

            pending.push(PendingDocument {
                meta: DocumentMeta {
                    source_id: Uuid::new_v4(),
                    source_name,
                    origin_path: input.origin_path().map(|p| p.display().to_string()),
                    chunk_count: chunks.len(),
                },
                chunks,
            });
        }

        if pending.is_empty() {
            return Err(LoreError::NoContent { inputs: skipped });
        }

        let texts: Vec<String> = pending
            .iter()
            .flat_map(|doc| doc.chunks.iter().map(|c| c.text.clone()))
            .collect();
        let vectors = self.embed_all(&texts)?;

        // Index first: it is the only step that can still fail
        match self.index.as_mut() {
            Some(index) => index.add(&vectors)?,
            None => {
                let dimension = vectors.first().map(Vec::len).unwrap_or_default();
                let mut index = VectorIndex::new(dimension);
                index.add(&vectors)?;
                self.index = Some(index);
            }
        }

        let added = texts.len();
        let document_count = pending.len();
        for doc in pending {
            for (chunk_index, chunk) in doc.chunks.into_iter().enumerate() {
                self.metadata.push(ChunkMetadata {
                    source_id: doc.meta.source_id,
                    source_name: doc.meta.source_name.clone(),
                    origin_path: doc.meta.origin_path.clone(),
                    heading: chunk.heading,
                    position: self.chunks.len(),
                    chunk_index,
                    char_count: chunk.text.chars().count(),
                    token_count: chunk.token_count,
                });
                self.chunks.push(chunk.text);
            }
            self.documents.push(doc.meta);
        }

        let report = IngestReport {
            documents: document_count,
            skipped,
            chunks: added,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Ingested {} documents ({} chunks, {} skipped) in {}ms",
            report.documents,
            report.chunks,
            report.skipped.len(),
            report.duration_ms
        );

        Ok(report)
    }

    /// Ingest files, naming them positionally from `names`
    ///
    /// Paths beyond the end of `names` keep their file name.
    pub fn ingest_paths(&mut self, paths: &[PathBuf], names: &[String]) -> Result<IngestReport> {
        if names.len() > paths.len() {
            return Err(LoreError::InvalidInput(format!(
                "{} source names given for {} paths",
                names.len(),
                paths.len()
            )));
        }

        let inputs: Vec<DocumentInput> = paths
            .iter()
            .enumerate()
            .map(|(i, path)| match names.get(i) {
                Some(name) => DocumentInput::path(path).with_name(name.clone()),
                None => DocumentInput::path(path),
            })
            .collect();

        self.ingest_docs(&inputs)
    }

    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.provider.embed_batch(batch)?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    batch.len(),
                    embedded.len()
                ))
                .into());
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Top `top_k` chunks for `query`, best first
    ///
    /// An empty store, a blank query or `top_k == 0` yield no results.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        self.search_with(query, &SearchOptions::new(top_k))
    }

    /// Search with filters
    pub fn search_with(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredChunk>> {
        let Some(index) = self.index.as_ref().filter(|index| !index.is_empty()) else {
            debug!("Search on empty store");
            return Ok(Vec::new());
        };
        if query.trim().is_empty() || options.top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed(query)?;

        // Filtering happens after ranking, so rank everything when filtered
        let k = if options.source_name.is_some() {
            index.len()
        } else {
            options.top_k
        };

        let results = index
            .search(&query_vector, k)?
            .into_iter()
            .filter_map(|hit| {
                let metadata = self.metadata.get(hit.position)?;
                if let Some(source) = &options.source_name {
                    if &metadata.source_name != source {
                        return None;
                    }
                }
                Some(ScoredChunk {
                    text: self.chunks.get(hit.position)?.clone(),
                    metadata: metadata.clone(),
                    score: hit.score,
                    similarity: hit.similarity(),
                })
            })
            .take(options.top_k)
            .collect();

        Ok(results)
    }

    /// Write the current state as a snapshot bundle
    ///
    /// Saves to the configured index directory unless `dir` is given.
    pub fn save_index(&self, dir: Option<&Path>) -> Result<()> {
        let dir = dir.unwrap_or(self.index_dir.as_path());

        match &self.index {
            Some(index) => bundle::write(dir, index, &self.chunks, &self.metadata)?,
            None => bundle::write(
                dir,
                &VectorIndex::new(self.provider.dimension()),
                &self.chunks,
                &self.metadata,
            )?,
        }

        info!("Saved {} chunks to {}", self.chunks.len(), dir.display());
        Ok(())
    }

    /// Replace the current state with the snapshot in `dir`
    ///
    /// Returns whether a snapshot was restored. A missing, unreadable or
    /// incompatible snapshot leaves the store untouched and returns false.
    pub fn load_index(&mut self, dir: Option<&Path>) -> bool {
        let dir = dir.unwrap_or(self.index_dir.as_path()).to_path_buf();

        let bundle = match bundle::read(&dir) {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                debug!("No snapshot in {}", dir.display());
                return false;
            }
            Err(e) => {
                warn!("Ignoring unreadable snapshot in {}: {}", dir.display(), e);
                self.rejected_snapshot = Some(dir);
                return false;
            }
        };

        if bundle.index.dimension() != self.provider.dimension() {
            warn!(
                "Ignoring snapshot in {}: {}-dimensional vectors, provider produces {}",
                dir.display(),
                bundle.index.dimension(),
                self.provider.dimension()
            );
            self.rejected_snapshot = Some(dir);
            return false;
        }

        self.rejected_snapshot = None;
        self.documents = DocumentMeta::collect(&bundle.metadata);
        self.index = Some(bundle.index);
        self.chunks = bundle.chunks;
        self.metadata = bundle.metadata;

        info!(
            "Loaded {} chunks from {} documents",
            self.chunks.len(),
            self.documents.len()
        );
        true
    }

    /// Directory of the last snapshot that existed but could not be loaded
    ///
    /// Saving over it discards that snapshot.
    pub fn rejected_snapshot(&self) -> Option<&Path> {
        self.rejected_snapshot.as_deref()
    }

    /// Drop all in-memory state
    pub fn reset(&mut self) {
        self.index = None;
        self.chunks.clear();
        self.metadata.clear();
        self.documents.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Vector dimension, once known
    pub fn dimension(&self) -> Option<usize> {
        self.index.as_ref().map(VectorIndex::dimension)
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    pub fn documents(&self) -> &[DocumentMeta] {
        &self.documents
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            chunks: self.chunks.len(),
            documents: self.documents.len(),
            dimension: self.dimension(),
            index_dir: self.index_dir.clone(),
            snapshot_on_disk: bundle::exists(&self.index_dir),
        }
    }
}
