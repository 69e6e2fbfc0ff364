/// Retrieval Integration Test: ingestion through search
///
/// Runs the whole pipeline (extraction, splitting, mock embedding, index)
/// against files on disk.
use lorestore::chunking::{count_tokens, SplitterConfig};
use lorestore::config::Config;
use lorestore::embedding::MockEmbeddingProvider;
use lorestore::{build_context, DocumentInput, LoreError, RetrievalStore, SearchOptions};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn splitter() -> SplitterConfig {
    SplitterConfig {
        min_tokens: 10,
        max_tokens: 60,
        overlap_tokens: 8,
    }
}

fn mock_store(temp: &TempDir) -> RetrievalStore {
    RetrievalStore::new(
        Arc::new(MockEmbeddingProvider::default()),
        splitter(),
        temp.path().join("index"),
    )
}

fn long_paragraph(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("The {} chronicle records event number {} in detail.", topic, i))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn test_hello_world_document() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("hello.txt");
    std::fs::write(&path, "Hello world.").unwrap();

    let mut store = mock_store(&temp);
    let report = store.ingest_docs(&[DocumentInput::path(&path)]).unwrap();
    assert_eq!(report.chunks, 1);

    let results = store.search("Hello", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "Hello world.");
    assert_eq!(results[0].metadata.heading, "");
    assert_eq!(results[0].metadata.source_name, "hello.txt");
    assert!(results[0].similarity > 0.0);
}

#[test]
fn test_two_sections_keep_their_headings() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("world.md");
    let text = format!(
        "# Northern Kingdoms\n\n{}\n\n# Southern Isles\n\n{}\n",
        long_paragraph("northern", 12),
        long_paragraph("southern", 12)
    );
    std::fs::write(&path, &text).unwrap();

    let mut store = mock_store(&temp);
    store.ingest_docs(&[DocumentInput::path(&path)]).unwrap();

    let headings: Vec<&str> = store
        .metadata()
        .iter()
        .map(|m| m.heading.as_str())
        .collect();
    assert!(headings.len() >= 2);
    assert!(headings.contains(&"Northern Kingdoms"));
    assert!(headings.contains(&"Southern Isles"));

    // Headings never go back once the second section starts
    let first_south = headings
        .iter()
        .position(|h| *h == "Southern Isles")
        .unwrap();
    assert!(headings[first_south..].iter().all(|h| *h == "Southern Isles"));

    for (chunk, meta) in store.chunks().iter().zip(store.metadata()) {
        assert!(meta.token_count <= 60);
        assert_eq!(meta.token_count, count_tokens(chunk));
        assert_eq!(meta.char_count, chunk.chars().count());
    }
}

#[test]
fn test_top_k_clamped_and_ordered() {
    let temp = TempDir::new().unwrap();
    let mut store = mock_store(&temp);

    let inputs: Vec<DocumentInput> = ["Dragons.", "Knights.", "Castles.", "Rivers."]
        .iter()
        .enumerate()
        .map(|(i, text)| DocumentInput::text(format!("note-{}", i), *text))
        .collect();
    store.ingest_docs(&inputs).unwrap();
    assert_eq!(store.len(), 4);

    let results = store.search("a story about dragons", 50).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let mut texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    texts.sort_unstable();
    texts.dedup();
    assert_eq!(texts.len(), 4);
}

#[test]
fn test_exact_text_ranks_first() {
    let temp = TempDir::new().unwrap();
    let mut store = mock_store(&temp);
    store
        .ingest_docs(&[
            DocumentInput::text("a", "The lighthouse keeper vanished."),
            DocumentInput::text("b", "Harvest festival in the valley."),
            DocumentInput::text("c", "A letter sealed with black wax."),
        ])
        .unwrap();

    // Identical text embeds to the identical vector
    let results = store.search("A letter sealed with black wax.", 3).unwrap();
    assert_eq!(results[0].metadata.source_name, "c");
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!((results[0].similarity - 1.0).abs() < 1e-5);
}

#[test]
fn test_empty_store_returns_nothing() {
    let temp = TempDir::new().unwrap();
    let store = mock_store(&temp);
    assert!(store.search("anything at all", 5).unwrap().is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_all_missing_inputs_fail() {
    let temp = TempDir::new().unwrap();
    let mut store = mock_store(&temp);

    let result = store.ingest_paths(
        &[temp.path().join("nope.md"), temp.path().join("empty.txt")],
        &[],
    );
    match result {
        Err(LoreError::NoContent { inputs }) => {
            assert_eq!(inputs, vec!["nope.md", "empty.txt"]);
        }
        other => panic!("expected NoContent, got {:?}", other),
    }
    assert!(store.is_empty());
    assert_eq!(store.dimension(), None);
}

#[test]
fn test_context_and_source_filter() {
    let temp = TempDir::new().unwrap();
    let mut store = mock_store(&temp);
    store
        .ingest_docs(&[
            DocumentInput::text("characters", "Mira is a cartographer."),
            DocumentInput::text("places", "The city of Vell floats."),
        ])
        .unwrap();

    let results = store
        .search_with("who draws maps", &SearchOptions::new(5).with_source("places"))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(build_context(&results), "The city of Vell floats.");

    let all = store.search("who draws maps", 5).unwrap();
    let context = build_context(&all);
    assert!(context.contains("Mira is a cartographer."));
    assert!(context.contains("\n\n"));
}

#[test]
fn test_batched_embedding_matches_single_batch() {
    let temp = TempDir::new().unwrap();
    let text = long_paragraph("batched", 20);

    let mut one = mock_store(&temp);
    let mut many = mock_store(&temp).with_batch_size(2);
    one.ingest_docs(&[DocumentInput::text("doc", text.clone())])
        .unwrap();
    many.ingest_docs(&[DocumentInput::text("doc", text)]).unwrap();

    assert_eq!(one.chunks(), many.chunks());
    let a = one.search("event number 7", 3).unwrap();
    let b = many.search("event number 7", 3).unwrap();
    let a: Vec<usize> = a.iter().map(|r| r.metadata.position).collect();
    let b: Vec<usize> = b.iter().map(|r| r.metadata.position).collect();
    assert_eq!(a, b);
}

#[test]
fn test_concurrent_searches_on_shared_store() {
    let temp = TempDir::new().unwrap();
    let mut store = mock_store(&temp);
    store
        .ingest_docs(&[DocumentInput::text("saga", long_paragraph("saga", 15))])
        .unwrap();
    let expected = store.search("event number 3", 2).unwrap();

    let shared = store.into_shared();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let store = shared.read().unwrap();
                store.search("event number 3", 2).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let results = handle.join().unwrap();
        assert_eq!(results.len(), expected.len());
        assert_eq!(results[0].text, expected[0].text);
    }
}

#[test]
fn test_store_from_config_with_mock_provider() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = temp.path().to_path_buf();
    config.embedding.provider = "mock".to_string();
    config.embedding.dimension = 48;

    let mut store = RetrievalStore::from_config(&config).unwrap();
    store
        .ingest_docs(&[DocumentInput::text("a", "Configured store.")])
        .unwrap();
    assert_eq!(store.dimension(), Some(48));
    assert_eq!(store.index_dir(), temp.path().join("index"));

    // The embedding cache lives in the data directory by default
    assert!(temp.path().join("embeddings.sqlite").exists());
}

#[test]
#[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
fn test_fastembed_pipeline() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = temp.path().to_path_buf();

    let mut store = RetrievalStore::from_config(&config).unwrap();
    store
        .ingest_docs(&[
            DocumentInput::text("pets", "The cat sleeps on the warm windowsill."),
            DocumentInput::text("taxes", "Quarterly filings are due in April."),
        ])
        .unwrap();

    let results = store.search("a kitten napping in the sun", 1).unwrap();
    assert_eq!(results[0].metadata.source_name, "pets");
}
