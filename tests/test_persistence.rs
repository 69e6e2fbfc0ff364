/// Persistence Integration Test: snapshot save/load
///
/// Round-trips the three-file bundle through fresh store instances and
/// checks that damaged or missing snapshots are treated as absent.
use lorestore::chunking::SplitterConfig;
use lorestore::embedding::MockEmbeddingProvider;
use lorestore::retrieval::bundle::{CHUNKS_FILE, INDEX_FILE, METADATA_FILE};
use lorestore::{DocumentInput, RetrievalStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn store(dir: &Path) -> RetrievalStore {
    RetrievalStore::new(
        Arc::new(MockEmbeddingProvider::new(64)),
        SplitterConfig {
            min_tokens: 10,
            max_tokens: 50,
            overlap_tokens: 6,
        },
        dir,
    )
}

fn populated(dir: &Path) -> RetrievalStore {
    let mut store = store(dir);
    let chapter: String = (0..10)
        .map(|i| format!("Chapter scene {} takes place at the old mill by the river.", i))
        .collect::<Vec<_>>()
        .join(" ");
    store
        .ingest_docs(&[
            DocumentInput::text("chapter-1.md", format!("# The Mill\n\n{}", chapter)),
            DocumentInput::text("cast.md", "Oren, the miller's apprentice."),
        ])
        .unwrap();
    store
}

#[test]
fn test_save_then_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("index");

    let original = populated(&dir);
    original.save_index(None).unwrap();

    let mut restored = store(&dir);
    assert!(restored.load_index(None));

    assert_eq!(restored.chunks(), original.chunks());
    assert_eq!(restored.metadata(), original.metadata());
    assert_eq!(restored.documents(), original.documents());
    assert_eq!(restored.dimension(), Some(64));

    let before = original.search("the old mill", 4).unwrap();
    let after = restored.search("the old mill", 4).unwrap();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.metadata.position, b.metadata.position);
        assert!((a.score - b.score).abs() < 1e-6);
    }
}

#[test]
fn test_load_twice_is_idempotent() {
    let temp = TempDir::new().unwrap();
    populated(temp.path()).save_index(None).unwrap();

    let mut once = store(temp.path());
    assert!(once.load_index(None));

    let mut twice = store(temp.path());
    assert!(twice.load_index(None));
    assert!(twice.load_index(None));

    assert_eq!(once.chunks(), twice.chunks());
    assert_eq!(once.metadata(), twice.metadata());
    assert_eq!(once.documents().len(), twice.documents().len());
}

#[test]
fn test_no_snapshot_returns_false() {
    let temp = TempDir::new().unwrap();
    let mut store = store(&temp.path().join("never-written"));
    assert!(!store.load_index(None));
    assert!(store.is_empty());
    assert!(store.search("mill", 3).unwrap().is_empty());
}

#[test]
fn test_missing_artifact_is_no_snapshot() {
    for name in [INDEX_FILE, CHUNKS_FILE, METADATA_FILE] {
        let temp = TempDir::new().unwrap();
        populated(temp.path()).save_index(None).unwrap();
        std::fs::remove_file(temp.path().join(name)).unwrap();

        let mut store = store(temp.path());
        assert!(!store.load_index(None), "loaded without {}", name);
        assert!(store.is_empty());
    }
}

#[test]
fn test_corrupt_snapshot_keeps_current_state() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("index");
    populated(&dir).save_index(None).unwrap();
    std::fs::write(dir.join(CHUNKS_FILE), "{ not json").unwrap();

    let mut store = store(temp.path());
    store
        .ingest_docs(&[DocumentInput::text("live", "Unsaved notes.")])
        .unwrap();

    assert!(!store.load_index(Some(dir.as_path())));
    assert_eq!(store.len(), 1);
    assert_eq!(store.chunks()[0], "Unsaved notes.");
}

#[test]
fn test_ingest_after_load_appends() {
    let temp = TempDir::new().unwrap();
    let original = populated(temp.path());
    let saved = original.len();
    original.save_index(None).unwrap();

    let mut store = store(temp.path());
    assert!(store.load_index(None));
    store
        .ingest_docs(&[DocumentInput::text("epilogue.md", "The mill burned down.")])
        .unwrap();

    assert_eq!(store.len(), saved + 1);
    assert_eq!(store.metadata()[saved].position, saved);
    assert_eq!(store.documents().len(), 3);

    let results = store.search("The mill burned down.", 1).unwrap();
    assert_eq!(results[0].metadata.source_name, "epilogue.md");
}

#[test]
fn test_save_to_explicit_directory() {
    let temp = TempDir::new().unwrap();
    let elsewhere = temp.path().join("exports/snapshot");

    let store_a = populated(&temp.path().join("default"));
    store_a.save_index(Some(elsewhere.as_path())).unwrap();
    assert!(!temp.path().join("default").join(INDEX_FILE).exists());

    let mut store_b = store(&temp.path().join("default"));
    assert!(store_b.load_index(Some(elsewhere.as_path())));
    assert_eq!(store_b.len(), store_a.len());
}

#[test]
fn test_empty_store_save_and_load() {
    let temp = TempDir::new().unwrap();
    store(temp.path()).save_index(None).unwrap();

    let mut restored = store(temp.path());
    assert!(restored.load_index(None));
    assert!(restored.is_empty());
    assert!(restored.search("anything", 2).unwrap().is_empty());
    assert!(restored.stats().snapshot_on_disk);
}
