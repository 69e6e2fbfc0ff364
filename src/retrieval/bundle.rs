//! On-disk snapshot bundle
//!
//! A snapshot is three files in one directory: the vector index, the chunk
//! texts and the chunk metadata. All three are written to temporary
//! siblings first and renamed into place with the index last, so a reader
//! never finds a new index next to old chunk lists. A reader that races a
//! writer between renames sees mismatched lengths and rejects the bundle.

use super::ChunkMetadata;
use crate::embedding::{VectorIndex, VectorIndexError};
use crate::error::{LoreError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index.bin";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const METADATA_FILE: &str = "metadata.json";

/// A loaded snapshot
#[derive(Debug)]
pub struct Bundle {
    pub index: VectorIndex,
    pub chunks: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
}

/// Whether all three artifacts are present in `dir`
pub fn exists(dir: &Path) -> bool {
    [INDEX_FILE, CHUNKS_FILE, METADATA_FILE]
        .iter()
        .all(|name| dir.join(name).is_file())
}

/// Write a snapshot, replacing any previous one in `dir`
pub fn write(
    dir: &Path,
    index: &VectorIndex,
    chunks: &[String],
    metadata: &[ChunkMetadata],
) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| LoreError::Io {
        source: e,
        context: format!("Failed to create index directory: {:?}", dir),
    })?;

    let chunks_tmp = write_tmp(dir, CHUNKS_FILE, |w| {
        serde_json::to_writer(w, chunks).map_err(|e| LoreError::Json {
            source: e,
            context: "Failed to serialize chunks".to_string(),
        })
    })?;
    let metadata_tmp = write_tmp(dir, METADATA_FILE, |w| {
        serde_json::to_writer(w, metadata).map_err(|e| LoreError::Json {
            source: e,
            context: "Failed to serialize chunk metadata".to_string(),
        })
    })?;
    let index_tmp = write_tmp(dir, INDEX_FILE, |w| Ok(index.write_to(w)?))?;

    for (tmp, name) in [
        (chunks_tmp, CHUNKS_FILE),
        (metadata_tmp, METADATA_FILE),
        (index_tmp, INDEX_FILE),
    ] {
        let target = dir.join(name);
        std::fs::rename(&tmp, &target).map_err(|e| LoreError::Io {
            source: e,
            context: format!("Failed to move {:?} into place", target),
        })?;
    }

    Ok(())
}

/// Read the snapshot in `dir`
///
/// `Ok(None)` when any artifact is missing; an error when the artifacts
/// exist but cannot be decoded or disagree with each other.
pub fn read(dir: &Path) -> Result<Option<Bundle>> {
    if !exists(dir) {
        return Ok(None);
    }

    let chunks: Vec<String> = read_json(&dir.join(CHUNKS_FILE))?;
    let metadata: Vec<ChunkMetadata> = read_json(&dir.join(METADATA_FILE))?;

    let index_path = dir.join(INDEX_FILE);
    let index = VectorIndex::read_from(BufReader::new(open(&index_path)?))?;

    if chunks.len() != metadata.len() || chunks.len() != index.len() {
        return Err(VectorIndexError::CorruptSnapshot(format!(
            "length mismatch: {} chunks, {} metadata entries, {} vectors",
            chunks.len(),
            metadata.len(),
            index.len()
        ))
        .into());
    }

    if let Some((i, _)) = metadata
        .iter()
        .enumerate()
        .find(|(i, meta)| meta.position != *i)
    {
        return Err(VectorIndexError::CorruptSnapshot(format!(
            "metadata entry {} is out of order",
            i
        ))
        .into());
    }

    Ok(Some(Bundle {
        index,
        chunks,
        metadata,
    }))
}

fn write_tmp<F>(dir: &Path, name: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let path = dir.join(format!("{}.tmp", name));
    let io_err = |e: std::io::Error| LoreError::Io {
        source: e,
        context: format!("Failed to write {:?}", path),
    };

    let file = File::create(&path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer.flush().map_err(io_err)?;
    writer
        .into_inner()
        .map_err(|e| io_err(e.into_error()))?
        .sync_all()
        .map_err(io_err)?;

    Ok(path)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| LoreError::Io {
        source: e,
        context: format!("Failed to open {:?}", path),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    serde_json::from_reader(BufReader::new(open(path)?)).map_err(|e| LoreError::Json {
        source: e,
        context: format!("Failed to parse {:?}", path),
    })
}
