//! Document text extraction
//!
//! Turns ingestion inputs (files on disk or in-memory text) into raw text.
//! Extraction never fails a batch on its own: unreadable files and PDF
//! pages degrade to empty text with a warning, and the caller decides what
//! an empty document means.

use regex::Regex;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// One thing to ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentInput {
    /// A file on disk; `name` overrides the file name as source name
    Path { path: PathBuf, name: Option<String> },
    /// Text already in memory
    Text { name: String, text: String },
}

impl DocumentInput {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path {
            path: path.into(),
            name: None,
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Override the source name
    pub fn with_name(self, name: impl Into<String>) -> Self {
        match self {
            Self::Path { path, .. } => Self::Path {
                path,
                name: Some(name.into()),
            },
            Self::Text { text, .. } => Self::Text {
                name: name.into(),
                text,
            },
        }
    }

    /// Name recorded on every chunk of this document
    pub fn source_name(&self) -> String {
        match self {
            Self::Path {
                name: Some(name), ..
            } => name.clone(),
            Self::Path { path, name: None } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Text { name, .. } => name.clone(),
        }
    }

    /// Where the document came from, if it was a file
    pub fn origin_path(&self) -> Option<&Path> {
        match self {
            Self::Path { path, .. } => Some(path),
            Self::Text { .. } => None,
        }
    }
}

/// Supported file kinds, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// `.txt`, `.md`, `.markdown` and anything unrecognized
    Text,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .as_deref()
        {
            Some("pdf") => Self::Pdf,
            _ => Self::Text,
        }
    }
}

/// Resolve an input to its raw text
///
/// Missing or unreadable files yield an empty string.
pub fn extract_text(input: &DocumentInput) -> String {
    match input {
        DocumentInput::Text { text, .. } => text.clone(),
        DocumentInput::Path { path, .. } => {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Cannot read {}: {}", path.display(), e);
                    return String::new();
                }
            };

            match DocumentKind::from_path(path) {
                DocumentKind::Pdf => {
                    let pages = extract_pdf_pages(&bytes, &path.display().to_string());
                    debug!("Extracted {} pages from {}", pages.len(), path.display());
                    pages.join("\n")
                }
                DocumentKind::Text => decode_lossy(&bytes),
            }
        }
    }
}

/// Decode bytes as UTF-8, replacing invalid sequences
pub fn decode_lossy(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Per-page text of a PDF
///
/// Pages without extractable text come back empty. A document the parser
/// rejects (or panics on) yields no pages at all.
pub fn extract_pdf_pages(bytes: &[u8], label: &str) -> Vec<String> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    match result {
        Ok(Ok(pages)) => pages.iter().map(|page| clean_pdf_page(page)).collect(),
        Ok(Err(e)) => {
            warn!("PDF extraction failed for {}: {}", label, e);
            Vec::new()
        }
        Err(_) => {
            warn!("PDF parser aborted on {}", label);
            Vec::new()
        }
    }
}

fn clean_pdf_page(page: &str) -> String {
    static TRAILING_SPACE: OnceLock<Option<Regex>> = OnceLock::new();
    static BLANK_RUNS: OnceLock<Option<Regex>> = OnceLock::new();

    let mut page = page.to_string();
    if let Some(re) = compiled(&TRAILING_SPACE, r"(?m)[ \t]+$") {
        page = re.replace_all(&page, "").into_owned();
    }
    if let Some(re) = compiled(&BLANK_RUNS, r"\n{3,}") {
        page = re.replace_all(&page, "\n\n").into_owned();
    }
    page.trim().to_string()
}

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}
