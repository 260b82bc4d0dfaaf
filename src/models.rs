//! Core data models shared by the indexing and retrieval paths.

use serde::{Deserialize, Serialize};

/// Metadata stored alongside each vector, at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Full chunk text.
    pub text: String,
    /// First 500 characters of `text` with non-ASCII characters removed.
    pub preview: String,
    /// Originating file name.
    pub source: String,
    /// `"<source>-chunk-<index>"`; unique only within one source.
    pub chunk_id: String,
}

/// A retrieved chunk handed to the generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub content: String,
    pub source: String,
    pub chunk_id: String,
    /// Raw distance to the query (lower is closer). The key name is kept
    /// for compatibility with existing clients.
    pub similarity: f32,
}

/// Outcome of indexing a single document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Chunks embedded and appended to the store.
    pub stored: usize,
    /// Chunks dropped because embedding or append failed.
    pub failed: usize,
}

/// Entry in the monitored-folder listing.
#[derive(Debug, Clone, Serialize)]
pub struct FolderDocument {
    pub filename: String,
    pub path: String,
    pub indexed: bool,
    pub size: u64,
}

/// Result of the list-documents operation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentListing {
    pub indexed_documents: Vec<String>,
    pub folder_documents: Vec<FolderDocument>,
}
