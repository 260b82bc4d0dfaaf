//! Indexing pipeline: text → chunks → embeddings → vector store.
//!
//! Indexing is best-effort per file. A chunk whose embedding (or append)
//! fails is logged and counted in [`IndexReport::failed`]; the remaining
//! chunks still go in. The store is persisted once per file, after the
//! last chunk, and a persistence failure fails the whole call.
//!
//! Embedding runs without holding any store lock; only the final
//! [`VectorStore::append`] takes the write lock.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{chunk_id, chunk_text, preview};
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::extract::Extractor;
use crate::models::{ChunkMeta, IndexReport};
use crate::store::VectorStore;

pub struct Indexer {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn Extractor>,
    chunking: ChunkingConfig,
}

impl Indexer {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn Extractor>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            chunking,
        }
    }

    /// Extract `path` and index its text under the file's name.
    pub async fn index_file(&self, path: &Path) -> Result<IndexReport> {
        let source_name = source_name(path);
        let raw_text = self.extract(path).await?;
        self.index(path, &raw_text, &source_name).await
    }

    /// Chunk, embed and append `raw_text`, then persist the store.
    ///
    /// `path` is only used for logging.
    pub async fn index(&self, path: &Path, raw_text: &str, source_name: &str) -> Result<IndexReport> {
        let chunks = chunk_text(raw_text, self.chunking.size, self.chunking.overlap)?;
        let mut report = IndexReport {
            chunks: chunks.len(),
            ..IndexReport::default()
        };

        for (i, text) in chunks.into_iter().enumerate() {
            let id = chunk_id(source_name, i);
            let vector = match self.embedder.embed(&text).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(chunk_id = %id, error = %e, "failed to embed chunk");
                    report.failed += 1;
                    continue;
                }
            };
            let meta = ChunkMeta {
                preview: preview(&text),
                text,
                source: source_name.to_string(),
                chunk_id: id,
            };
            match self.store.append(vector, meta) {
                Ok(_) => report.stored += 1,
                Err(e) => {
                    tracing::warn!(chunk = i, source = source_name, error = %e, "failed to store chunk");
                    report.failed += 1;
                }
            }
        }

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.persist())
            .await
            .context("persist task panicked")?
            .with_context(|| format!("Failed to persist index after {}", path.display()))?;

        tracing::info!(
            file = %path.display(),
            chunks = report.chunks,
            stored = report.stored,
            failed = report.failed,
            "indexed document"
        );
        Ok(report)
    }

    async fn extract(&self, path: &Path) -> Result<String> {
        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .context("extraction task panicked")?
            .with_context(|| format!("Failed to extract {}", path.display()))?;
        Ok(text)
    }
}

/// File name used as the `source` of every chunk from `path`.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
