//! Owner of all shared indexing state.
//!
//! One [`Engine`] is built at startup and shared by `Arc` between the HTTP
//! handlers, the directory watcher and the CLI commands. It holds the
//! vector store, the processed-file registry, the indexing pipeline, the
//! retriever and the generator; there are no process-wide globals.
//!
//! Every path that may index a file goes through the registry gate
//! ([`DedupRegistry::observe`]) with its hash computed outside the
//! registry lock. Uploads are the exception: they always index, but their
//! hash is recorded before the file becomes visible in the watched folder
//! so the watcher does not index it a second time.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::config::Config;
use crate::dedup::{hash_bytes, hash_file, DedupRegistry};
use crate::embedding::{create_embedder, Embedder};
use crate::extract::{DocumentExtractor, DocumentFormat, Extractor};
use crate::generate::{create_generator, Generator, APOLOGY};
use crate::ingest::{source_name, Indexer};
use crate::models::{ContextRecord, DocumentListing, FolderDocument, IndexReport};
use crate::retrieve::Retriever;
use crate::store::VectorStore;

/// Answer to one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub response: String,
    #[serde(rename = "augmentedQuery")]
    pub augmented_query: String,
    pub contexts: Vec<ContextRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<i64>>,
}

/// Result of storing and indexing an uploaded document.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub filename: String,
    pub format: DocumentFormat,
    pub report: IndexReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub vectors: usize,
    pub dims: usize,
    pub sources: Vec<String>,
    pub registry_files: usize,
}

pub struct Engine {
    config: Config,
    watch_dir: PathBuf,
    store: Arc<VectorStore>,
    registry: Mutex<DedupRegistry>,
    indexer: Indexer,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
}

impl Engine {
    /// Build an engine from configuration alone, using the configured
    /// embedding and generation providers.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::open(config, Arc::new(DocumentExtractor), embedder, generator)
    }

    /// Create the state and watch directories if needed, load the registry
    /// and restore (or create) the vector store.
    ///
    /// The store's dimensionality is taken from `embedder`.
    pub fn open(
        config: Config,
        extractor: Arc<dyn Extractor>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.dir).with_context(|| {
            format!(
                "Failed to create storage directory: {}",
                config.storage.dir.display()
            )
        })?;
        std::fs::create_dir_all(&config.watch.dir).with_context(|| {
            format!(
                "Failed to create watch directory: {}",
                config.watch.dir.display()
            )
        })?;
        let watch_dir = std::fs::canonicalize(&config.watch.dir)?;

        let registry = DedupRegistry::load(&config.storage.registry_path())?;
        let store = Arc::new(
            VectorStore::load_or_create(
                &config.storage.index_path(),
                &config.storage.metadata_path(),
                embedder.dims(),
            )
            .context("Failed to load vector index")?,
        );

        tracing::info!(
            model = embedder.model_name(),
            dims = embedder.dims(),
            vectors = store.len(),
            watch_dir = %watch_dir.display(),
            "engine ready"
        );

        let indexer = Indexer::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            extractor,
            config.chunking.clone(),
        );
        let retriever = Retriever::new(Arc::clone(&store), embedder);

        Ok(Self {
            config,
            watch_dir,
            store,
            registry: Mutex::new(registry),
            indexer,
            retriever,
            generator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Canonical path of the monitored folder.
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Index `path` unless the registry already holds its current bytes.
    ///
    /// Returns `None` when the file was skipped.
    pub async fn ingest_path(&self, path: &Path) -> Result<Option<IndexReport>> {
        let path = std::fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let hash = {
            let p = path.clone();
            tokio::task::spawn_blocking(move || hash_file(&p)).await??
        };
        self.ingest_hashed(&path, &hash).await
    }

    /// Like [`ingest_path`](Self::ingest_path) for a hash the caller has
    /// already computed. `path` must be canonical.
    pub async fn ingest_hashed(&self, path: &Path, hash: &str) -> Result<Option<IndexReport>> {
        let changed = self.registry.lock().await.observe(path, hash)?;
        if !changed {
            tracing::debug!(file = %path.display(), "unchanged, skipping");
            return Ok(None);
        }
        tracing::info!(file = %path.display(), "new or modified document");
        self.indexer.index_file(path).await.map(Some)
    }

    /// Store an uploaded document in the watched folder and index it.
    ///
    /// `filename` must already be sanitized. The bytes are written to a
    /// hidden temp file, their hash is recorded, and only then is the file
    /// renamed into place.
    pub async fn ingest_upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadOutcome> {
        let format = DocumentFormat::from_path(Path::new(filename))
            .ok_or_else(|| anyhow::anyhow!("unsupported file format: {}", filename))?;

        let target = self.watch_dir.join(filename);
        let staging = self
            .watch_dir
            .join(format!(".{}.{}.upload", filename, uuid::Uuid::new_v4()));
        tokio::fs::write(&staging, bytes)
            .await
            .with_context(|| format!("Failed to write upload: {}", staging.display()))?;

        let hash = hash_bytes(bytes);
        {
            let mut registry = self.registry.lock().await;
            let previous = registry.get(&target).cloned();
            if let Err(e) = registry.observe(&target, &hash) {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
            if let Err(e) = tokio::fs::rename(&staging, &target).await {
                let _ = tokio::fs::remove_file(&staging).await;
                if let Err(undo) = registry.restore(&target, previous) {
                    tracing::warn!(file = %target.display(), "failed to restore upload record: {undo:#}");
                }
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to move upload into {}", target.display())));
            }
        }

        let report = self.indexer.index_file(&target).await?;
        Ok(UploadOutcome {
            filename: filename.to_string(),
            format,
            report,
        })
    }

    /// Forget every recorded hash and index every document in the watched
    /// folder again. Returns the number of files indexed.
    ///
    /// The registry stays locked throughout, so watcher events wait and
    /// then see the freshly recorded hashes.
    pub async fn reindex_all(&self) -> Result<usize> {
        let mut registry = self.registry.lock().await;
        registry.reset();

        let mut processed = 0;
        for path in self.folder_files()? {
            let owned = path.clone();
            let hash = match tokio::task::spawn_blocking(move || hash_file(&owned)).await? {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "failed to hash document");
                    continue;
                }
            };
            registry.observe(&path, &hash)?;
            match self.indexer.index_file(&path).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    tracing::error!(file = %path.display(), "reindex failed: {e:#}")
                }
            }
        }

        registry.save()?;
        tracing::info!(files = processed, "reindexed watched folder");
        Ok(processed)
    }

    /// Index every document in the watched folder that the registry has
    /// not seen in its current version. Returns the number indexed.
    pub async fn initial_scan(&self) -> Result<usize> {
        let mut indexed = 0;
        for path in self.folder_files()? {
            match self.ingest_path(&path).await {
                Ok(Some(_)) => indexed += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(file = %path.display(), "initial indexing failed: {e:#}")
                }
            }
        }
        tracing::info!(files = indexed, "initial scan complete");
        Ok(indexed)
    }

    pub fn list_documents(&self) -> Result<DocumentListing> {
        let indexed = self.store.sources()?;
        let mut folder_documents = Vec::new();
        for path in self.folder_files()? {
            let filename = source_name(&path);
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            folder_documents.push(FolderDocument {
                indexed: indexed.contains(&filename),
                path: path.display().to_string(),
                filename,
                size,
            });
        }
        Ok(DocumentListing {
            indexed_documents: indexed.into_iter().collect(),
            folder_documents,
        })
    }

    /// Retrieve contexts for `query` and generate an answer.
    ///
    /// Never fails: retrieval falls back to the bare prompt and generation
    /// failures become [`APOLOGY`].
    pub async fn chat(&self, query: &str, history: Option<Vec<i64>>) -> ChatAnswer {
        let retrieval = self
            .retriever
            .retrieve(query, self.config.retrieval.top_k)
            .await;
        let (response, history) = match self.generator.generate(&retrieval.prompt, history).await {
            Ok(generation) => (generation.text, generation.context),
            Err(e) => {
                tracing::warn!("generation failed: {e:#}");
                (APOLOGY.to_string(), None)
            }
        };
        ChatAnswer {
            response,
            augmented_query: retrieval.prompt,
            contexts: retrieval.contexts,
            history,
        }
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            vectors: self.store.len(),
            dims: self.store.dims(),
            sources: self.store.sources()?.into_iter().collect(),
            registry_files: self.registry.lock().await.len(),
        })
    }

    /// Allowed, non-hidden regular files directly inside the watched
    /// folder, sorted by name.
    fn folder_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.watch_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry
                .with_context(|| format!("Failed to read {}", self.watch_dir.display()))?;
            if entry.file_type().is_file() && is_document(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Non-hidden file with an allowed extension.
pub fn is_document(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    !hidden && DocumentFormat::from_path(path).is_some()
}
