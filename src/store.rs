//! Append-only flat vector store with positionally aligned metadata.
//!
//! Vector `i` and metadata entry `i` always describe the same chunk. Both
//! sequences live behind one [`RwLock`]: [`append`](VectorStore::append)
//! takes the write lock for the pair, while [`search`](VectorStore::search)
//! and the persistence snapshot hold the read lock for the entire
//! read-then-interpret sequence.
//!
//! # On-disk layout
//!
//! Two paired artifacts, each replaced atomically by write-then-rename:
//!
//! ```text
//! index.bin      "RDVI" | version u32 | dims u32 | count u64 | count*dims f32 (LE)
//! metadata.json  { "count": n, "entries": [ChunkMeta; n] }
//! ```
//!
//! A crash between the two renames leaves artifacts with different counts;
//! [`VectorStore::load_or_create`] refuses to serve such a pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

use crate::models::ChunkMeta;

const INDEX_MAGIC: &[u8; 4] = b"RDVI";
const INDEX_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector has {actual} dimensions, index expects {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("index holds {vectors} vectors but metadata holds {entries} entries")]
    Misaligned { vectors: usize, entries: usize },

    #[error("corrupt index artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// One nearest-neighbor result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Squared Euclidean distance to the query.
    pub distance: f32,
    /// Ordinal position in the index.
    pub position: usize,
    pub meta: ChunkMeta,
}

#[derive(Default)]
struct Inner {
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMeta>,
}

#[derive(Serialize, Deserialize)]
struct MetadataFile {
    count: usize,
    entries: Vec<ChunkMeta>,
}

pub struct VectorStore {
    dims: usize,
    index_path: PathBuf,
    metadata_path: PathBuf,
    inner: RwLock<Inner>,
    // Serializes writers of the artifacts so an older snapshot never
    // replaces a newer one.
    persist_lock: Mutex<()>,
}

impl VectorStore {
    /// Empty store that will persist to the given paths.
    pub fn new(index_path: &Path, metadata_path: &Path, dims: usize) -> Self {
        Self {
            dims,
            index_path: index_path.to_path_buf(),
            metadata_path: metadata_path.to_path_buf(),
            inner: RwLock::new(Inner::default()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Restore both artifacts, or start empty when either is missing.
    ///
    /// Fails when the artifacts disagree on length, when the stored
    /// dimensionality differs from `dims`, or when the index is truncated.
    pub fn load_or_create(
        index_path: &Path,
        metadata_path: &Path,
        dims: usize,
    ) -> Result<Self, StoreError> {
        let store = Self::new(index_path, metadata_path, dims);

        match (index_path.exists(), metadata_path.exists()) {
            (true, true) => {}
            (false, false) => {
                tracing::info!(dims, "created new empty vector index");
                return Ok(store);
            }
            (has_index, has_meta) => {
                tracing::warn!(
                    index = has_index,
                    metadata = has_meta,
                    "only one index artifact present; starting with an empty index"
                );
                return Ok(store);
            }
        }

        let vectors = read_index(index_path, dims)?;

        let raw = std::fs::read(metadata_path).map_err(|source| StoreError::Io {
            path: metadata_path.to_path_buf(),
            source,
        })?;
        let meta: MetadataFile = serde_json::from_slice(&raw)?;
        if meta.count != meta.entries.len() {
            return Err(StoreError::Corrupt {
                path: metadata_path.to_path_buf(),
                reason: format!(
                    "header says {} entries, found {}",
                    meta.count,
                    meta.entries.len()
                ),
            });
        }
        if vectors.len() != meta.entries.len() {
            return Err(StoreError::Misaligned {
                vectors: vectors.len(),
                entries: meta.entries.len(),
            });
        }

        tracing::info!(vectors = vectors.len(), dims, "loaded existing vector index");
        *store.inner.write().map_err(|_| StoreError::Poisoned)? = Inner {
            vectors,
            metadata: meta.entries,
        };
        Ok(store)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Append one vector and its metadata as a unit. Returns the position.
    pub fn append(&self, vector: Vec<f32>, meta: ChunkMeta) -> Result<usize, StoreError> {
        if vector.len() != self.dims {
            return Err(StoreError::Dimension {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        inner.vectors.push(vector);
        inner.metadata.push(meta);
        Ok(inner.vectors.len() - 1)
    }

    /// Exact k-nearest-neighbor scan, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        if query.len() != self.dims {
            return Err(StoreError::Dimension {
                expected: self.dims,
                actual: query.len(),
            });
        }
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        if k == 0 || inner.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = inner
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (squared_l2(query, v), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, position)| SearchHit {
                distance,
                position,
                meta: inner.metadata[position].clone(),
            })
            .collect())
    }

    /// Write both artifacts from one consistent snapshot.
    pub fn persist(&self) -> Result<(), StoreError> {
        let _writer = self.persist_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let (index_bytes, meta_bytes, count) = {
            let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
            let meta = MetadataFile {
                count: inner.metadata.len(),
                entries: inner.metadata.clone(),
            };
            (
                encode_index(self.dims, &inner.vectors),
                serde_json::to_vec(&meta)?,
                inner.vectors.len(),
            )
        };

        write_atomic(&self.index_path, &index_bytes)?;
        write_atomic(&self.metadata_path, &meta_bytes)?;
        tracing::debug!(vectors = count, "persisted vector index");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.vectors.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lengths of (vectors, metadata). Equal unless something is badly wrong.
    pub fn lengths(&self) -> Result<(usize, usize), StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok((inner.vectors.len(), inner.metadata.len()))
    }

    /// Distinct `source` values present in the metadata.
    pub fn sources(&self) -> Result<BTreeSet<String>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.metadata.iter().map(|m| m.source.clone()).collect())
    }

    /// Copy of the metadata entry at `position`.
    pub fn metadata_at(&self, position: usize) -> Result<Option<ChunkMeta>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.metadata.get(position).cloned())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn encode_index(dims: usize, vectors: &[Vec<f32>]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * dims * 4);
    bytes.extend_from_slice(INDEX_MAGIC);
    bytes.extend_from_slice(&INDEX_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(dims as u32).to_le_bytes());
    bytes.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    for v in vectors {
        for &x in v {
            bytes.extend_from_slice(&x.to_le_bytes());
        }
    }
    bytes
}

fn read_index(path: &Path, dims: usize) -> Result<Vec<Vec<f32>>, StoreError> {
    let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    if bytes.len() < HEADER_LEN || &bytes[..4] != INDEX_MAGIC {
        return Err(corrupt("missing index header".to_string()));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != INDEX_VERSION {
        return Err(corrupt(format!("unsupported format version {}", version)));
    }
    let stored_dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    if stored_dims != dims {
        return Err(StoreError::Dimension {
            expected: dims,
            actual: stored_dims,
        });
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes);

    let payload = &bytes[HEADER_LEN..];
    let expected_len = usize::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(dims))
        .and_then(|n| n.checked_mul(4));
    if dims == 0 || expected_len != Some(payload.len()) {
        return Err(corrupt(format!(
            "expected {} vectors of {} dims, payload is {} bytes",
            count,
            dims,
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(dims * 4)
        .map(|row| {
            row.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        })
        .collect())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);
    std::fs::rename(&tmp, path).map_err(io_err)
}
