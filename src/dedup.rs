//! Processed-file registry.
//!
//! Maps each observed file path to the SHA-256 of the bytes that were last
//! handed to the indexing pipeline. A path whose bytes hash to the recorded
//! value is skipped; anything else is recorded, persisted, and reported as
//! needing work.
//!
//! The record is written *before* indexing runs. A file whose indexing
//! fails is therefore not retried until its bytes change or a full
//! reindex clears the registry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Last indexed version of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub content_hash: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DedupRegistry {
    path: PathBuf,
    files: BTreeMap<PathBuf, FileRecord>,
}

impl DedupRegistry {
    /// Load the registry persisted at `path`, or start empty if the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let files = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read registry: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse registry: {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        tracing::info!(path = %path.display(), files = files.len(), "loaded processed-file registry");
        Ok(Self {
            path: path.to_path_buf(),
            files,
        })
    }

    /// Hash the file's current bytes and decide whether it needs indexing.
    pub fn should_process(&mut self, path: &Path) -> Result<bool> {
        let hash = hash_file(path)?;
        self.observe(path, &hash)
    }

    /// Decide for a hash the caller has already computed.
    ///
    /// Returns `false` only when `path` is recorded with exactly `hash`.
    /// Otherwise records the new hash, saves, and returns `true`. If the
    /// save fails the previous record is restored.
    pub fn observe(&mut self, path: &Path, hash: &str) -> Result<bool> {
        if self
            .files
            .get(path)
            .is_some_and(|r| r.content_hash == hash)
        {
            return Ok(false);
        }
        let previous = self.files.insert(
            path.to_path_buf(),
            FileRecord {
                content_hash: hash.to_string(),
                recorded_at: Utc::now(),
            },
        );
        if let Err(e) = self.save() {
            // Unsaved records must not gate the file.
            match previous {
                Some(record) => self.files.insert(path.to_path_buf(), record),
                None => self.files.remove(path),
            };
            return Err(e);
        }
        Ok(true)
    }

    /// Put back `record` (or drop the entry when `None`) and save.
    pub fn restore(&mut self, path: &Path, record: Option<FileRecord>) -> Result<()> {
        match record {
            Some(record) => self.files.insert(path.to_path_buf(), record),
            None => self.files.remove(path),
        };
        self.save()
    }

    /// Forget every record. Persisted state is untouched until [`save`](Self::save).
    pub fn reset(&mut self) {
        self.files.clear();
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&self.files)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write registry: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace registry: {}", self.path.display()))?;
        tracing::debug!(files = self.files.len(), "saved processed-file registry");
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Hex SHA-256 of a file's bytes, streamed.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
