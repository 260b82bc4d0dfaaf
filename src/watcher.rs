//! Monitored-folder watcher.
//!
//! Filesystem events are coalesced by `notify-debouncer-mini`, filtered to
//! candidate documents, and forwarded over a channel to one processing
//! task. For each path the task waits until the file stops changing, then
//! hands it to [`Engine::ingest_hashed`], which skips versions the
//! registry already holds.
//!
//! Errors are logged per event; nothing here stops the loop.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;

use crate::dedup::hash_file;
use crate::engine::{is_document, Engine};

pub struct DocumentWatcher {
    _handle: tokio::task::JoinHandle<()>,
}

impl DocumentWatcher {
    /// Start watching the engine's monitored folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized.
    pub fn start(engine: Arc<Engine>) -> Result<Self> {
        let watch = engine.config().watch.clone();
        let root = engine.watch_dir().to_path_buf();
        let (notify_tx, mut notify_rx) = mpsc::channel::<PathBuf>(128);

        let mut debouncer = new_debouncer(watch.debounce(), move |res: DebounceEventResult| {
            let events = match res {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!("document watcher error: {e}");
                    return;
                }
            };

            let paths: HashSet<PathBuf> = events
                .into_iter()
                .map(|e| e.path)
                .filter(|p| is_document(p))
                .collect();

            for path in paths {
                if notify_tx.blocking_send(path).is_err() {
                    return;
                }
            }
        })?;

        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %root.display(), "watching for documents");

        let interval = watch.stability_interval();
        let attempts = watch.stability_attempts;
        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while let Some(path) = notify_rx.recv().await {
                let hash = match wait_for_stable(&path, interval, attempts).await {
                    Ok(Some(hash)) => hash,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(file = %path.display(), "stability check failed: {e:#}");
                        continue;
                    }
                };
                if let Err(e) = engine.ingest_hashed(&path, &hash).await {
                    tracing::warn!(file = %path.display(), "indexing failed: {e:#}");
                }
            }
        });

        Ok(Self { _handle: handle })
    }

    /// Start watching, then index what is already in the folder.
    ///
    /// The watch is registered before the scan, so files that arrive while
    /// the scan runs still produce events. Files seen by both go through
    /// the registry gate and are indexed once.
    pub async fn start_with_initial_scan(engine: Arc<Engine>) -> Result<Self> {
        let watcher = Self::start(Arc::clone(&engine))?;
        engine.initial_scan().await?;
        Ok(watcher)
    }
}

/// Sample `(size, hash)` every `interval` until two consecutive samples
/// agree, and return that hash.
///
/// Returns `None` when the file is gone or is still changing after
/// `attempts` comparisons.
pub async fn wait_for_stable(
    path: &Path,
    interval: Duration,
    attempts: u32,
) -> Result<Option<String>> {
    let mut previous = match sample(path).await? {
        Some(s) => s,
        None => return Ok(None),
    };
    for _ in 0..attempts {
        tokio::time::sleep(interval).await;
        let current = match sample(path).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        if current == previous {
            return Ok(Some(current.1));
        }
        previous = current;
    }
    tracing::warn!(
        file = %path.display(),
        attempts,
        "file still changing, skipping until the next event"
    );
    Ok(None)
}

async fn sample(path: &Path) -> Result<Option<(u64, String)>> {
    let size = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m.len(),
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || hash_file(&owned)).await? {
        Ok(hash) => Ok(Some((size, hash))),
        Err(_) if !path.exists() => Ok(None),
        Err(e) => Err(e),
    }
}
