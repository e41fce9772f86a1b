//! Cache orchestrator
//!
//! The single code path serving all three resource kinds: decide cache
//! hit vs. miss, serialize derivation per key, invoke the backend,
//! persist the result, hand back an open file and content type, clean up
//! on failure.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{DerivationBackend, DeriveRequest};
use super::keylock::KeyLocks;
use super::store::{ArtifactStore, DerivedArtifact, ResourceKind};

/// Open artifact ready to stream to a client
#[derive(Debug)]
pub struct CachedArtifact {
    pub file: File,
    pub content_type: String,
    pub path: PathBuf,
}

/// Failure modes surfaced to stream-serving handlers
///
/// Every failure below this boundary is folded into one of these three;
/// raw process exit codes and filesystem errors never leak past it.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Resource record absent, or raw source file missing on disk
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller withdrew the request; partial output has been cleaned up
    #[error("request cancelled")]
    Cancelled,

    /// Backend failure or unexpected I/O error; partial output removed
    #[error("internal error: {0}")]
    Internal(String),
}

/// Derived-artifact cache over a metadata store and a cache directory
///
/// One instance serves all resource kinds; the backend passed to
/// [`MediaCache::fetch`] selects the derivation.
pub struct MediaCache {
    cache_dir: PathBuf,
    store: Arc<dyn ArtifactStore>,
    locks: KeyLocks,
}

impl MediaCache {
    pub fn new(cache_dir: PathBuf, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            cache_dir,
            store,
            locks: KeyLocks::new(),
        }
    }

    /// Get the derived artifact for a resource, deriving it on first use.
    ///
    /// Holds the per-resource lock for the whole derivation so no second
    /// caller can race to derive the same resource; callers for other
    /// keys are unaffected. Waiting for the lock and the derivation
    /// itself both honor `cancel`.
    pub async fn fetch(
        &self,
        kind: ResourceKind,
        key: &str,
        backend: &dyn DerivationBackend,
        cancel: &CancellationToken,
    ) -> Result<CachedArtifact, CacheError> {
        let lock_key = format!("{}/{}", kind, key);
        let _guard = tokio::select! {
            guard = self.locks.acquire(&lock_key) => guard,
            _ = cancel.cancelled() => return Err(CacheError::Cancelled),
        };

        let record = self
            .store
            .record(kind, key)
            .await
            .map_err(|e| CacheError::Internal(format!("record lookup failed: {}", e)))?;

        // Cache hit check: the derived locator, once set and the file
        // still on disk, is authoritative.
        if let Some(rec) = &record {
            if let Some(derived) = &rec.derived_path {
                match File::open(derived).await {
                    Ok(file) => {
                        let content_type = rec
                            .content_type
                            .clone()
                            .unwrap_or_else(|| backend.content_type().to_string());
                        debug!(%kind, key, path = %derived.display(), "cache hit");
                        return Ok(CachedArtifact {
                            file,
                            content_type,
                            path: derived.clone(),
                        });
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        // Backing file deleted externally; re-derive
                        warn!(%kind, key, path = %derived.display(),
                              "cached artifact missing on disk, re-deriving");
                    }
                    Err(e) => {
                        return Err(CacheError::Internal(format!(
                            "failed to open cached artifact: {}",
                            e
                        )));
                    }
                }
            }
        }

        // Raw-source precondition. Fetch backends create their own source,
        // so for them a missing record or raw locator is not a failure.
        let raw_path = if backend.needs_raw_source() {
            let Some(rec) = &record else {
                return Err(CacheError::NotFound(format!("no {} record for {}", kind, key)));
            };
            let Some(raw) = &rec.raw_path else {
                return Err(CacheError::NotFound(format!(
                    "{} {} has no raw source",
                    kind, key
                )));
            };
            match tokio::fs::metadata(raw).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(CacheError::NotFound(format!(
                        "raw source missing on disk: {}",
                        raw.display()
                    )));
                }
                Err(e) => {
                    return Err(CacheError::Internal(format!(
                        "failed to stat raw source: {}",
                        e
                    )));
                }
            }
            Some(raw.clone())
        } else {
            None
        };

        // Deterministic target path; clear any stale partial left by a
        // previous failed attempt.
        let target_dir = self.cache_dir.join(kind.as_str());
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| CacheError::Internal(format!("failed to create cache dir: {}", e)))?;
        let target_path = target_dir.join(format!("{}.{}", key, backend.extension()));
        match tokio::fs::remove_file(&target_path).await {
            Ok(()) => {
                warn!(%kind, key, path = %target_path.display(),
                      "removed stale partial artifact from previous attempt");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CacheError::Internal(format!(
                    "failed to remove stale artifact: {}",
                    e
                )));
            }
        }

        let request = DeriveRequest {
            key: key.to_string(),
            raw_path,
            target_path: target_path.clone(),
        };

        info!(backend = backend.name(), %kind, key, "deriving artifact");
        let derived = tokio::select! {
            result = backend.derive(&request) => match result {
                Ok(derived) => derived,
                Err(e) => {
                    self.discard_partial(&target_path).await;
                    warn!(backend = backend.name(), %kind, key, error = %e,
                          "derivation failed");
                    return Err(CacheError::Internal(format!(
                        "{} failed: {}",
                        backend.name(),
                        e
                    )));
                }
            },
            _ = cancel.cancelled() => {
                self.discard_partial(&target_path).await;
                debug!(backend = backend.name(), %kind, key, "derivation cancelled");
                return Err(CacheError::Cancelled);
            }
        };

        // Persist before the lock is released so the next waiter observes
        // the write as a cache hit.
        let artifact = DerivedArtifact {
            derived_path: derived.artifact_path.clone(),
            content_type: backend.content_type().to_string(),
            thumbnail_path: derived.thumbnail_path.clone(),
            title: derived.title.clone(),
        };
        if let Err(e) = self.store.set_derived(kind, key, &artifact).await {
            self.discard_partial(&target_path).await;
            return Err(CacheError::Internal(format!(
                "failed to persist derived artifact: {}",
                e
            )));
        }

        let file = File::open(&derived.artifact_path).await.map_err(|e| {
            CacheError::Internal(format!("failed to open derived artifact: {}", e))
        })?;
        info!(%kind, key, path = %derived.artifact_path.display(), "artifact derived and cached");
        Ok(CachedArtifact {
            file,
            content_type: artifact.content_type,
            path: derived.artifact_path,
        })
    }

    /// Delete partial output after a failed or cancelled derivation.
    ///
    /// Never leaves a truncated artifact a later cache-hit check could
    /// mistake for a valid one.
    async fn discard_partial(&self, target_path: &Path) {
        match tokio::fs::remove_file(target_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %target_path.display(), error = %e,
                      "failed to remove partial artifact");
            }
        }
    }
}
