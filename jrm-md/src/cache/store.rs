//! Artifact metadata store interface
//!
//! The orchestrator reads one record per resource and writes back the
//! derived-artifact fields after a successful derivation. Raw-source
//! fields are owned by the library-scan ingester and are never mutated
//! through this interface.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Media resource kinds served by the cache
///
/// The kind selects the derivation backend and the cache subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Library song audio (lossless raw, Opus derived)
    Audio,
    /// Album cover image (arbitrary raw, WebP derived)
    Cover,
    /// Remotely-sourced video (no local raw, cached MP4 derived)
    Video,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Audio => "audio",
            ResourceKind::Cover => "cover",
            ResourceKind::Video => "video",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent record for one cacheable resource
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    /// Where the untransformed source lives (None until ingested, and
    /// always None for remotely-sourced video)
    pub raw_path: Option<PathBuf>,
    /// Where the derived artifact lives on disk, None until the first
    /// successful derivation
    pub derived_path: Option<PathBuf>,
    /// MIME type associated with the derived artifact once present
    pub content_type: Option<String>,
    /// Secondary artifact (companion thumbnail), where the backend
    /// produces one
    pub thumbnail_path: Option<PathBuf>,
    /// Display title, where the backend reports one
    pub title: Option<String>,
}

/// Fields written back after a successful derivation
#[derive(Debug, Clone)]
pub struct DerivedArtifact {
    pub derived_path: PathBuf,
    pub content_type: String,
    pub thumbnail_path: Option<PathBuf>,
    pub title: Option<String>,
}

/// Store interface consumed by the cache orchestrator
///
/// Implementations must make `set_derived` durable before returning, so
/// the next reader (typically a caller queued on the same per-key lock)
/// sees the write as a cache hit.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Look up the record for a resource. `Ok(None)` when no row exists.
    async fn record(
        &self,
        kind: ResourceKind,
        key: &str,
    ) -> jrm_common::Result<Option<ArtifactRecord>>;

    /// Persist the derived-artifact fields for a resource, creating the
    /// record when absent (remote fetches create their own source).
    async fn set_derived(
        &self,
        kind: ResourceKind,
        key: &str,
        artifact: &DerivedArtifact,
    ) -> jrm_common::Result<()>;
}
