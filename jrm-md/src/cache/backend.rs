//! Derivation backend interface
//!
//! A backend turns a raw source into a derived artifact: audio transcode,
//! image transcode, or remote fetch. Backends run as external processes
//! and are expected to be slow (seconds); the orchestrator awaits
//! completion while holding the per-resource lock.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Input handed to a derivation backend
#[derive(Debug, Clone)]
pub struct DeriveRequest {
    /// Resource key; for fetch backends this addresses the remote resource
    pub key: String,
    /// Raw source on local disk; None for backends that fetch their own
    pub raw_path: Option<PathBuf>,
    /// Where the primary artifact must be written
    pub target_path: PathBuf,
}

/// Files produced by a successful derivation
#[derive(Debug, Clone)]
pub struct DerivationResult {
    /// Primary derived artifact (normally the requested target path)
    pub artifact_path: PathBuf,
    /// Companion thumbnail, for backends that produce one
    pub thumbnail_path: Option<PathBuf>,
    /// Display title, for backends that report one
    pub title: Option<String>,
}

/// Backend failure modes
///
/// Partial output left at the target path is the orchestrator's problem;
/// backends only report what went wrong.
#[derive(Error, Debug)]
pub enum BackendError {
    /// External tool exited with a nonzero status
    #[error("{tool} exited with failure: {stderr}")]
    Failed { tool: &'static str, stderr: String },

    /// External tool could not be started
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    /// A raw-source backend was invoked without a raw locator
    #[error("no raw source provided")]
    MissingRawSource,

    /// Unexpected I/O error around the invocation
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pluggable unit that turns a raw source into a derived artifact
#[async_trait]
pub trait DerivationBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// File extension of the derived artifact
    fn extension(&self) -> &'static str;

    /// MIME type stored alongside the derived artifact
    fn content_type(&self) -> &'static str;

    /// Whether a raw source file must exist before derivation.
    ///
    /// Remote fetch backends create their own source and return false;
    /// the orchestrator then skips the raw-file precondition entirely.
    fn needs_raw_source(&self) -> bool {
        true
    }

    /// Produce the derived artifact at `request.target_path`.
    ///
    /// On failure the backend may leave partial output at the target
    /// path; the orchestrator deletes it.
    async fn derive(&self, request: &DeriveRequest) -> Result<DerivationResult, BackendError>;
}
