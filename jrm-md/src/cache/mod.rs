//! Derived-artifact cache engine
//!
//! Lazily converts raw media (lossless audio, raw cover images,
//! remotely-sourced video) into streamable formats on first request and
//! caches the result durably. Concurrent requests for the same resource
//! never trigger duplicate derivation work: the first caller to take the
//! per-resource lock derives, every other caller blocks and then sees a
//! cache hit.

pub mod backend;
pub mod keylock;
pub mod orchestrator;
pub mod store;

pub use backend::{BackendError, DerivationBackend, DerivationResult, DeriveRequest};
pub use keylock::KeyLocks;
pub use orchestrator::{CacheError, CachedArtifact, MediaCache};
pub use store::{ArtifactRecord, ArtifactStore, DerivedArtifact, ResourceKind};
