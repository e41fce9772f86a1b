//! Derivation backend implementations
//!
//! Each backend shells out to an external tool via `tokio::process` and
//! reports nonzero exits as backend failures with the captured stderr.

pub mod audio;
pub mod image;
pub mod remote;

pub use audio::AudioTranscoder;
pub use image::CoverTranscoder;
pub use remote::RemoteVideoFetcher;
