//! Cover image transcoding backend
//!
//! Converts arbitrary cover art (PNG, JPEG, BMP) into compact WebP via
//! ffmpeg. Width is capped while preserving aspect ratio; images already
//! narrower than the cap are not upscaled.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::cache::{BackendError, DerivationBackend, DerivationResult, DeriveRequest};

const FFMPEG_COMMAND: &str = "ffmpeg";

/// Cover image transcoder (arbitrary image → WebP)
pub struct CoverTranscoder {
    /// Maximum output width in pixels
    max_width: u32,
    /// WebP quality (1-100)
    quality: u32,
}

impl CoverTranscoder {
    pub fn new(max_width: u32, quality: u32) -> Self {
        Self { max_width, quality }
    }

    fn ffmpeg_args(&self, raw: &Path, target: &Path) -> Vec<OsString> {
        // -2 keeps the height even while preserving aspect ratio
        let scale = format!("scale='min({},iw)':-2", self.max_width);
        let mut args: Vec<OsString> = Vec::new();
        args.push("-y".into());
        args.push("-i".into());
        args.push(raw.into());
        args.push("-vf".into());
        args.push(scale.into());
        args.push("-frames:v".into());
        args.push("1".into());
        args.push("-c:v".into());
        args.push("libwebp".into());
        args.push("-quality".into());
        args.push(self.quality.to_string().into());
        args.push(target.into());
        args
    }
}

#[async_trait]
impl DerivationBackend for CoverTranscoder {
    fn name(&self) -> &'static str {
        "cover-transcode"
    }

    fn extension(&self) -> &'static str {
        "webp"
    }

    fn content_type(&self) -> &'static str {
        "image/webp"
    }

    async fn derive(&self, request: &DeriveRequest) -> Result<DerivationResult, BackendError> {
        let raw = request
            .raw_path
            .as_deref()
            .ok_or(BackendError::MissingRawSource)?;

        debug!(raw = %raw.display(), target = %request.target_path.display(),
               max_width = self.max_width, quality = self.quality, "transcoding cover image");

        let output = Command::new(FFMPEG_COMMAND)
            .args(self.ffmpeg_args(raw, &request.target_path))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::Spawn {
                tool: FFMPEG_COMMAND,
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(BackendError::Failed {
                tool: FFMPEG_COMMAND,
                stderr,
            });
        }

        Ok(DerivationResult {
            artifact_path: request.target_path.clone(),
            thumbnail_path: None,
            title: None,
        })
    }
}
