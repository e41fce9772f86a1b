//! Audio transcoding backend
//!
//! Converts lossless library audio (FLAC, WAV, ALAC) into Opus for
//! streaming by invoking ffmpeg. The bitrate comes from the settings
//! table at startup.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::cache::{BackendError, DerivationBackend, DerivationResult, DeriveRequest};

/// ffmpeg command name
const FFMPEG_COMMAND: &str = "ffmpeg";

/// Audio transcoder (lossless source → Opus)
pub struct AudioTranscoder {
    /// Target bitrate in kbit/s
    bitrate_kbps: u32,
}

impl AudioTranscoder {
    pub fn new(bitrate_kbps: u32) -> Self {
        Self { bitrate_kbps }
    }

    /// ffmpeg argument list for one transcode
    ///
    /// `-avoid_negative_ts make_zero` normalizes source timestamps so the
    /// produced stream always starts at zero.
    fn ffmpeg_args(&self, raw: &Path, target: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        args.push("-y".into());
        args.push("-i".into());
        args.push(raw.into());
        args.push("-vn".into());
        args.push("-c:a".into());
        args.push("libopus".into());
        args.push("-b:a".into());
        args.push(format!("{}k", self.bitrate_kbps).into());
        args.push("-avoid_negative_ts".into());
        args.push("make_zero".into());
        args.push(target.into());
        args
    }
}

#[async_trait]
impl DerivationBackend for AudioTranscoder {
    fn name(&self) -> &'static str {
        "audio-transcode"
    }

    fn extension(&self) -> &'static str {
        "opus"
    }

    fn content_type(&self) -> &'static str {
        "audio/opus"
    }

    async fn derive(&self, request: &DeriveRequest) -> Result<DerivationResult, BackendError> {
        let raw = request
            .raw_path
            .as_deref()
            .ok_or(BackendError::MissingRawSource)?;

        debug!(raw = %raw.display(), target = %request.target_path.display(),
               bitrate_kbps = self.bitrate_kbps, "transcoding audio");

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

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn declares_opus_artifact() {
        let backend = AudioTranscoder::new(128);
        assert_eq!(backend.extension(), "opus");
        assert_eq!(backend.content_type(), "audio/opus");
        assert!(backend.needs_raw_source());
    }

    #[test]
    fn args_carry_bitrate_and_timestamp_normalization() {
        let backend = AudioTranscoder::new(96);
        let args = backend.ffmpeg_args(
            &PathBuf::from("/raw/a.flac"),
            &PathBuf::from("/cache/audio/a.opus"),
        );

        assert!(args.contains(&OsString::from("96k")));
        assert!(args.contains(&OsString::from("-avoid_negative_ts")));
        assert!(args.contains(&OsString::from("libopus")));
        // Target path is the last argument
        assert_eq!(args.last(), Some(&OsString::from("/cache/audio/a.opus")));
    }
}
