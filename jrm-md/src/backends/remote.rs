//! Remote video fetch backend
//!
//! Downloads remotely-sourced video into the local cache via yt-dlp,
//! together with a companion thumbnail and the display title. Unlike the
//! transcode backends there is no local raw source; the resource key
//! itself addresses the remote media.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::cache::{BackendError, DerivationBackend, DerivationResult, DeriveRequest};

/// yt-dlp command name
const YTDLP_COMMAND: &str = "yt-dlp";

/// Watch URL prefix the video key is appended to
const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";

/// Remote video fetcher (video key → cached MP4 + thumbnail + title)
pub struct RemoteVideoFetcher;

impl RemoteVideoFetcher {
    pub fn new() -> Self {
        Self
    }

    fn ytdlp_args(&self, key: &str, target: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        args.push("-f".into());
        args.push("mp4".into());
        args.push("-o".into());
        args.push(target.into());
        args.push("--write-thumbnail".into());
        args.push("--convert-thumbnails".into());
        args.push("jpg".into());
        args.push("--no-progress".into());
        // --print implies simulate; --no-simulate keeps the download
        args.push("--no-simulate".into());
        args.push("--print".into());
        args.push("after_move:title".into());
        args.push(format!("{}{}", WATCH_URL_BASE, key).into());
        args
    }
}

impl Default for RemoteVideoFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DerivationBackend for RemoteVideoFetcher {
    fn name(&self) -> &'static str {
        "remote-fetch"
    }

    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn content_type(&self) -> &'static str {
        "video/mp4"
    }

    /// The fetch creates its own source; there is no raw-file precondition.
    fn needs_raw_source(&self) -> bool {
        false
    }

    async fn derive(&self, request: &DeriveRequest) -> Result<DerivationResult, BackendError> {
        debug!(key = %request.key, target = %request.target_path.display(),
               "fetching remote video");

        let output = Command::new(YTDLP_COMMAND)
            .args(self.ytdlp_args(&request.key, &request.target_path))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::Spawn {
                tool: YTDLP_COMMAND,
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(BackendError::Failed {
                tool: YTDLP_COMMAND,
                stderr,
            });
        }

        // --print after_move:title writes the title to stdout
        let title = {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let trimmed = stdout.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };

        // yt-dlp writes the thumbnail next to the output file
        let thumbnail = thumbnail_path_for(&request.target_path);
        let thumbnail_path = match tokio::fs::metadata(&thumbnail).await {
            Ok(_) => Some(thumbnail),
            Err(_) => None,
        };

        Ok(DerivationResult {
            artifact_path: request.target_path.clone(),
            thumbnail_path,
            title,
        })
    }
}

/// Companion thumbnail path for a cached video file
fn thumbnail_path_for(target: &Path) -> PathBuf {
    target.with_extension("jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_creates_its_own_source() {
        let backend = RemoteVideoFetcher::new();
        assert!(!backend.needs_raw_source());
        assert_eq!(backend.extension(), "mp4");
        assert_eq!(backend.content_type(), "video/mp4");
    }

    #[test]
    fn args_download_with_thumbnail_and_title() {
        let backend = RemoteVideoFetcher::new();
        let args = backend.ytdlp_args("dQw4w9WgXcQ", &PathBuf::from("/cache/video/dQw4w9WgXcQ.mp4"));

        assert!(args.contains(&OsString::from("--write-thumbnail")));
        assert!(args.contains(&OsString::from("--no-simulate")));
        assert!(args.contains(&OsString::from("after_move:title")));
        assert_eq!(
            args.last(),
            Some(&OsString::from(
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
            ))
        );
    }

    #[test]
    fn thumbnail_sits_next_to_the_video() {
        assert_eq!(
            thumbnail_path_for(&PathBuf::from("/cache/video/abc.mp4")),
            PathBuf::from("/cache/video/abc.jpg")
        );
    }
}
