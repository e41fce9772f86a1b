//! jrm-md specific configuration

use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

/// Media Delivery configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub root_folder: PathBuf,
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub bind_addr: String,
}

impl Config {
    pub fn from_root(root_folder: &Path, port: u16) -> Self {
        Self {
            root_folder: root_folder.to_path_buf(),
            db_path: jrm_common::config::database_path(root_folder),
            cache_dir: jrm_common::config::cache_dir(root_folder),
            bind_addr: format!("0.0.0.0:{}", port),
        }
    }
}

/// Transcode tunables, read from the settings table at startup
///
/// Missing settings are written back with their defaults so operators can
/// discover and edit them in the database.
#[derive(Debug, Clone, Copy)]
pub struct TranscodeSettings {
    pub audio_bitrate_kbps: u32,
    pub cover_max_width: u32,
    pub cover_quality: u32,
}

impl TranscodeSettings {
    pub async fn load(db: &SqlitePool) -> jrm_common::Result<Self> {
        Ok(Self {
            audio_bitrate_kbps: jrm_common::db::settings::get_audio_bitrate_kbps(db).await?,
            cover_max_width: jrm_common::db::settings::get_cover_max_width(db).await?,
            cover_quality: jrm_common::db::settings::get_cover_quality(db).await?,
        })
    }
}
