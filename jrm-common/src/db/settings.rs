//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are global/system-wide (not user-specific).

use crate::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Get audio transcode bitrate in kbit/s
pub async fn get_audio_bitrate_kbps(db: &Pool<Sqlite>) -> Result<u32> {
    match get_setting::<u32>(db, "audio_bitrate_kbps").await? {
        Some(bitrate) => Ok(bitrate.clamp(32, 512)),
        None => {
            // Default bitrate is 128 kbit/s
            set_setting(db, "audio_bitrate_kbps", 128u32).await?;
            Ok(128)
        }
    }
}

/// Get maximum width for compressed cover images
pub async fn get_cover_max_width(db: &Pool<Sqlite>) -> Result<u32> {
    match get_setting::<u32>(db, "cover_max_width").await? {
        Some(width) => Ok(width.clamp(64, 4096)),
        None => {
            // Default maximum width is 512 pixels
            set_setting(db, "cover_max_width", 512u32).await?;
            Ok(512)
        }
    }
}

/// Get quality setting for compressed cover images (0-100)
pub async fn get_cover_quality(db: &Pool<Sqlite>) -> Result<u32> {
    match get_setting::<u32>(db, "cover_quality").await? {
        Some(quality) => Ok(quality.clamp(1, 100)),
        None => {
            // Default quality is 80
            set_setting(db, "cover_quality", 80u32).await?;
            Ok(80)
        }
    }
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
