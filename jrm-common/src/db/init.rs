//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date.
//! All `create_*_table` statements are idempotent and safe to re-run.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while a derivation writes its record
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
///
/// Exposed separately from [`init_database`] so tests can apply the schema
/// to an in-memory pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_media_artifacts_table(pool).await?;
    Ok(())
}

/// Settings table: global key-value store
async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Media artifacts table: one row per cacheable resource
///
/// `raw_path` is written by the library-scan ingester (or left NULL for
/// remotely-sourced video); `derived_path`, `content_type`,
/// `thumbnail_path`, and `title` are written by the media cache after a
/// successful derivation.
async fn create_media_artifacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_artifacts (
            kind TEXT NOT NULL,
            key TEXT NOT NULL,
            raw_path TEXT,
            derived_path TEXT,
            content_type TEXT,
            thumbnail_path TEXT,
            title TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (kind, key)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
