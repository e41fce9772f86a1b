//! Artifact metadata persistence
//!
//! Maps `media_artifacts` rows to [`ArtifactRecord`] and upserts the
//! derived-artifact fields. The raw-source column is owned by the
//! library-scan ingester; the upsert never touches it.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::PathBuf;

use crate::cache::{ArtifactRecord, ArtifactStore, DerivedArtifact, ResourceKind};

/// Sqlite-backed artifact metadata store
pub struct SqliteArtifactStore {
    pool: SqlitePool,
}

impl SqliteArtifactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn record(
        &self,
        kind: ResourceKind,
        key: &str,
    ) -> jrm_common::Result<Option<ArtifactRecord>> {
        let row = sqlx::query_as::<
            _,
            (
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
            ),
        >(
            r#"
            SELECT raw_path, derived_path, content_type, thumbnail_path, title
            FROM media_artifacts
            WHERE kind = ? AND key = ?
            "#,
        )
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(raw, derived, content_type, thumbnail, title)| ArtifactRecord {
            raw_path: raw.map(PathBuf::from),
            derived_path: derived.map(PathBuf::from),
            content_type,
            thumbnail_path: thumbnail.map(PathBuf::from),
            title,
        }))
    }

    async fn set_derived(
        &self,
        kind: ResourceKind,
        key: &str,
        artifact: &DerivedArtifact,
    ) -> jrm_common::Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        // Creates the record for remotely-fetched resources; existing rows
        // keep their raw_path untouched.
        sqlx::query(
            r#"
            INSERT INTO media_artifacts
                (kind, key, derived_path, content_type, thumbnail_path, title, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, key) DO UPDATE SET
                derived_path = excluded.derived_path,
                content_type = excluded.content_type,
                thumbnail_path = excluded.thumbnail_path,
                title = COALESCE(excluded.title, media_artifacts.title),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(key)
        .bind(artifact.derived_path.display().to_string())
        .bind(&artifact.content_type)
        .bind(
            artifact
                .thumbnail_path
                .as_ref()
                .map(|p| p.display().to_string()),
        )
        .bind(&artifact.title)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
