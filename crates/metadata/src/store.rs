//! Metadata store trait and SQLite implementation.

use crate::error::MetadataResult;
use crate::models::{ChunkReceiptRow, UploadSessionRow};
use crate::repos::SessionRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: SessionRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under server concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        if let Some(secs) = query_timeout_secs {
            tracing::warn!(
                query_timeout_secs = secs,
                "SQLite query timeout is advisory only; long queries may exceed it"
            );
        }

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepo for SqliteStore {
    async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_sessions (
                session_id, file_name, mime_type, total_size, chunk_size,
                total_chunks, uploaded_chunks, uploaded_bytes, status, checksum,
                owner_id, chatroom_id, thread_id, storage_key, created_at,
                updated_at, completed_at, expires_at, error_detail
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.session_id)
        .bind(&session.file_name)
        .bind(&session.mime_type)
        .bind(session.total_size)
        .bind(session.chunk_size)
        .bind(session.total_chunks)
        .bind(session.uploaded_chunks)
        .bind(session.uploaded_bytes)
        .bind(&session.status)
        .bind(&session.checksum)
        .bind(&session.owner_id)
        .bind(&session.chatroom_id)
        .bind(&session.thread_id)
        .bind(&session.storage_key)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.completed_at)
        .bind(session.expires_at)
        .bind(&session.error_detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> MetadataResult<Option<UploadSessionRow>> {
        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn append_receipt(
        &self,
        receipt: &ChunkReceiptRow,
        expected_uploaded_chunks: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool> {
        // Counter advance and receipt insert commit together or not at all.
        // The uploaded_chunks guard rejects the write if a concurrent caller
        // advanced the session since this receipt was prepared.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
            SET uploaded_chunks = uploaded_chunks + 1,
                uploaded_bytes = uploaded_bytes + ?,
                status = 'in_progress',
                updated_at = ?
            WHERE session_id = ?
              AND uploaded_chunks = ?
              AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(receipt.size_bytes)
        .bind(updated_at)
        .bind(receipt.session_id)
        .bind(expected_uploaded_chunks)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Guard did not match; drop the transaction without committing.
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO chunk_receipts (
                session_id, chunk_index, size_bytes, checksum, object_key, received_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(receipt.session_id)
        .bind(receipt.chunk_index)
        .bind(receipt.size_bytes)
        .bind(&receipt.checksum)
        .bind(&receipt.object_key)
        .bind(receipt.received_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update_status_guarded(
        &self,
        session_id: Uuid,
        from: &[&str],
        to: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let placeholders: Vec<&str> = from.iter().map(|_| "?").collect();
        let query = format!(
            "UPDATE upload_sessions SET status = ?, updated_at = ? \
             WHERE session_id = ? AND status IN ({})",
            placeholders.join(", ")
        );

        let mut query_builder = sqlx::query(&query)
            .bind(to)
            .bind(updated_at)
            .bind(session_id);
        for status in from {
            query_builder = query_builder.bind(*status);
        }

        let result = query_builder.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_session(
        &self,
        session_id: Uuid,
        completed_at: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upload_sessions
            SET status = 'completed', completed_at = ?, updated_at = ?
            WHERE session_id = ? AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(completed_at)
        .bind(completed_at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_session(
        &self,
        session_id: Uuid,
        error_detail: &str,
        failed_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query(
            "UPDATE upload_sessions SET status = 'failed', error_detail = ?, updated_at = ? \
             WHERE session_id = ?",
        )
        .bind(error_detail)
        .bind(failed_at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_receipts(&self, session_id: Uuid) -> MetadataResult<Vec<ChunkReceiptRow>> {
        let rows = sqlx::query_as::<_, ChunkReceiptRow>(
            "SELECT * FROM chunk_receipts WHERE session_id = ? ORDER BY chunk_index",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_expired_sessions(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadSessionRow>> {
        let rows = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions \
             WHERE status IN ('pending', 'in_progress') AND expires_at < ? \
             ORDER BY expires_at LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_active_sessions(&self) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM upload_sessions WHERE status IN ('pending', 'in_progress')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn delete_session(&self, session_id: Uuid) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_receipts WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS upload_sessions (
    session_id      BLOB PRIMARY KEY,
    file_name       TEXT NOT NULL,
    mime_type       TEXT,
    total_size      INTEGER NOT NULL,
    chunk_size      INTEGER NOT NULL,
    total_chunks    INTEGER NOT NULL,
    uploaded_chunks INTEGER NOT NULL DEFAULT 0,
    uploaded_bytes  INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL,
    checksum        TEXT,
    owner_id        TEXT NOT NULL,
    chatroom_id     TEXT,
    thread_id       TEXT,
    storage_key     TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    completed_at    TEXT,
    expires_at      TEXT NOT NULL,
    error_detail    TEXT
);

CREATE INDEX IF NOT EXISTS idx_upload_sessions_status_expires
    ON upload_sessions(status, expires_at);

CREATE INDEX IF NOT EXISTS idx_upload_sessions_owner
    ON upload_sessions(owner_id);

CREATE TABLE IF NOT EXISTS chunk_receipts (
    session_id  BLOB NOT NULL REFERENCES upload_sessions(session_id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    size_bytes  INTEGER NOT NULL,
    checksum    TEXT NOT NULL,
    object_key  TEXT NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (session_id, chunk_index)
);
"#;
