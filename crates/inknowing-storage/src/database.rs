// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use inknowing_core::InknowingError;
use tokio_rusqlite::Connection;
use tracing::info;

use crate::migrations;

/// Convert a tokio-rusqlite error into `InknowingError::Storage`.
pub fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> InknowingError
where
    E: std::error::Error + Send + Sync + 'static,
{
    InknowingError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the runtime's SQLite database.
///
/// Cheap to clone; all clones share the single background write thread.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// all pending migrations.
    pub async fn open(path: &str) -> Result<Self, InknowingError> {
        Self::open_with_options(path, true).await
    }

    /// Open with explicit WAL control.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, InknowingError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InknowingError::Storage {
                    source: Box::new(e),
                })?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| InknowingError::Storage {
                source: Box::new(e),
            })?;

        Self::setup(conn, wal_mode, path).await
    }

    /// Open an in-memory database with migrations applied (tests).
    pub async fn open_in_memory() -> Result<Self, InknowingError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| InknowingError::Storage {
                source: Box::new(e),
            })?;
        Self::setup(conn, false, ":memory:").await
    }

    async fn setup(conn: Connection, wal_mode: bool, path: &str) -> Result<Self, InknowingError> {
        conn.call(move |conn| {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)?;

        conn.call(migrations::run_migrations)
            .await
            .map_err(map_tr_err::<refinery::Error>)?;

        info!(path, wal_mode, "database opened");

        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, flushing pending writes.
    pub async fn close(self) -> Result<(), InknowingError> {
        self.conn.close().await.map_err(|e| InknowingError::Storage {
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runtime.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, rusqlite::Error>(names)
            })
            .await
            .unwrap();

        for expected in [
            "sessions",
            "messages",
            "message_references",
            "session_summaries",
            "quota_records",
            "cost_ledger",
            "dead_letters",
            "books",
            "characters",
            "book_chunks",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_is_idempotent_across_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runtime.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
        // Re-opening must not re-apply migrations.
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }
}
