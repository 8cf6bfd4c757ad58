//! CRUD operations for [`ThreadRecord`] rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ThreadRecord;

const THREAD_COLUMNS: &str = "id, name, phrase, secret, created_at";

impl Database {
    /// Insert a new thread.
    pub fn insert_thread(&self, thread: &ThreadRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO threads (id, name, phrase, secret, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                thread.id,
                thread.name,
                thread.phrase,
                hex::encode(thread.secret),
                thread.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a thread by its local name.
    pub fn get_thread_by_name(&self, name: &str) -> Result<Option<ThreadRecord>> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE name = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![name], row_to_thread)
            .optional()?)
    }

    /// Fetch a thread by id.
    pub fn get_thread(&self, id: &str) -> Result<ThreadRecord> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id], row_to_thread)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all threads, oldest first.
    pub fn list_threads(&self) -> Result<Vec<ThreadRecord>> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads ORDER BY created_at ASC, name ASC");
        let mut stmt = self.conn().prepare(&sql)?;

        let rows = stmt.query_map([], row_to_thread)?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    /// Delete a thread by name. Its updates go with it. Returns `true` if a
    /// row was deleted.
    pub fn delete_thread_by_name(&self, name: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM threads WHERE name = ?1", params![name])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRecord> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let phrase: String = row.get(2)?;
    let secret_hex: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let secret_vec = hex::decode(&secret_hex)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;
    let secret: [u8; 32] = secret_vec.try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            "thread secret must be 32 bytes".into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(ThreadRecord {
        id,
        name,
        phrase,
        secret,
        created_at,
    })
}
