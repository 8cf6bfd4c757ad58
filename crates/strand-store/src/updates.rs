//! CRUD operations for [`UpdateRecord`] rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use strand_shared::PhotoMetadata;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::UpdateRecord;

const UPDATE_COLUMNS: &str =
    "content_id, prev_id, thread_id, metadata, caption, is_local, indexed_at";

impl Database {
    /// Insert an update unless its content id is already present.
    ///
    /// Check and insert are one statement, so two concurrent callers with
    /// the same id cannot both succeed. Returns `false` when the row
    /// already existed.
    pub fn insert_update(&self, update: &UpdateRecord) -> Result<bool> {
        let metadata = serde_json::to_string(&update.metadata)?;
        let affected = self.conn().execute(
            "INSERT INTO updates (content_id, prev_id, thread_id, metadata, caption, is_local, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(content_id) DO NOTHING",
            params![
                update.content_id,
                update.prev_id,
                update.thread_id,
                metadata,
                update.caption,
                update.is_local as i32,
                update.indexed_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn has_update(&self, content_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM updates WHERE content_id = ?1",
                params![content_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Fetch a single update by content id.
    pub fn get_update(&self, content_id: &str) -> Result<UpdateRecord> {
        let sql = format!("SELECT {UPDATE_COLUMNS} FROM updates WHERE content_id = ?1");
        self.conn()
            .query_row(&sql, params![content_id], row_to_update)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Most recent update of a thread, optionally restricted to ones
    /// authored on this node.
    pub fn latest_update(&self, thread_id: &str, local_only: bool) -> Result<Option<UpdateRecord>> {
        let sql = format!(
            "SELECT {UPDATE_COLUMNS}
             FROM updates
             WHERE thread_id = ?1 AND (?2 = 0 OR is_local = 1)
             ORDER BY seq DESC
             LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![thread_id, local_only as i32], row_to_update)
            .optional()?)
    }

    /// Content ids of a thread, newest first.
    ///
    /// With a non-empty `offset_id`, only updates indexed strictly before
    /// it are returned. An unknown `offset_id` yields an empty page.
    pub fn list_update_ids(&self, thread_id: &str, offset_id: &str, limit: usize) -> Result<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut ids = Vec::new();

        if offset_id.is_empty() {
            let mut stmt = self.conn().prepare(
                "SELECT content_id FROM updates
                 WHERE thread_id = ?1
                 ORDER BY seq DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![thread_id, limit], |row| row.get(0))?;
            for row in rows {
                ids.push(row?);
            }
        } else {
            let mut stmt = self.conn().prepare(
                "SELECT content_id FROM updates
                 WHERE thread_id = ?1
                   AND seq < (SELECT seq FROM updates WHERE content_id = ?2)
                 ORDER BY seq DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![thread_id, offset_id, limit], |row| row.get(0))?;
            for row in rows {
                ids.push(row?);
            }
        }
        Ok(ids)
    }

    pub fn count_updates(&self, thread_id: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM updates WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_update(row: &rusqlite::Row<'_>) -> rusqlite::Result<UpdateRecord> {
    let content_id: String = row.get(0)?;
    let prev_id: String = row.get(1)?;
    let thread_id: String = row.get(2)?;
    let metadata_json: String = row.get(3)?;
    let caption: Option<String> = row.get(4)?;
    let is_local: i32 = row.get(5)?;
    let indexed_str: String = row.get(6)?;

    let metadata: PhotoMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;

    let indexed_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&indexed_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(UpdateRecord {
        content_id,
        prev_id,
        thread_id,
        metadata,
        caption,
        is_local: is_local != 0,
        indexed_at,
    })
}
