use serde::{Deserialize, Serialize};
use tracing::instrument;

use lyceum_core::ids::{ContextId, ThreadId, UserId};
use lyceum_core::time::now_rfc3339;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadRow {
    pub id: ThreadId,
    pub context_id: ContextId,
    pub title: String,
    pub created_by: UserId,
    pub created_at: String,
    pub last_activity_at: String,
}

pub struct ThreadRepo {
    db: Database,
}

impl ThreadRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new thread. `last_activity_at` starts equal to `created_at`
    /// and only ever moves forward as posts arrive.
    #[instrument(skip(self), fields(context_id = %context_id, created_by = %created_by))]
    pub fn create(
        &self,
        context_id: &ContextId,
        title: &str,
        created_by: &UserId,
    ) -> Result<ThreadRow, StoreError> {
        if title.trim().is_empty() {
            return Err(StoreError::Invalid("thread title must not be empty".into()));
        }

        let id = ThreadId::new();
        let now = now_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO threads (id, context_id, title, created_by, created_at, last_activity_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    context_id.as_str(),
                    title,
                    created_by.as_str(),
                    now,
                    now,
                ],
            )?;

            Ok(ThreadRow {
                id,
                context_id: context_id.clone(),
                title: title.to_string(),
                created_by: created_by.clone(),
                created_at: now.clone(),
                last_activity_at: now,
            })
        })
    }

    /// Get a thread by ID.
    #[instrument(skip(self), fields(thread_id = %id))]
    pub fn get(&self, id: &ThreadId) -> Result<ThreadRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, context_id, title, created_by, created_at, last_activity_at
                 FROM threads WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_thread(row),
                None => Err(StoreError::NotFound(format!("thread {id}"))),
            }
        })
    }

    /// List threads in a context, most recently active first. Ties are
    /// broken by created_at then id (both descending), so the order is
    /// deterministic and restartable across queries.
    #[instrument(skip(self), fields(context_id = %context_id))]
    pub fn list(
        &self,
        context_id: &ContextId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, context_id, title, created_by, created_at, last_activity_at
                 FROM threads WHERE context_id = ?1
                 ORDER BY last_activity_at DESC, created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let mut rows = stmt.query(rusqlite::params![context_id.as_str(), limit, offset])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_thread(row)?);
            }
            Ok(results)
        })
    }

    /// Delete a thread and every post in it as a single transaction.
    /// No post survives its thread, and no partial state is observable:
    /// either all rows are gone or none are. Returns the number of posts
    /// removed; NotFound if the thread does not exist (a repeat delete
    /// after success fails the same way).
    #[instrument(skip(self), fields(thread_id = %id))]
    pub fn delete_cascade(&self, id: &ThreadId) -> Result<u64, StoreError> {
        self.db.with_tx(|tx| {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM threads WHERE id = ?1)",
                [id.as_str()],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::NotFound(format!("thread {id}")));
            }

            let posts_removed =
                tx.execute("DELETE FROM posts WHERE thread_id = ?1", [id.as_str()])?;
            tx.execute("DELETE FROM threads WHERE id = ?1", [id.as_str()])?;

            Ok(posts_removed as u64)
        })
    }
}

fn row_to_thread(row: &rusqlite::Row<'_>) -> Result<ThreadRow, StoreError> {
    Ok(ThreadRow {
        id: ThreadId::from_raw(row_helpers::get::<String>(row, 0, "threads", "id")?),
        context_id: ContextId::from_raw(row_helpers::get::<String>(row, 1, "threads", "context_id")?),
        title: row_helpers::get(row, 2, "threads", "title")?,
        created_by: UserId::from_raw(row_helpers::get::<String>(row, 3, "threads", "created_by")?),
        created_at: row_helpers::get(row, 4, "threads", "created_at")?,
        last_activity_at: row_helpers::get(row, 5, "threads", "last_activity_at")?,
    })
}
