use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lyceum_core::ids::{ContextId, PostId, ThreadId, UserId};
use lyceum_core::time::now_rfc3339;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostRow {
    pub id: PostId,
    pub thread_id: ThreadId,
    pub author_id: UserId,
    pub content: String,
    pub reply_to_post_id: Option<PostId>,
    pub created_at: String,
}

pub struct PostRepo {
    db: Database,
}

impl PostRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a post. One transaction covers the liveness checks, the
    /// insert, and the thread's `last_activity_at` bump:
    /// - the thread must still exist at insert time, so a post racing a
    ///   cascade delete fails NotFound instead of landing in a dead thread;
    /// - a reply target must exist and belong to the same thread;
    /// - the bump takes `MAX(last_activity_at, created_at)`, so the highest
    ///   timestamp among concurrent posts wins and the value never regresses.
    #[instrument(skip(self, content), fields(thread_id = %thread_id, author_id = %author_id))]
    pub fn create(
        &self,
        thread_id: &ThreadId,
        author_id: &UserId,
        content: &str,
        reply_to: Option<&PostId>,
    ) -> Result<PostRow, StoreError> {
        if content.trim().is_empty() {
            return Err(StoreError::Invalid("post content must not be empty".into()));
        }

        self.db.with_tx(|tx| {
            let thread_live: Option<String> = tx
                .query_row(
                    "SELECT id FROM threads WHERE id = ?1",
                    [thread_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if thread_live.is_none() {
                return Err(StoreError::NotFound(format!("thread {thread_id}")));
            }

            if let Some(reply_to) = reply_to {
                let parent_thread: Option<String> = tx
                    .query_row(
                        "SELECT thread_id FROM posts WHERE id = ?1",
                        [reply_to.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                match parent_thread {
                    None => {
                        return Err(StoreError::NotFound(format!("post {reply_to}")));
                    }
                    Some(t) if t != thread_id.as_str() => {
                        return Err(StoreError::Invalid(format!(
                            "reply target {reply_to} belongs to a different thread"
                        )));
                    }
                    Some(_) => {}
                }
            }

            let id = PostId::new();
            let now = now_rfc3339();

            tx.execute(
                "INSERT INTO posts (id, thread_id, author_id, content, reply_to_post_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    thread_id.as_str(),
                    author_id.as_str(),
                    content,
                    reply_to.map(|p| p.as_str()),
                    now,
                ],
            )?;

            tx.execute(
                "UPDATE threads SET last_activity_at = MAX(last_activity_at, ?1) WHERE id = ?2",
                rusqlite::params![now, thread_id.as_str()],
            )?;

            Ok(PostRow {
                id,
                thread_id: thread_id.clone(),
                author_id: author_id.clone(),
                content: content.to_string(),
                reply_to_post_id: reply_to.cloned(),
                created_at: now,
            })
        })
    }

    /// List a thread's posts in creation order (`created_at`, then `id`).
    /// Callers rebuild the reply forest by grouping on `reply_to_post_id`.
    #[instrument(skip(self), fields(thread_id = %thread_id))]
    pub fn list(&self, thread_id: &ThreadId) -> Result<Vec<PostRow>, StoreError> {
        self.db.with_conn(|conn| {
            let thread_live: Option<String> = conn
                .query_row(
                    "SELECT id FROM threads WHERE id = ?1",
                    [thread_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if thread_live.is_none() {
                return Err(StoreError::NotFound(format!("thread {thread_id}")));
            }

            let mut stmt = conn.prepare(
                "SELECT id, thread_id, author_id, content, reply_to_post_id, created_at
                 FROM posts WHERE thread_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([thread_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_post(row)?);
            }
            Ok(results)
        })
    }

    /// The definitional unread count for one (viewer, context) pair:
    /// posts in the context newer than `since`, excluding the viewer's own.
    /// `since = None` means the viewer has never marked the context seen.
    #[instrument(skip(self), fields(context_id = %context_id, viewer_id = %viewer_id))]
    pub fn count_unread(
        &self,
        context_id: &ContextId,
        viewer_id: &UserId,
        since: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = match since {
                Some(since) => conn.query_row(
                    "SELECT COUNT(*) FROM posts p
                     JOIN threads t ON p.thread_id = t.id
                     WHERE t.context_id = ?1 AND p.author_id <> ?2 AND p.created_at > ?3",
                    rusqlite::params![context_id.as_str(), viewer_id.as_str(), since],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM posts p
                     JOIN threads t ON p.thread_id = t.id
                     WHERE t.context_id = ?1 AND p.author_id <> ?2",
                    rusqlite::params![context_id.as_str(), viewer_id.as_str()],
                    |row| row.get(0),
                )?,
            };
            Ok(count)
        })
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> Result<PostRow, StoreError> {
    Ok(PostRow {
        id: PostId::from_raw(row_helpers::get::<String>(row, 0, "posts", "id")?),
        thread_id: ThreadId::from_raw(row_helpers::get::<String>(row, 1, "posts", "thread_id")?),
        author_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "posts", "author_id")?),
        content: row_helpers::get(row, 3, "posts", "content")?,
        reply_to_post_id: row_helpers::get_opt::<String>(row, 4, "posts", "reply_to_post_id")?
            .map(PostId::from_raw),
        created_at: row_helpers::get(row, 5, "posts", "created_at")?,
    })
}
