use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lyceum_core::ids::{ContextId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadMarkerRow {
    pub viewer_id: UserId,
    pub context_id: ContextId,
    pub last_seen_at: String,
}

pub struct ReadMarkerRepo {
    db: Database,
}

impl ReadMarkerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert the viewer's marker for a context to `MAX(existing, at)`.
    /// The marker never moves backward, so out-of-order or repeated calls
    /// with a stale timestamp are harmless no-ops.
    #[instrument(skip(self), fields(viewer_id = %viewer_id, context_id = %context_id))]
    pub fn mark_seen(
        &self,
        viewer_id: &UserId,
        context_id: &ContextId,
        at: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO read_markers (viewer_id, context_id, last_seen_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(viewer_id, context_id)
                 DO UPDATE SET last_seen_at = MAX(last_seen_at, excluded.last_seen_at)",
                rusqlite::params![viewer_id.as_str(), context_id.as_str(), at],
            )?;
            Ok(())
        })
    }

    /// The viewer's marker for a context; None if they have never viewed it.
    #[instrument(skip(self), fields(viewer_id = %viewer_id, context_id = %context_id))]
    pub fn get(
        &self,
        viewer_id: &UserId,
        context_id: &ContextId,
    ) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            let marker = conn
                .query_row(
                    "SELECT last_seen_at FROM read_markers
                     WHERE viewer_id = ?1 AND context_id = ?2",
                    rusqlite::params![viewer_id.as_str(), context_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(marker)
        })
    }

    /// All of a viewer's markers.
    #[instrument(skip(self), fields(viewer_id = %viewer_id))]
    pub fn list_for_viewer(&self, viewer_id: &UserId) -> Result<Vec<ReadMarkerRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT viewer_id, context_id, last_seen_at FROM read_markers
                 WHERE viewer_id = ?1 ORDER BY context_id ASC",
            )?;
            let mut rows = stmt.query([viewer_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(ReadMarkerRow {
                    viewer_id: UserId::from_raw(row_helpers::get::<String>(
                        row, 0, "read_markers", "viewer_id",
                    )?),
                    context_id: ContextId::from_raw(row_helpers::get::<String>(
                        row, 1, "read_markers", "context_id",
                    )?),
                    last_seen_at: row_helpers::get(row, 2, "read_markers", "last_seen_at")?,
                });
            }
            Ok(results)
        })
    }
}
