// crates/db/src/queries/sessions.rs
// Session CRUD, cursor-paginated listing, and atomic session teardown.

use crate::cursor::{clamp_limit, page_from_rows, Cursor, Page};
use crate::queries::assets::{collect_part_assets, decrement_asset_refs};
use crate::queries::row_types::{SessionRow, SESSION_COLUMNS};
use crate::{Database, DbResult, StoreError};
use context_hub_types::{Asset, Session};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Optional restrictions for [`Database::list_sessions_with_cursor`].
#[derive(Debug, Clone, Default)]
pub struct SessionListFilter {
    /// Only sessions whose owner resolves to a user with this identifier.
    pub user_identifier: Option<String>,
    /// Only sessions whose `configs` document contains this map.
    pub configs: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The `sessions.user_id` FK only targets `users(id)`; the tenant boundary
/// lives here. Fails when the referenced user exists in a different project
/// (or not at all).
async fn verify_user_in_project(
    conn: &mut sqlx::PgConnection,
    project_id: Uuid,
    user_id: Uuid,
) -> DbResult<()> {
    let found: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 AND project_id = $2")
            .bind(user_id)
            .bind(project_id)
            .fetch_optional(&mut *conn)
            .await?;
    if found.is_none() {
        return Err(StoreError::invalid_argument(
            "user does not belong to the session's project",
        ));
    }
    Ok(())
}

impl Database {
    /// Insert a new session. A nil `id` gets a fresh one assigned.
    ///
    /// Timestamps are set server-side; the returned session carries them.
    pub async fn create_session(&self, session: &Session) -> DbResult<Session> {
        let id = if session.id.is_nil() {
            Uuid::new_v4()
        } else {
            session.id
        };

        let mut tx = self.pool().begin().await?;

        if let Some(user_id) = session.user_id {
            verify_user_in_project(&mut *tx, session.project_id, user_id).await?;
        }

        let row: SessionRow = sqlx::query_as(&format!(
            "INSERT INTO sessions (id, project_id, user_id, disable_task_tracking, configs)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .bind(session.project_id)
        .bind(session.user_id)
        .bind(session.disable_task_tracking)
        .bind(&session.configs)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_session())
    }

    /// Update a session's mutable fields. The project binding is part of the
    /// lookup: a session never moves between projects, and `created_at` is
    /// never touched.
    pub async fn update_session(&self, session: &Session) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;

        if let Some(user_id) = session.user_id {
            verify_user_in_project(&mut *tx, session.project_id, user_id).await?;
        }

        let result = sqlx::query(
            "UPDATE sessions
             SET user_id = $3, disable_task_tracking = $4, configs = $5, updated_at = now()
             WHERE id = $1 AND project_id = $2",
        )
        .bind(session.id)
        .bind(session.project_id)
        .bind(session.user_id)
        .bind(session.disable_task_tracking)
        .bind(&session.configs)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    /// Fetch a session by `(project, id)`.
    pub async fn get_session(&self, project_id: Uuid, session_id: Uuid) -> DbResult<Session> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 AND project_id = $2"
        ))
        .bind(session_id)
        .bind(project_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(SessionRow::into_session).ok_or(StoreError::NotFound)
    }

    /// Read just the task-tracking flag.
    pub async fn get_disable_task_tracking(&self, session_id: Uuid) -> DbResult<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT disable_task_tracking FROM sessions WHERE id = $1")
                .bind(session_id)
                .fetch_optional(self.pool())
                .await?;

        row.map(|(flag,)| flag).ok_or(StoreError::NotFound)
    }

    /// Cursor-paginated session listing for a project, strictly ordered by
    /// `(created_at, id)` in the requested direction.
    pub async fn list_sessions_with_cursor(
        &self,
        project_id: Uuid,
        filter: &SessionListFilter,
        cursor: Option<Cursor>,
        limit: i64,
        time_desc: bool,
    ) -> DbResult<Page<Session>> {
        let limit = clamp_limit(limit);
        let (cmp, dir) = if time_desc { ("<", "DESC") } else { (">", "ASC") };

        let mut sql = String::from(
            "SELECT s.id, s.project_id, s.user_id, s.disable_task_tracking, s.configs, \
             s.created_at, s.updated_at FROM sessions s",
        );
        if filter.user_identifier.is_some() {
            sql.push_str(" JOIN users u ON u.id = s.user_id");
        }
        sql.push_str(" WHERE s.project_id = $1");

        let mut next_param = 2;
        if cursor.is_some() {
            // Keyset filter, tie-broken on id
            sql.push_str(&format!(
                " AND (s.created_at {cmp} ${p} OR (s.created_at = ${p} AND s.id {cmp} ${q}))",
                p = next_param,
                q = next_param + 1,
            ));
            next_param += 2;
        }
        if filter.configs.is_some() {
            sql.push_str(&format!(" AND s.configs @> ${next_param}"));
            next_param += 1;
        }
        if filter.user_identifier.is_some() {
            sql.push_str(&format!(" AND u.identifier = ${next_param}"));
            next_param += 1;
        }
        sql.push_str(&format!(
            " ORDER BY s.created_at {dir}, s.id {dir} LIMIT ${next_param}"
        ));

        let mut query = sqlx::query_as::<_, SessionRow>(&sql).bind(project_id);
        if let Some(cursor) = cursor {
            query = query.bind(cursor.created_at).bind(cursor.id);
        }
        if let Some(configs) = &filter.configs {
            query = query.bind(serde_json::Value::Object(configs.clone()));
        }
        if let Some(identifier) = &filter.user_identifier {
            query = query.bind(identifier);
        }
        query = query.bind(limit + 1);

        let rows = query.fetch_all(self.pool()).await?;
        let sessions: Vec<Session> = rows.into_iter().map(SessionRow::into_session).collect();

        Ok(page_from_rows(sessions, limit as usize, |s| {
            Cursor::new(s.created_at, s.id)
        }))
    }

    /// Remove a session and everything it owns.
    ///
    /// The session row, its messages, and its tasks go in one transaction
    /// (schema cascades). Reference counts for every asset the session
    /// carried are decremented after commit on a separate connection: a
    /// crash between commit and decrement leaks counts (over-approximation a
    /// sweeper reclaims), never under-counts.
    pub async fn delete_session(
        &self,
        project_id: Uuid,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }

        let mut tx = self.pool().begin().await?;

        let found: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM sessions WHERE id = $1 AND project_id = $2 FOR UPDATE")
                .bind(session_id)
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Err(StoreError::NotFound);
        }

        // Snapshot the envelopes inside the transaction, then resolve nested
        // part assets from the blob store. A failed blob read skips only that
        // message's nested assets (best-effort decrement); the envelope edge
        // itself is still counted.
        let envelopes: Vec<(Uuid, serde_json::Value)> =
            sqlx::query_as("SELECT id, parts_asset_meta FROM messages WHERE session_id = $1")
                .bind(session_id)
                .fetch_all(&mut *tx)
                .await?;

        let mut assets = Vec::new();
        for (message_id, value) in &envelopes {
            let envelope: Asset = serde_json::from_value(value.clone())?;
            if !envelope.is_empty() {
                assets.push(envelope.clone());
            }
            if envelope.s3_key.is_empty() {
                continue;
            }
            match self.blobs().get(&envelope.bucket, &envelope.s3_key).await {
                Ok(bytes) => match collect_part_assets(&bytes) {
                    Ok(nested) => assets.extend(nested),
                    Err(err) => {
                        warn!(session = %session_id, message = %message_id,
                              "skipping malformed parts blob during delete: {err}");
                    }
                },
                Err(err) => {
                    warn!(session = %session_id, message = %message_id,
                          "skipping unreadable parts blob during delete: {err}");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }

        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        // Post-commit: the caller has observed session removal; a failing
        // decrement is compensation work for the sweeper, not a delete error.
        if !assets.is_empty() {
            let result = async {
                let mut conn = self.pool().acquire().await?;
                decrement_asset_refs(&mut conn, project_id, &assets).await
            }
            .await;
            if let Err(err) = result {
                warn!(session = %session_id,
                      "asset decrement after session delete failed: {err}");
            }
        }

        Ok(())
    }
}
