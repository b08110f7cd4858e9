// crates/db/src/queries/messages.rs
// Message CRUD and cursor-paginated reads.

use crate::cursor::{clamp_limit, page_from_rows, Cursor, Page};
use crate::queries::assets::increment_asset_refs;
use crate::queries::row_types::{MessageRow, MESSAGE_COLUMNS};
use crate::{Database, DbResult, StoreError};
use context_hub_types::{Asset, Message};
use uuid::Uuid;

impl Database {
    /// Insert a message and register the assets it carries.
    ///
    /// The message is appended to the session's newest chain: `parent_id` is
    /// assigned to the latest message by `(created_at, id)`, whatever the
    /// caller set. Reference counts for the parts envelope and for
    /// `part_assets` (the nested assets the caller uploaded into the parts
    /// blob) are incremented in the same transaction.
    pub async fn create_message_with_assets(
        &self,
        message: &Message,
        part_assets: &[Asset],
    ) -> DbResult<Message> {
        let id = if message.id.is_nil() {
            Uuid::new_v4()
        } else {
            message.id
        };

        let mut tx = self.pool().begin().await?;

        // The session row lock linearizes concurrent appends, so two writers
        // cannot pick the same parent.
        let session: Option<(Uuid,)> =
            sqlx::query_as("SELECT project_id FROM sessions WHERE id = $1 FOR UPDATE")
                .bind(message.session_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((project_id,)) = session else {
            return Err(StoreError::NotFound);
        };

        let parent: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM messages WHERE session_id = $1
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(message.session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row: MessageRow = sqlx::query_as(&format!(
            "INSERT INTO messages (id, session_id, role, parent_id, parts_asset_meta, meta,
                                   session_task_process_status, task_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id)
        .bind(message.session_id)
        .bind(&message.role)
        .bind(parent.map(|(id,)| id))
        .bind(serde_json::to_value(&message.parts_asset_meta)?)
        .bind(&message.meta)
        .bind(message.session_task_process_status.as_db_str())
        .bind(message.task_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut assets: Vec<Asset> = Vec::with_capacity(part_assets.len() + 1);
        if !message.parts_asset_meta.is_empty() {
            assets.push(message.parts_asset_meta.clone());
        }
        assets.extend(part_assets.iter().filter(|a| !a.is_empty()).cloned());
        increment_asset_refs(&mut *tx, project_id, &assets).await?;

        tx.commit().await?;
        Ok(row.into_message())
    }

    /// Cursor-paginated message listing for a session.
    pub async fn list_messages_with_cursor(
        &self,
        session_id: Uuid,
        cursor: Option<Cursor>,
        limit: i64,
        time_desc: bool,
    ) -> DbResult<Page<Message>> {
        let limit = clamp_limit(limit);
        let (cmp, dir) = if time_desc { ("<", "DESC") } else { (">", "ASC") };

        let mut sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = $1");
        if cursor.is_some() {
            sql.push_str(&format!(
                " AND (created_at {cmp} $2 OR (created_at = $2 AND id {cmp} $3))"
            ));
        }
        let limit_param = if cursor.is_some() { 4 } else { 2 };
        sql.push_str(&format!(
            " ORDER BY created_at {dir}, id {dir} LIMIT ${limit_param}"
        ));

        let mut query = sqlx::query_as::<_, MessageRow>(&sql).bind(session_id);
        if let Some(cursor) = cursor {
            query = query.bind(cursor.created_at).bind(cursor.id);
        }
        query = query.bind(limit + 1);

        let rows = query.fetch_all(self.pool()).await?;
        let messages: Vec<Message> = rows.into_iter().map(MessageRow::into_message).collect();

        Ok(page_from_rows(messages, limit as usize, |m| {
            Cursor::new(m.created_at, m.id)
        }))
    }

    /// All messages of a session in ascending `(created_at, id)` order.
    pub async fn list_all_messages(&self, session_id: Uuid) -> DbResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = $1
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    /// Fetch one message, verifying it belongs to the session.
    pub async fn get_message(&self, session_id: Uuid, message_id: Uuid) -> DbResult<Message> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND session_id = $2"
        ))
        .bind(message_id)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(MessageRow::into_message).ok_or(StoreError::NotFound)
    }

    /// Replace a message's `meta` document.
    pub async fn update_message_meta(
        &self,
        message_id: Uuid,
        meta: &serde_json::Value,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE messages SET meta = $2 WHERE id = $1")
            .bind(message_id)
            .bind(meta)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Count a session's messages (the fork gate's probe).
    pub async fn count_messages(&self, session_id: Uuid) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }
}
