// crates/db/src/queries/tasks.rs
// Per-session task list maintenance.

use crate::queries::row_types::{TaskRow, TASK_COLUMNS};
use crate::{Database, DbResult, StoreError};
use context_hub_types::SessionTask;
use sqlx::QueryBuilder;
use uuid::Uuid;

impl Database {
    /// A session's tasks, ordered by `task_order`.
    pub async fn list_tasks(&self, session_id: Uuid) -> DbResult<Vec<SessionTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM session_tasks WHERE session_id = $1
             ORDER BY task_order ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    /// Fetch one task, verifying it belongs to the session.
    pub async fn get_task(&self, session_id: Uuid, task_id: Uuid) -> DbResult<SessionTask> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM session_tasks WHERE id = $1 AND session_id = $2"
        ))
        .bind(task_id)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(TaskRow::into_task).ok_or(StoreError::NotFound)
    }

    /// Atomically replace a session's task list.
    ///
    /// Existing tasks are removed and the given list inserted in one
    /// transaction; messages pointing at removed tasks fall back to NULL via
    /// the schema. Task IDs are caller-allocated (nil gets a fresh one).
    pub async fn replace_tasks(
        &self,
        project_id: Uuid,
        session_id: Uuid,
        tasks: &[SessionTask],
    ) -> DbResult<Vec<Uuid>> {
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

        sqlx::query("DELETE FROM session_tasks WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        let ids: Vec<Uuid> = tasks
            .iter()
            .map(|t| if t.id.is_nil() { Uuid::new_v4() } else { t.id })
            .collect();

        if !tasks.is_empty() {
            let mut qb = QueryBuilder::new(
                "INSERT INTO session_tasks (id, project_id, session_id, task_order, data, status, is_planning) ",
            );
            qb.push_values(tasks.iter().zip(&ids), |mut b, (task, id)| {
                b.push_bind(*id)
                    .push_bind(project_id)
                    .push_bind(session_id)
                    .push_bind(task.task_order)
                    .push_bind(&task.data)
                    .push_bind(&task.status)
                    .push_bind(task.is_planning);
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(ids)
    }
}
