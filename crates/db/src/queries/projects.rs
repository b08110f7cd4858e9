// crates/db/src/queries/projects.rs
// Tenancy glue: projects and users.

use crate::queries::row_types::UserRow;
use crate::{Database, DbResult, StoreError};
use context_hub_types::{Project, User};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

impl Database {
    /// Create a project (the tenant boundary).
    pub async fn create_project(&self, name: &str) -> DbResult<Project> {
        let row: (Uuid, String, chrono::DateTime<chrono::Utc>) = sqlx::query_as(
            "INSERT INTO projects (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(self.pool())
        .await?;

        Ok(Project {
            id: row.0,
            name: row.1,
            created_at: row.2,
        })
    }

    /// Resolve `(project, identifier)` to a user, creating it on first use.
    pub async fn get_or_create_user(&self, project_id: Uuid, identifier: &str) -> DbResult<User> {
        if identifier.is_empty() {
            return Err(StoreError::invalid_argument("user identifier must not be empty"));
        }

        // The no-op update makes RETURNING yield the row on conflict too.
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (id, project_id, identifier) VALUES ($1, $2, $3)
             ON CONFLICT (project_id, identifier)
             DO UPDATE SET identifier = EXCLUDED.identifier
             RETURNING id, project_id, identifier, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(identifier)
        .fetch_one(self.pool())
        .await?;

        Ok(row.into_user())
    }

    /// Delete a user and every session they own.
    ///
    /// Sessions go through [`Database::delete_session`] one by one so each
    /// gets its asset decrements; the bare schema cascade would drop the
    /// rows without touching reference counts.
    pub async fn delete_user(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        let sessions: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM sessions WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        for (session_id,) in &sessions {
            match self.delete_session(project_id, *session_id, cancel).await {
                Ok(()) => {}
                // A concurrent delete got there first; keep going.
                Err(StoreError::NotFound) => {}
                Err(err) => return Err(err),
            }
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND project_id = $2")
            .bind(user_id)
            .bind(project_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        info!(user = %user_id, sessions = sessions.len(), "user deleted");
        Ok(())
    }
}
