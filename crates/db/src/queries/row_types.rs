// crates/db/src/queries/row_types.rs
// Internal row types mapping PostgreSQL rows onto the shared entity structs.

use chrono::{DateTime, Utc};
use context_hub_types::{Asset, Message, ProcessStatus, Session, SessionTask, User};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

fn decode_err(column: &str, err: serde_json::Error) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    }
}

#[derive(Debug)]
pub(crate) struct SessionRow {
    id: Uuid,
    project_id: Uuid,
    user_id: Option<Uuid>,
    disable_task_tracking: bool,
    configs: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for SessionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            user_id: row.try_get("user_id")?,
            disable_task_tracking: row.try_get("disable_task_tracking")?,
            configs: row.try_get("configs")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl SessionRow {
    pub(crate) fn into_session(self) -> Session {
        Session {
            id: self.id,
            project_id: self.project_id,
            user_id: self.user_id,
            disable_task_tracking: self.disable_task_tracking,
            configs: self.configs,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    role: String,
    parent_id: Option<Uuid>,
    parts_asset_meta: Asset,
    meta: serde_json::Value,
    status: String,
    task_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for MessageRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let parts_meta: serde_json::Value = row.try_get("parts_asset_meta")?;
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            role: row.try_get("role")?,
            parent_id: row.try_get("parent_id")?,
            parts_asset_meta: serde_json::from_value(parts_meta)
                .map_err(|e| decode_err("parts_asset_meta", e))?,
            meta: row.try_get("meta")?,
            status: row.try_get("session_task_process_status")?,
            task_id: row.try_get("task_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl MessageRow {
    pub(crate) fn into_message(self) -> Message {
        Message {
            id: self.id,
            session_id: self.session_id,
            role: self.role,
            parent_id: self.parent_id,
            parts_asset_meta: self.parts_asset_meta,
            meta: self.meta,
            session_task_process_status: ProcessStatus::from_db_str(&self.status),
            task_id: self.task_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TaskRow {
    id: Uuid,
    project_id: Uuid,
    session_id: Uuid,
    task_order: i32,
    data: serde_json::Value,
    status: String,
    is_planning: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for TaskRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            session_id: row.try_get("session_id")?,
            task_order: row.try_get("task_order")?,
            data: row.try_get("data")?,
            status: row.try_get("status")?,
            is_planning: row.try_get("is_planning")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TaskRow {
    pub(crate) fn into_task(self) -> SessionTask {
        SessionTask {
            id: self.id,
            project_id: self.project_id,
            session_id: self.session_id,
            task_order: self.task_order,
            data: self.data,
            status: self.status,
            is_planning: self.is_planning,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug)]
pub(crate) struct UserRow {
    id: Uuid,
    project_id: Uuid,
    identifier: String,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            identifier: row.try_get("identifier")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            project_id: self.project_id,
            identifier: self.identifier,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AssetRefRow {
    bucket: String,
    s3_key: String,
    etag: String,
    sha256: String,
    mime: String,
    size_bytes: i64,
    pub(crate) ref_count: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for AssetRefRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            bucket: row.try_get("bucket")?,
            s3_key: row.try_get("s3_key")?,
            etag: row.try_get("etag")?,
            sha256: row.try_get("sha256")?,
            mime: row.try_get("mime")?,
            size_bytes: row.try_get("size_bytes")?,
            ref_count: row.try_get("ref_count")?,
        })
    }
}

impl AssetRefRow {
    pub(crate) fn into_asset(self) -> Asset {
        Asset {
            bucket: self.bucket,
            s3_key: self.s3_key,
            etag: self.etag,
            sha256: self.sha256,
            mime: self.mime,
            size_bytes: self.size_bytes,
        }
    }
}

/// SELECT column list shared by every message query.
pub(crate) const MESSAGE_COLUMNS: &str = "id, session_id, role, parent_id, parts_asset_meta, \
     meta, session_task_process_status, task_id, created_at";

/// SELECT column list shared by every session query.
pub(crate) const SESSION_COLUMNS: &str =
    "id, project_id, user_id, disable_task_tracking, configs, created_at, updated_at";

/// SELECT column list shared by every task query.
pub(crate) const TASK_COLUMNS: &str =
    "id, project_id, session_id, task_order, data, status, is_planning, created_at, updated_at";
