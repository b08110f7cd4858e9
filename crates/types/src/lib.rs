// crates/types/src/lib.rs
//! Shared entity types for the context-hub session store.
//!
//! Pure data: serde-friendly structs mirroring the repository schema, plus
//! the small result types the capability surface returns. No I/O here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant boundary. Owns sessions, users, and assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// An end user within a project, identified by `(project_id, identifier)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub project_id: Uuid,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

/// Top-level container for a forest of messages and an ordered task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub disable_task_tracking: bool,
    pub configs: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Processing state of a message as seen by the task observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl ProcessStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::Running => "running",
            ProcessStatus::Success => "success",
            ProcessStatus::Failed => "failed",
        }
    }

    /// Unknown strings fold to `Pending` rather than erroring; the column
    /// carries a CHECK constraint so this only fires on schema drift.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "running" => ProcessStatus::Running,
            "success" => ProcessStatus::Success,
            "failed" => ProcessStatus::Failed,
            _ => ProcessStatus::Pending,
        }
    }
}

/// Content-addressed blob descriptor. `sha256` is the identity within a
/// project; an empty `sha256` means "no asset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub s3_key: String,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub size_bytes: i64,
}

impl Asset {
    pub fn is_empty(&self) -> bool {
        self.sha256.is_empty()
    }
}

/// One element of a message's parts envelope. Parts may themselves carry an
/// asset (images, files) alongside or instead of inline text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(rename = "type", default)]
    pub part_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<Asset>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// A queued tool call awaiting its response, stored under the reserved
/// `call_info` key of a message's `meta` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
}

/// A message within a session. Messages form a forest via `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Envelope descriptor pointing at the object-store key holding the
    /// JSON-encoded `Vec<Part>` for this message.
    pub parts_asset_meta: Asset,
    pub meta: serde_json::Value,
    pub session_task_process_status: ProcessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A tracked task within `(project, session)`, ordered by `task_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub session_id: Uuid,
    pub task_order: i32,
    pub data: serde_json::Value,
    pub status: String,
    pub is_planning: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a session fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkResult {
    pub old_session_id: Uuid,
    pub new_session_id: Uuid,
    pub message_count: usize,
    pub task_count: usize,
}

/// Per-session message-processing aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservingStatus {
    /// Messages with status `success`.
    pub observed: i64,
    /// Messages with status `running`.
    pub in_process: i64,
    /// Messages with status `pending`.
    pub pending: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_status_db_round_trip() {
        for status in [
            ProcessStatus::Pending,
            ProcessStatus::Running,
            ProcessStatus::Success,
            ProcessStatus::Failed,
        ] {
            assert_eq!(ProcessStatus::from_db_str(status.as_db_str()), status);
        }
        // Schema drift folds to pending
        assert_eq!(ProcessStatus::from_db_str("weird"), ProcessStatus::Pending);
    }

    #[test]
    fn asset_empty_means_no_sha() {
        assert!(Asset::default().is_empty());
        let asset = Asset {
            sha256: "abc".into(),
            ..Default::default()
        };
        assert!(!asset.is_empty());
    }

    #[test]
    fn part_deserializes_with_nested_asset() {
        let raw = r#"{
            "type": "image",
            "asset": {"bucket": "ctx", "s3_key": "blobs/a", "sha256": "deadbeef", "mime": "image/png", "size_bytes": 12}
        }"#;
        let part: Part = serde_json::from_str(raw).unwrap();
        assert_eq!(part.part_type, "image");
        let asset = part.asset.unwrap();
        assert_eq!(asset.sha256, "deadbeef");
        assert_eq!(asset.size_bytes, 12);
    }

    #[test]
    fn part_tolerates_minimal_shape() {
        let part: Part = serde_json::from_str(r#"{"type":"text","text":"hi"}"#).unwrap();
        assert_eq!(part.text.as_deref(), Some("hi"));
        assert!(part.asset.is_none());
    }
}
