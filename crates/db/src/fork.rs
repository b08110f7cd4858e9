// crates/db/src/fork.rs
// Atomic deep-copy of a session: its message forest, task list, and every
// referenced asset.
//
// Fork runs in two phases so the slow object-store work happens outside the
// transaction. Phase A snapshots the source, pre-allocates the old→new ID
// map, and performs the server-side parts copies; Phase B re-locks the
// source, re-verifies the size gate, and inserts everything atomically. A
// Phase A abort can leave new-keyed objects behind; those carry no database
// references and the sweeper reclaims them.

use crate::queries::assets::{collect_part_assets, increment_asset_refs};
use crate::queries::row_types::{TaskRow, TASK_COLUMNS};
use crate::{
    Database, DbResult, StoreError, MAX_FORK_ASSETS, MAX_FORK_MESSAGES, MESSAGE_BATCH_SIZE,
};
use context_hub_blobstore::parts_key;
use context_hub_types::{Asset, ForkResult, Message};
use sqlx::QueryBuilder;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// A source message staged for insertion under the new session.
struct StagedMessage<'a> {
    source: &'a Message,
    new_id: Uuid,
    new_parent_id: Option<Uuid>,
    envelope: serde_json::Value,
}

impl Database {
    /// Fork a session into a fresh one with an isomorphic message forest,
    /// the same task list, and incremented asset reference counts.
    ///
    /// Messages appended to the source after the Phase A snapshot are not
    /// part of the fork (snapshot-at-start semantics). Concurrent forks of
    /// the same session serialize on the source row lock.
    pub async fn fork_session(
        &self,
        project_id: Uuid,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> DbResult<ForkResult> {
        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }

        // ── Phase A: snapshot, gate, copy ────────────────────────────
        let source = self.get_session(project_id, session_id).await?;

        let message_count = self.count_messages(session_id).await?;
        if message_count > MAX_FORK_MESSAGES {
            return Err(StoreError::SessionTooLarge(format!(
                "session has {message_count} messages (limit {MAX_FORK_MESSAGES})"
            )));
        }

        let messages = self.list_all_messages(session_id).await?;
        let id_map: HashMap<Uuid, Uuid> = messages
            .iter()
            .map(|m| (m.id, Uuid::new_v4()))
            .collect();

        // Every reference edge the source holds: envelope descriptors plus
        // the nested assets inside each parts blob. The parts downloads
        // double as the input for the asset gate.
        let mut assets: Vec<Asset> = Vec::new();
        for message in &messages {
            let envelope = &message.parts_asset_meta;
            if !envelope.is_empty() {
                assets.push(envelope.clone());
            }
            if !envelope.s3_key.is_empty() {
                let bytes = self.blobs().get(&envelope.bucket, &envelope.s3_key).await?;
                assets.extend(collect_part_assets(&bytes)?);
            }
            if cancel.is_cancelled() {
                return Err(StoreError::Canceled);
            }
        }

        let unique_shas: HashSet<&str> = assets.iter().map(|a| a.sha256.as_str()).collect();
        if unique_shas.len() > MAX_FORK_ASSETS {
            return Err(StoreError::SessionTooLarge(format!(
                "session references {} unique assets (limit {MAX_FORK_ASSETS})",
                unique_shas.len()
            )));
        }

        let staged = self
            .stage_messages(project_id, session_id, &messages, &id_map, cancel)
            .await?;

        // ── Phase B: locked transaction ──────────────────────────────
        let mut tx = self.pool().begin().await?;

        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM sessions WHERE id = $1 AND project_id = $2 FOR UPDATE")
                .bind(session_id)
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            // Source vanished between snapshot and lock.
            return Err(StoreError::NotFound);
        }

        // Close the race with writers that appended since the snapshot.
        let (count_now,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        if count_now > MAX_FORK_MESSAGES {
            return Err(StoreError::SessionTooLarge(format!(
                "session grew to {count_now} messages (limit {MAX_FORK_MESSAGES})"
            )));
        }

        let new_session_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO sessions (id, project_id, user_id, disable_task_tracking, configs)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(new_session_id)
        .bind(project_id)
        .bind(source.user_id)
        .bind(source.disable_task_tracking)
        .bind(&source.configs)
        .execute(&mut *tx)
        .await?;

        // Messages go in source order (parents sort before children), task
        // links NULL for now.
        for chunk in staged.chunks(MESSAGE_BATCH_SIZE) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO messages (id, session_id, role, parent_id, parts_asset_meta, meta, \
                 session_task_process_status, task_id, created_at) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.new_id)
                    .push_bind(new_session_id)
                    .push_bind(&row.source.role)
                    .push_bind(row.new_parent_id)
                    .push_bind(&row.envelope)
                    .push_bind(&row.source.meta)
                    .push_bind(row.source.session_task_process_status.as_db_str())
                    .push_bind(Option::<Uuid>::None)
                    .push_bind(row.source.created_at);
            });
            qb.build().execute(&mut *tx).await?;
        }

        // Tasks, preserving task_order.
        let task_rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM session_tasks WHERE session_id = $1
             ORDER BY task_order ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;
        let tasks: Vec<_> = task_rows.into_iter().map(TaskRow::into_task).collect();

        let task_map: HashMap<Uuid, Uuid> =
            tasks.iter().map(|t| (t.id, Uuid::new_v4())).collect();

        if !tasks.is_empty() {
            let mut qb = QueryBuilder::new(
                "INSERT INTO session_tasks (id, project_id, session_id, task_order, data, status, is_planning) ",
            );
            qb.push_values(tasks.iter(), |mut b, task| {
                b.push_bind(task_map[&task.id])
                    .push_bind(project_id)
                    .push_bind(new_session_id)
                    .push_bind(task.task_order)
                    .push_bind(&task.data)
                    .push_bind(&task.status)
                    .push_bind(task.is_planning);
            });
            qb.build().execute(&mut *tx).await?;
        }

        // Second pass: re-link messages to their copied tasks.
        for row in &staged {
            let Some(old_task_id) = row.source.task_id else {
                continue;
            };
            match task_map.get(&old_task_id) {
                Some(new_task_id) => {
                    sqlx::query("UPDATE messages SET task_id = $2 WHERE id = $1")
                        .bind(row.new_id)
                        .bind(new_task_id)
                        .execute(&mut *tx)
                        .await?;
                }
                None => {
                    warn!(session = %session_id, message = %row.source.id, task = %old_task_id,
                          "source message references a task outside the session; dropping link");
                }
            }
        }

        // Reference increments ride the same transaction as the inserts:
        // either the new session and its counts land together or neither do.
        increment_asset_refs(&mut *tx, project_id, &assets).await?;

        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        tx.commit().await?;

        info!(old = %session_id, new = %new_session_id,
              messages = staged.len(), tasks = tasks.len(), "session forked");

        Ok(ForkResult {
            old_session_id: session_id,
            new_session_id,
            message_count: staged.len(),
            task_count: tasks.len(),
        })
    }

    /// Remap parents, rewrite envelopes, and perform the server-side parts
    /// copies for every staged message.
    async fn stage_messages<'a>(
        &self,
        project_id: Uuid,
        session_id: Uuid,
        messages: &'a [Message],
        id_map: &HashMap<Uuid, Uuid>,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<StagedMessage<'a>>> {
        let mut staged = Vec::with_capacity(messages.len());
        for message in messages {
            let Some(&new_id) = id_map.get(&message.id) else {
                // Unreachable under correct snapshotting; defended anyway.
                return Err(StoreError::internal("message missing from fork id map"));
            };

            let new_parent_id = match message.parent_id {
                None => None,
                Some(parent) => match id_map.get(&parent) {
                    Some(&new_parent) => Some(new_parent),
                    None => {
                        warn!(session = %session_id, message = %message.id, parent = %parent,
                              "parent missing from snapshot; inserting fork copy as root");
                        None
                    }
                },
            };

            let mut envelope = message.parts_asset_meta.clone();
            if !envelope.s3_key.is_empty() {
                let new_key = parts_key(project_id, new_id);
                self.blobs()
                    .copy(&envelope.bucket, &envelope.s3_key, &new_key)
                    .await?;
                envelope.s3_key = new_key;
            }

            staged.push(StagedMessage {
                source: message,
                new_id,
                new_parent_id,
                envelope: serde_json::to_value(&envelope)?,
            });

            if cancel.is_cancelled() {
                return Err(StoreError::Canceled);
            }
        }
        Ok(staged)
    }
}
