// crates/db/src/queries/callinfo.rs
// Transactional pop of the per-message tool-call queue embedded in `meta`.
//
// The queue lives under the reserved `call_info` key so that transient
// call/response matching state needs no schema change. Pops drain the
// earliest message first; the row lock serializes concurrent poppers.

use crate::{Database, DbResult, StoreError};
use context_hub_types::ToolCall;
use serde_json::Value;
use uuid::Uuid;

/// Reserved `meta` key holding the FIFO queue of pending tool calls.
pub(crate) const CALL_INFO_KEY: &str = "call_info";

/// Extract the queue from a `call_info` value.
///
/// The canonical form is a JSON array of `{id, name}` objects; some writers
/// have historically stored the array JSON-encoded as a string, so that form
/// is re-parsed. Anything else is an invariant breach.
pub(crate) fn parse_call_queue(value: &Value) -> Result<Vec<ToolCall>, StoreError> {
    let calls: Vec<ToolCall> = match value {
        Value::Array(_) => serde_json::from_value(value.clone())
            .map_err(|e| StoreError::internal(format!("malformed call_info array: {e}")))?,
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| StoreError::internal(format!("malformed call_info string: {e}")))?,
        other => {
            return Err(StoreError::internal(format!(
                "call_info is neither array nor string: {}",
                other
            )))
        }
    };
    if calls.is_empty() {
        return Err(StoreError::internal("call_info queue is empty"));
    }
    Ok(calls)
}

impl Database {
    /// Pop the head of the oldest non-empty tool-call queue in the session.
    ///
    /// Returns `NoAvailable` when no message carries a pending call. The
    /// `FOR UPDATE` lock on the selected row guarantees strict FIFO order
    /// under concurrent poppers: a newer message's queue only becomes
    /// eligible once every earlier one is drained.
    pub async fn pop_gemini_call(&self, session_id: Uuid) -> DbResult<ToolCall> {
        let mut tx = self.pool().begin().await?;

        // The length probe must stay inside the CASE: AND/OR conjuncts carry
        // no evaluation-order guarantee, so a bare jsonb_array_length would
        // raise on any row whose call_info is some other JSON type.
        let row: Option<(Uuid, Value)> = sqlx::query_as(
            "SELECT id, meta FROM messages
             WHERE session_id = $1
               AND CASE jsonb_typeof(meta->'call_info')
                   WHEN 'array' THEN jsonb_array_length(meta->'call_info') > 0
                   WHEN 'string' THEN true
                   ELSE false
               END
             ORDER BY created_at ASC, id ASC
             LIMIT 1
             FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((message_id, mut meta)) = row else {
            return Err(StoreError::NoAvailable);
        };

        let queue_value = meta
            .get(CALL_INFO_KEY)
            .ok_or_else(|| StoreError::internal("locked row lost its call_info key"))?;
        let mut queue = parse_call_queue(queue_value)?;
        let head = queue.remove(0);

        let object = meta
            .as_object_mut()
            .ok_or_else(|| StoreError::internal("message meta is not a JSON object"))?;
        if queue.is_empty() {
            object.remove(CALL_INFO_KEY);
        } else {
            object.insert(CALL_INFO_KEY.to_string(), serde_json::to_value(&queue)?);
        }

        sqlx::query("UPDATE messages SET meta = $2 WHERE id = $1")
            .bind(message_id)
            .bind(&meta)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_array_form() {
        let value = json!([{"id": "x", "name": "f"}, {"id": "y", "name": "g"}]);
        let queue = parse_call_queue(&value).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0], ToolCall { id: "x".into(), name: "f".into() });
    }

    #[test]
    fn parses_string_encoded_form() {
        let value = json!(r#"[{"id": "x", "name": "f"}]"#);
        let queue = parse_call_queue(&value).unwrap();
        assert_eq!(queue[0].name, "f");
    }

    #[test]
    fn rejects_empty_and_malformed_queues() {
        assert!(parse_call_queue(&json!([])).is_err());
        assert!(parse_call_queue(&json!("[]")).is_err());
        assert!(parse_call_queue(&json!({"id": "x"})).is_err());
        assert!(parse_call_queue(&json!([{"id": 1, "name": 2}])).is_err());
        assert!(parse_call_queue(&json!("not json")).is_err());
    }
}
