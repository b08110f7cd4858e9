// crates/db/src/cursor.rs
// Opaque keyset-pagination cursor over (created_at, id).

use crate::{StoreError, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Position of the last returned row. Encodes to a URL-safe string so
/// handlers can hand it back verbatim; the wire form is opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    pub fn encode(&self) -> String {
        let raw = format!("{}|{}", self.created_at.to_rfc3339(), self.id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Decode a cursor previously produced by [`Cursor::encode`].
    ///
    /// Any malformed input is an `InvalidArgument("invalid cursor")`; the
    /// exact defect is not leaked to the caller.
    pub fn decode(s: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidArgument("invalid cursor".to_string());

        let raw = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        let raw = String::from_utf8(raw).map_err(|_| invalid())?;
        let (ts, id) = raw.split_once('|').ok_or_else(invalid)?;

        let created_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);
        let id = Uuid::parse_str(id).map_err(|_| invalid())?;
        Ok(Self { created_at, id })
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present only when `has_more` is true.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Clamp a caller-supplied limit into `[1, MAX_LIST_LIMIT]`, substituting
/// the default for zero or negative values.
pub(crate) fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LIST_LIMIT
    } else {
        limit.min(MAX_LIST_LIMIT)
    }
}

/// Build a [`Page`] from rows fetched with `limit + 1` (the extra row, if
/// present, proves there is more and is dropped from the result).
pub(crate) fn page_from_rows<T>(
    mut rows: Vec<T>,
    limit: usize,
    cursor_of: impl Fn(&T) -> Cursor,
) -> Page<T> {
    let has_more = rows.len() > limit;
    if has_more {
        rows.truncate(limit);
    }
    let next_cursor = if has_more {
        rows.last().map(|row| cursor_of(row).encode())
    } else {
        None
    };
    Page {
        items: rows,
        next_cursor,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_decode_round_trip() {
        let cursor = Cursor::new(Utc::now(), Uuid::new_v4());
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn encoded_cursor_is_url_safe() {
        let cursor = Cursor::new(Utc::now(), Uuid::new_v4());
        let encoded = cursor.encode();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn decode_rejects_garbage() {
        for bad in ["", "not-base64!!", "bm90LWEtY3Vyc29y", "YWJjfGRlZg"] {
            let err = Cursor::decode(bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidArgument(ref m) if m == "invalid cursor"));
        }
    }

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(0), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(-5), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(7), 7);
        assert_eq!(clamp_limit(10_000), MAX_LIST_LIMIT);
    }

    #[test]
    fn page_from_rows_fetch_one_extra() {
        let cursor_of =
            |n: &i64| Cursor::new(DateTime::from_timestamp(*n, 0).unwrap(), Uuid::nil());

        // Exactly limit rows: no next page
        let page = page_from_rows(vec![1, 2, 3], 3, cursor_of);
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());

        // limit + 1 rows: extra dropped, cursor points at the last kept row
        let page = page_from_rows(vec![1, 2, 3, 4], 3, cursor_of);
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(page.has_more);
        let next = Cursor::decode(page.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(next.created_at.timestamp(), 3);
    }
}
