// crates/db/src/queries/assets.rs
// Reference-count engine over (project, sha256), plus asset extraction from
// message envelopes and their parts blobs.
//
// The increment/decrement helpers take a bare connection so callers choose
// the failure domain: fork passes its open transaction for strict atomicity,
// delete acquires a pool connection after commit for best-effort cleanup.

use crate::queries::row_types::AssetRefRow;
use crate::{Database, DbResult};
use context_hub_types::{Asset, Part};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Parse a parts blob (JSON-encoded `Vec<Part>`) and collect every nested
/// asset with a non-empty sha256, one entry per reference edge.
pub fn collect_part_assets(bytes: &[u8]) -> Result<Vec<Asset>, serde_json::Error> {
    let parts: Vec<Part> = serde_json::from_slice(bytes)?;
    Ok(parts
        .into_iter()
        .filter_map(|part| part.asset)
        .filter(|asset| !asset.is_empty())
        .collect())
}

/// Group assets by sha256, keeping first-seen order and the first descriptor
/// for each sha. The count is the number of reference edges passed in.
fn group_by_sha(assets: &[Asset]) -> Vec<(&Asset, i64)> {
    let mut order: Vec<(&Asset, i64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for asset in assets.iter().filter(|a| !a.is_empty()) {
        match index.get(asset.sha256.as_str()) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(asset.sha256.as_str(), order.len());
                order.push((asset, 1));
            }
        }
    }
    order
}

/// Increment reference counts, one per element passed (duplicates allowed).
/// Upserts the asset record on first sight.
pub(crate) async fn increment_asset_refs(
    conn: &mut PgConnection,
    project_id: Uuid,
    assets: &[Asset],
) -> DbResult<()> {
    for (asset, count) in group_by_sha(assets) {
        sqlx::query(
            "INSERT INTO asset_refs (project_id, sha256, bucket, s3_key, etag, mime, size_bytes, ref_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (project_id, sha256)
             DO UPDATE SET ref_count = asset_refs.ref_count + EXCLUDED.ref_count",
        )
        .bind(project_id)
        .bind(&asset.sha256)
        .bind(&asset.bucket)
        .bind(&asset.s3_key)
        .bind(&asset.etag)
        .bind(&asset.mime)
        .bind(asset.size_bytes)
        .bind(count)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Decrement reference counts, one per element passed. Counters clamp at
/// zero. Returns the assets whose counter reached zero; their objects are
/// now eligible for physical deletion by the sweeper.
pub(crate) async fn decrement_asset_refs(
    conn: &mut PgConnection,
    project_id: Uuid,
    assets: &[Asset],
) -> DbResult<Vec<Asset>> {
    let mut zeroed = Vec::new();
    for (asset, count) in group_by_sha(assets) {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE asset_refs
             SET ref_count = GREATEST(ref_count - $3, 0)
             WHERE project_id = $1 AND sha256 = $2
             RETURNING ref_count",
        )
        .bind(project_id)
        .bind(&asset.sha256)
        .bind(count)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some((0,)) => {
                debug!(project = %project_id, sha256 = %asset.sha256,
                       "asset reference count reached zero");
                zeroed.push(asset.clone());
            }
            Some(_) => {}
            None => {
                warn!(project = %project_id, sha256 = %asset.sha256,
                      "decrement for untracked asset");
            }
        }
    }
    Ok(zeroed)
}

impl Database {
    /// Increment reference counts on a pool connection. See the module note
    /// for the transactional variant used by fork.
    pub async fn increment_asset_refs(&self, project_id: Uuid, assets: &[Asset]) -> DbResult<()> {
        let mut conn = self.pool().acquire().await?;
        increment_asset_refs(&mut conn, project_id, assets).await
    }

    /// Decrement reference counts on a pool connection; returns the assets
    /// whose counter reached zero.
    pub async fn decrement_asset_refs(
        &self,
        project_id: Uuid,
        assets: &[Asset],
    ) -> DbResult<Vec<Asset>> {
        let mut conn = self.pool().acquire().await?;
        decrement_asset_refs(&mut conn, project_id, assets).await
    }

    /// Read one asset record and its reference count.
    pub async fn get_asset_ref(
        &self,
        project_id: Uuid,
        sha256: &str,
    ) -> DbResult<Option<(Asset, i64)>> {
        let row: Option<AssetRefRow> = sqlx::query_as(
            "SELECT bucket, s3_key, etag, sha256, mime, size_bytes, ref_count
             FROM asset_refs WHERE project_id = $1 AND sha256 = $2",
        )
        .bind(project_id)
        .bind(sha256)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| {
            let count = r.ref_count;
            (r.into_asset(), count)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn asset(sha: &str) -> Asset {
        Asset {
            sha256: sha.to_string(),
            bucket: "ctx".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn collect_part_assets_skips_plain_text() {
        let blob = br#"[
            {"type": "text", "text": "hello"},
            {"type": "image", "asset": {"sha256": "aaa", "bucket": "ctx", "s3_key": "blobs/aaa"}},
            {"type": "file", "asset": {"sha256": "", "bucket": "ctx"}}
        ]"#;
        let assets = collect_part_assets(blob).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].sha256, "aaa");
    }

    #[test]
    fn collect_part_assets_rejects_non_array() {
        assert!(collect_part_assets(br#"{"not": "an array"}"#).is_err());
    }

    #[test]
    fn group_counts_reference_edges() {
        let assets = vec![asset("a"), asset("b"), asset("a"), asset(""), asset("a")];
        let grouped = group_by_sha(&assets);
        assert_eq!(grouped.len(), 2);
        assert_eq!((grouped[0].0.sha256.as_str(), grouped[0].1), ("a", 3));
        assert_eq!((grouped[1].0.sha256.as_str(), grouped[1].1), ("b", 1));
    }
}
