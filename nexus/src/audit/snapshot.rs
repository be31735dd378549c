//! 変更前スナップショットの取得
//!
//! 取得はベストエフォート。失敗・タイムアウト・未対応リソースはすべて
//! 「変更前状態なし」として扱い、リクエストには影響させない。
//! ハンドラーの書き込みと競合しうるが、ロックは取らない。

use crate::db::traits::RowLookup;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// リソース種別ごとの格納テーブル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTable {
    /// テーブル名
    pub table: &'static str,
    /// IDカラム名
    pub id_column: &'static str,
}

const fn entity(table: &'static str, id_column: &'static str) -> EntityTable {
    EntityTable { table, id_column }
}

/// リソース種別→テーブルの固定マッピング
const ENTITY_TABLES: &[(&str, EntityTable)] = &[
    ("incidents", entity("incidents", "ticket_id")),
    ("changes", entity("changes", "id")),
    ("problems", entity("problems", "problem_id")),
    ("vulnerabilities", entity("vulnerabilities", "vulnerability_id")),
    ("assets", entity("assets", "asset_tag")),
    ("releases", entity("releases", "release_id")),
    ("service-requests", entity("service_requests", "request_id")),
    ("sla", entity("sla_agreements", "agreement_id")),
    ("knowledge", entity("knowledge_articles", "article_id")),
    ("users", entity("users", "id")),
];

/// リソース種別に対応するテーブルを引く
pub fn entity_table(resource_type: &str) -> Option<EntityTable> {
    ENTITY_TABLES
        .iter()
        .find(|(name, _)| *name == resource_type)
        .map(|(_, table)| *table)
}

/// 変更前スナップショット取得
#[derive(Clone)]
pub struct SnapshotFetcher {
    lookup: Arc<dyn RowLookup>,
    timeout: Duration,
}

impl SnapshotFetcher {
    /// 新しいSnapshotFetcherを作成
    pub fn new(lookup: Arc<dyn RowLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    /// 現在の行を取得する。取れなければNone
    pub async fn fetch(&self, resource_type: &str, resource_id: Option<&str>) -> Option<Value> {
        let id = resource_id?;
        let Some(target) = entity_table(resource_type) else {
            debug!(resource_type, "No entity table mapped, skipping prior state");
            return None;
        };

        let lookup = self
            .lookup
            .fetch_row(target.table, target.id_column, id);
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(row)) => {
                if row.is_none() {
                    debug!(resource_type, resource_id = id, "Prior state not found");
                }
                row
            }
            Ok(Err(e)) => {
                warn!(
                    resource_type,
                    resource_id = id,
                    "Failed to fetch prior state: {}",
                    e
                );
                None
            }
            Err(_) => {
                warn!(
                    resource_type,
                    resource_id = id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Prior state lookup timed out"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for SnapshotFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFetcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
