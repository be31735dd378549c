//! Repository traitパターン定義
//!
//! 監査パイプラインが依存するDB操作を抽象化し、障害注入テストを可能にする。

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::audit::types::AuditRecord;
use crate::common::error::NexusResult;

use super::audit_log::AuditLogStorage;

// ---------------------------------------------------------------------------
// RowLookup
// ---------------------------------------------------------------------------

/// エンティティ行をキー指定で読み出すtrait（変更前スナップショット用）
#[async_trait]
pub trait RowLookup: Send + Sync {
    /// `table`から`id_column = id`の行を1件取得し、JSONオブジェクトで返す
    async fn fetch_row(&self, table: &str, id_column: &str, id: &str)
        -> NexusResult<Option<Value>>;
}

// ---------------------------------------------------------------------------
// AuditSink
// ---------------------------------------------------------------------------

/// 監査レコードの永続化先
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// レコードを1件挿入し、採番されたIDを返す
    async fn insert_record(&self, record: &AuditRecord) -> NexusResult<i64>;
}

// ===========================================================================
// SQLite implementations
// ===========================================================================

#[async_trait]
impl RowLookup for SqlitePool {
    async fn fetch_row(
        &self,
        table: &str,
        id_column: &str,
        id: &str,
    ) -> NexusResult<Option<Value>> {
        super::entities::fetch_row(self, table, id_column, id).await
    }
}

#[async_trait]
impl AuditSink for AuditLogStorage {
    async fn insert_record(&self, record: &AuditRecord) -> NexusResult<i64> {
        self.insert(record).await
    }
}
