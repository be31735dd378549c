//! 監査ログの型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 監査アクション
///
/// HTTPメソッドから導出され、利用者が指定することはない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuditAction {
    /// POST
    Create,
    /// PUT / PATCH
    Update,
    /// DELETE
    Delete,
    /// 上記以外（小文字化したメソッド名）
    Other(String),
}

impl AuditAction {
    /// 文字列表現
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other(method) => method.as_str(),
        }
    }

    /// 変更前スナップショットを取得すべきアクションか
    pub fn needs_prior_state(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}

impl From<String> for AuditAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Other(s),
        }
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// パスから導出したリソース情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// リソース種別（例: `incidents`）。判別不能時は`unknown`
    pub resource_type: String,
    /// リソースID（コレクション操作ではNone）
    pub resource_id: Option<String>,
}

/// 変更された1フィールド
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// 変更前の値
    pub from: Value,
    /// 変更後の値
    pub to: Value,
}

/// 変更前後の差分
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditDiff {
    /// 新規に追加されたキー
    pub added: Map<String, Value>,
    /// 削除されたキー
    pub removed: Map<String, Value>,
    /// 値が変化したキー
    pub changed: BTreeMap<String, FieldChange>,
}

impl AuditDiff {
    /// どのバケットも空か
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// 監査レコード（永続化対象）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// レコードID（DB挿入後に設定）
    pub id: Option<i64>,
    /// 操作したユーザーID（未認証・システム操作ではNone）
    pub actor_id: Option<i64>,
    /// アクション
    pub action: AuditAction,
    /// リソース種別
    pub resource_type: String,
    /// リソースID
    pub resource_id: Option<String>,
    /// マスク済みの変更前状態（update/deleteで取得できた場合のみ）
    pub prior_state: Option<Value>,
    /// 差分（updateで変更前後が揃い、かつ差がある場合のみ）
    pub diff: Option<AuditDiff>,
    /// マスク済みのリクエストボディ
    pub new_state: Option<Value>,
    /// クライアントIPアドレス
    pub ip_address: Option<String>,
    /// User-Agent
    pub user_agent: Option<String>,
    /// セキュリティ関連アクションか
    pub is_security_action: bool,
    /// 記録日時
    pub created_at: DateTime<Utc>,
}

/// レスポンス送信時点で確定している監査対象の事実
///
/// マスク処理・差分計算前の生データを保持し、バックグラウンドワーカーで
/// `AuditRecord`に変換される。
#[derive(Debug, Clone)]
pub struct AuditCapture {
    /// 操作したユーザーID
    pub actor_id: Option<i64>,
    /// アクション
    pub action: AuditAction,
    /// リソース情報
    pub resource: ResourceInfo,
    /// 変更前スナップショット（未マスク）
    pub prior_state: Option<Value>,
    /// リクエストボディ（未マスク）
    pub request_body: Option<Value>,
    /// クライアントIPアドレス
    pub ip_address: Option<String>,
    /// User-Agent
    pub user_agent: Option<String>,
    /// セキュリティ関連アクションか
    pub is_security_action: bool,
}

/// 監査ログ検索フィルタ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    /// ユーザーIDでフィルタ
    pub user_id: Option<i64>,
    /// アクションでフィルタ
    pub action: Option<String>,
    /// リソース種別でフィルタ（部分一致）
    pub resource_type: Option<String>,
    /// リソースIDでフィルタ
    pub resource_id: Option<String>,
    /// セキュリティアクションのみ
    pub security_only: bool,
    /// 開始日時
    pub from: Option<DateTime<Utc>>,
    /// 終了日時
    pub to: Option<DateTime<Utc>>,
    /// IPアドレスでフィルタ
    pub ip_address: Option<String>,
    /// ページ番号（1始まり）
    pub page: Option<i64>,
    /// ページあたり件数
    pub per_page: Option<i64>,
}
