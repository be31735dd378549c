//! 監査ログストレージ
//!
//! `audit_logs`テーブルへの追記と閲覧APIのための検索・集計。
//! 監査レコードは追記専用で、更新・削除の経路は持たない。

use crate::audit::types::{AuditAction, AuditDiff, AuditLogFilter, AuditRecord};
use crate::common::error::{CommonError, NexusError, NexusResult};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

/// `old_values`に差分を同梱する際のキー
const ENVELOPE_PREVIOUS: &str = "previousValues";
const ENVELOPE_DIFF: &str = "diff";

/// 監査ログのDB操作
#[derive(Clone)]
pub struct AuditLogStorage {
    pool: SqlitePool,
}

/// sqlx::FromRow用の行構造体
#[derive(Debug, sqlx::FromRow)]
struct AuditLogRow {
    id: i64,
    user_id: Option<i64>,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    old_values: Option<String>,
    new_values: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    is_security_action: i64,
    created_at: String,
}

impl TryFrom<AuditLogRow> for AuditRecord {
    type Error = NexusError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| NexusError::Database(format!("Failed to parse created_at: {}", e)))?;

        let (prior_state, diff) = decode_old_values(row.old_values.as_deref());

        Ok(AuditRecord {
            id: Some(row.id),
            actor_id: row.user_id,
            action: AuditAction::from(row.action),
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            prior_state,
            diff,
            new_state: row.new_values.as_deref().map(parse_json_lenient),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            is_security_action: row.is_security_action != 0,
            created_at,
        })
    }
}

/// 保存済みJSONを読む。壊れていれば文字列のまま返す
fn parse_json_lenient(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `old_values`カラムの値を組み立てる
///
/// 差分がある場合は`{"previousValues": ..., "diff": ...}`、
/// ない場合はマスク済みの変更前状態そのもの。
fn encode_old_values(record: &AuditRecord) -> NexusResult<Option<String>> {
    let value = match (&record.diff, &record.prior_state) {
        (Some(diff), prior) => Some(serde_json::json!({
            ENVELOPE_PREVIOUS: prior.clone().unwrap_or(Value::Null),
            ENVELOPE_DIFF: diff,
        })),
        (None, Some(prior)) => Some(prior.clone()),
        (None, None) => None,
    };

    value
        .map(|v| serde_json::to_string(&v))
        .transpose()
        .map_err(|e| NexusError::Internal(format!("Failed to encode old_values: {}", e)))
}

/// `old_values`カラムを(変更前状態, 差分)に分解する
fn decode_old_values(raw: Option<&str>) -> (Option<Value>, Option<AuditDiff>) {
    let Some(value) = raw.map(parse_json_lenient) else {
        return (None, None);
    };

    if let Value::Object(map) = &value {
        if map.len() == 2 && map.contains_key(ENVELOPE_PREVIOUS) {
            if let Some(Ok(diff)) = map
                .get(ENVELOPE_DIFF)
                .map(|d| serde_json::from_value::<AuditDiff>(d.clone()))
            {
                let prior = map
                    .get(ENVELOPE_PREVIOUS)
                    .cloned()
                    .filter(|v| !v.is_null());
                return (prior, Some(diff));
            }
        }
    }

    (Some(value), None)
}

/// 集計期間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    /// 直近24時間（時間単位のタイムライン）
    Day,
    /// 直近7日
    #[default]
    Week,
    /// 直近30日
    Month,
}

impl StatsPeriod {
    /// 文字列から変換（不明な値は`Week`）
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Self::Day,
            "month" => Self::Month,
            _ => Self::Week,
        }
    }

    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// 集計開始時刻
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => now - Duration::days(1),
            Self::Week => now - Duration::days(7),
            Self::Month => now - Duration::days(30),
        }
    }

    /// タイムラインのバケット長（`created_at`の先頭何文字で丸めるか）
    ///
    /// `YYYY-MM-DDTHH`（時間）または`YYYY-MM-DD`（日）。
    fn bucket_len(&self) -> i64 {
        match self {
            Self::Day => 13,
            Self::Week | Self::Month => 10,
        }
    }
}

/// キー別件数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CountEntry {
    /// 集計キー
    pub name: String,
    /// 件数
    pub count: i64,
}

/// ユーザー別件数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserCount {
    /// ユーザーID
    pub user_id: i64,
    /// 件数
    pub count: i64,
}

/// タイムラインの1区間
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimelineBucket {
    /// 区間の開始（`YYYY-MM-DDTHH`または`YYYY-MM-DD`）
    pub bucket: String,
    /// 件数
    pub count: i64,
}

/// 監査ログ統計
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogStats {
    /// 集計期間
    pub period: StatsPeriod,
    /// 集計開始時刻
    pub since: DateTime<Utc>,
    /// 総件数
    pub total: i64,
    /// セキュリティアクション件数
    pub security_actions: i64,
    /// アクション別件数
    pub by_action: Vec<CountEntry>,
    /// リソース種別上位10件
    pub top_resource_types: Vec<CountEntry>,
    /// ユーザー上位10件
    pub top_users: Vec<UserCount>,
    /// IPアドレス上位10件
    pub top_ip_addresses: Vec<CountEntry>,
    /// タイムライン
    pub timeline: Vec<TimelineBucket>,
}

/// 統計の上位件数
const TOP_N: i64 = 10;

/// `created_at`の保存形式（ミリ秒・UTC `Z`）
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl AuditLogStorage {
    /// 新しいAuditLogStorageを作成
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 監査レコードを1件挿入し、IDを返す
    pub async fn insert(&self, record: &AuditRecord) -> NexusResult<i64> {
        let old_values = encode_old_values(record)?;
        let new_values = record
            .new_state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| NexusError::Internal(format!("Failed to encode new_values: {}", e)))?;
        let is_security: i64 = if record.is_security_action { 1 } else { 0 };

        let result = sqlx::query(
            r#"INSERT INTO audit_logs (
                user_id, action, resource_type, resource_id,
                old_values, new_values, ip_address, user_agent,
                is_security_action, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.actor_id)
        .bind(record.action.as_str())
        .bind(&record.resource_type)
        .bind(&record.resource_id)
        .bind(&old_values)
        .bind(&new_values)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(is_security)
        .bind(format_timestamp(&record.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Database(format!("Failed to insert audit log: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    /// フィルタ条件に基づいて監査ログを検索（新しい順）
    pub async fn query(&self, filter: &AuditLogFilter) -> NexusResult<Vec<AuditRecord>> {
        let (where_clause, bind_values) = build_where_clause(filter);
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter.per_page.unwrap_or(50).max(1);
        let offset = (page - 1).checked_mul(per_page).ok_or_else(|| {
            CommonError::Validation(format!("Page out of range: {}", page))
        })?;

        let sql = format!(
            "SELECT id, user_id, action, resource_type, resource_id, old_values, new_values, \
             ip_address, user_agent, is_security_action, created_at \
             FROM audit_logs {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut query = sqlx::query_as::<_, AuditLogRow>(&sql);
        for val in &bind_values {
            query = query.bind(val.as_str());
        }
        query = query.bind(per_page).bind(offset);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NexusError::Database(format!("Failed to query audit logs: {}", e)))?;

        rows.into_iter()
            .map(AuditRecord::try_from)
            .collect::<Result<Vec<_>, _>>()
    }

    /// フィルタ条件に基づいてレコード数を取得
    pub async fn count(&self, filter: &AuditLogFilter) -> NexusResult<i64> {
        let (where_clause, bind_values) = build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) as cnt FROM audit_logs {}", where_clause);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for val in &bind_values {
            query = query.bind(val.as_str());
        }

        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| NexusError::Database(format!("Failed to count audit logs: {}", e)))
    }

    /// IDで監査ログを取得
    pub async fn get_by_id(&self, id: i64) -> NexusResult<Option<AuditRecord>> {
        let row = sqlx::query_as::<_, AuditLogRow>(
            "SELECT id, user_id, action, resource_type, resource_id, old_values, new_values, \
             ip_address, user_agent, is_security_action, created_at \
             FROM audit_logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NexusError::Database(format!("Failed to get audit log by id: {}", e)))?;

        row.map(AuditRecord::try_from).transpose()
    }

    /// 期間内の統計を集計
    pub async fn stats(
        &self,
        period: StatsPeriod,
        now: DateTime<Utc>,
    ) -> NexusResult<AuditLogStats> {
        let since = period.since(now);
        let since_str = format_timestamp(&since);
        let db_err = |what: &str, e: sqlx::Error| {
            NexusError::Database(format!("Failed to aggregate {}: {}", what, e))
        };

        let (total, security_actions): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_security_action), 0) \
             FROM audit_logs WHERE created_at >= ?",
        )
        .bind(&since_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("totals", e))?;

        let by_action: Vec<CountEntry> = sqlx::query_as(
            "SELECT action AS name, COUNT(*) AS count FROM audit_logs \
             WHERE created_at >= ? GROUP BY action ORDER BY count DESC, name",
        )
        .bind(&since_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("actions", e))?;

        let top_resource_types: Vec<CountEntry> = sqlx::query_as(
            "SELECT resource_type AS name, COUNT(*) AS count FROM audit_logs \
             WHERE created_at >= ? GROUP BY resource_type ORDER BY count DESC, name LIMIT ?",
        )
        .bind(&since_str)
        .bind(TOP_N)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("resource types", e))?;

        let top_users: Vec<UserCount> = sqlx::query_as(
            "SELECT user_id, COUNT(*) AS count FROM audit_logs \
             WHERE created_at >= ? AND user_id IS NOT NULL \
             GROUP BY user_id ORDER BY count DESC, user_id LIMIT ?",
        )
        .bind(&since_str)
        .bind(TOP_N)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("users", e))?;

        let top_ip_addresses: Vec<CountEntry> = sqlx::query_as(
            "SELECT ip_address AS name, COUNT(*) AS count FROM audit_logs \
             WHERE created_at >= ? AND ip_address IS NOT NULL \
             GROUP BY ip_address ORDER BY count DESC, name LIMIT ?",
        )
        .bind(&since_str)
        .bind(TOP_N)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("ip addresses", e))?;

        let timeline_sql = format!(
            "SELECT substr(created_at, 1, {}) AS bucket, COUNT(*) AS count FROM audit_logs \
             WHERE created_at >= ? GROUP BY bucket ORDER BY bucket",
            period.bucket_len()
        );
        let timeline: Vec<TimelineBucket> = sqlx::query_as(&timeline_sql)
            .bind(&since_str)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("timeline", e))?;

        Ok(AuditLogStats {
            period,
            since,
            total,
            security_actions,
            by_action,
            top_resource_types,
            top_users,
            top_ip_addresses,
            timeline,
        })
    }
}

/// フィルタからWHERE句とバインド値を構築
fn build_where_clause(filter: &AuditLogFilter) -> (String, Vec<String>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_values: Vec<String> = Vec::new();

    if let Some(user_id) = filter.user_id {
        conditions.push("user_id = ?".to_string());
        bind_values.push(user_id.to_string());
    }

    if let Some(ref action) = filter.action {
        conditions.push("action = ?".to_string());
        bind_values.push(action.clone());
    }

    if let Some(ref resource_type) = filter.resource_type {
        conditions.push("resource_type LIKE ?".to_string());
        bind_values.push(format!("%{}%", resource_type));
    }

    if let Some(ref resource_id) = filter.resource_id {
        conditions.push("resource_id = ?".to_string());
        bind_values.push(resource_id.clone());
    }

    if filter.security_only {
        conditions.push("is_security_action = 1".to_string());
    }

    if let Some(ref from) = filter.from {
        conditions.push("created_at >= ?".to_string());
        bind_values.push(format_timestamp(from));
    }

    if let Some(ref to) = filter.to {
        conditions.push("created_at <= ?".to_string());
        bind_values.push(format_timestamp(to));
    }

    if let Some(ref ip_address) = filter.ip_address {
        conditions.push("ip_address LIKE ?".to_string());
        bind_values.push(format!("%{}%", ip_address));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values)
}
