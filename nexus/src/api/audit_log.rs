//! 監査ログ閲覧APIハンドラー
//!
//! `/api/v1/audit-logs` 系のエンドポイント。いずれもGETのため監査対象外。

use super::error::AppError;
use crate::audit::types::{AuditLogFilter, AuditRecord};
use crate::common::error::{CommonError, NexusError};
use crate::db::audit_log::{AuditLogStats, StatsPeriod};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ページサイズのデフォルト
const DEFAULT_LIMIT: i64 = 50;
/// ページサイズの上限
const MAX_LIMIT: i64 = 100;

/// 監査ログ一覧取得のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQueryParams {
    /// ユーザーIDでフィルタ
    pub user_id: Option<i64>,
    /// アクションでフィルタ
    pub action: Option<String>,
    /// リソース種別でフィルタ（部分一致）
    pub resource_type: Option<String>,
    /// リソースIDでフィルタ
    pub resource_id: Option<String>,
    /// セキュリティアクションのみ（`true` / `1`）
    pub security_only: Option<String>,
    /// 開始日（`YYYY-MM-DD`またはRFC3339）
    pub from_date: Option<String>,
    /// 終了日（`YYYY-MM-DD`の場合はその日の終わりまで）
    pub to_date: Option<String>,
    /// IPアドレスでフィルタ
    pub ip_address: Option<String>,
    /// ページ番号（1始まり、デフォルト: 1）
    pub page: Option<i64>,
    /// ページあたり件数（デフォルト: 50、最大: 100）
    pub limit: Option<i64>,
}

/// ページ情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 総件数
    pub total: i64,
    /// 現在のページ
    pub page: i64,
    /// ページあたり件数
    pub limit: i64,
    /// 総ページ数
    pub total_pages: i64,
    /// 次ページがあるか
    pub has_next: bool,
    /// 前ページがあるか
    pub has_prev: bool,
}

impl Pagination {
    fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = (total + limit - 1) / limit;
        Self {
            total,
            page,
            limit,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// 監査ログ一覧レスポンス
#[derive(Debug, Serialize)]
pub struct AuditLogListResponse {
    /// 監査レコード
    pub data: Vec<AuditRecord>,
    /// ページ情報
    pub pagination: Pagination,
}

/// 監査ログ詳細レスポンス
#[derive(Debug, Serialize)]
pub struct AuditLogDetailResponse {
    /// 監査レコード
    #[serde(flatten)]
    pub record: AuditRecord,
    /// 差分が記録されている場合の変更前状態
    pub previous_values: Option<Value>,
}

/// 統計取得のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogStatsParams {
    /// 集計期間（`day` / `week` / `month`、デフォルト: `week`）
    pub period: Option<String>,
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1")
    )
}

/// 日付パラメータを解釈する
///
/// `YYYY-MM-DD`の場合、`end_of_day`なら23:59:59.999、そうでなければ00:00:00。
fn parse_date_bound(
    name: &str,
    raw: &str,
    end_of_day: bool,
) -> Result<DateTime<Utc>, CommonError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CommonError::Validation(format!("Invalid {}: {}", name, raw)))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| CommonError::Validation(format!("Invalid {}: {}", name, raw)))?;
    Ok(date.and_time(time).and_utc())
}

impl AuditLogQueryParams {
    fn into_filter(self) -> Result<AuditLogFilter, CommonError> {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let from = self
            .from_date
            .as_deref()
            .map(|raw| parse_date_bound("from_date", raw, false))
            .transpose()?;
        let to = self
            .to_date
            .as_deref()
            .map(|raw| parse_date_bound("to_date", raw, true))
            .transpose()?;

        Ok(AuditLogFilter {
            user_id: self.user_id,
            action: self.action.filter(|s| !s.is_empty()),
            resource_type: self.resource_type.filter(|s| !s.is_empty()),
            resource_id: self.resource_id.filter(|s| !s.is_empty()),
            security_only: is_truthy(self.security_only.as_deref()),
            from,
            to,
            ip_address: self.ip_address.filter(|s| !s.is_empty()),
            page: Some(page),
            per_page: Some(limit),
        })
    }
}

/// GET /api/v1/audit-logs - 監査ログ一覧取得
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(params): Query<AuditLogQueryParams>,
) -> Result<Json<AuditLogListResponse>, AppError> {
    let filter = params.into_filter()?;
    let storage = &state.audit_log_storage;

    let data = storage.query(&filter).await?;
    let total = storage.count(&filter).await?;

    Ok(Json(AuditLogListResponse {
        data,
        pagination: Pagination::new(
            total,
            filter.page.unwrap_or(1),
            filter.per_page.unwrap_or(DEFAULT_LIMIT),
        ),
    }))
}

/// GET /api/v1/audit-logs/:id - 監査ログ詳細取得
pub async fn get_audit_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AuditLogDetailResponse>, AppError> {
    let record = state
        .audit_log_storage
        .get_by_id(id)
        .await?
        .ok_or_else(|| NexusError::NotFound(format!("audit log {}", id)))?;

    let previous_values = record
        .diff
        .as_ref()
        .and_then(|_| record.prior_state.clone());

    Ok(Json(AuditLogDetailResponse {
        record,
        previous_values,
    }))
}

/// GET /api/v1/audit-logs/stats - 監査ログ統計取得
pub async fn get_audit_log_stats(
    State(state): State<AppState>,
    Query(params): Query<AuditLogStatsParams>,
) -> Result<Json<AuditLogStats>, AppError> {
    let period = params
        .period
        .as_deref()
        .map(StatsPeriod::parse)
        .unwrap_or_default();
    let stats = state.audit_log_storage.stats(period, Utc::now()).await?;
    Ok(Json(stats))
}
