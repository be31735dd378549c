//! REST API
//!
//! 監査ログ閲覧API・ヘルスチェックと、ITSM API（外部提供のルーター）への
//! 監査ミドルウェア適用を担当する。

/// 監査ログ閲覧API
pub mod audit_log;
/// APIエラーレスポンス
pub mod error;
/// ヘルスチェック
pub mod health;

use crate::audit::audit_middleware;
use crate::AppState;
use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

/// 監査ログ閲覧APIのみを持つアプリケーションを構築
pub fn create_app(state: AppState) -> Router {
    create_app_with_routes(state, Router::new())
}

/// ITSM APIルーターを組み込んだアプリケーションを構築
///
/// `itsm_routes`を含む全ルートに監査ミドルウェアを掛ける。
/// 除外パスとGETは監査ミドルウェア側で素通しされる。
pub fn create_app_with_routes(state: AppState, itsm_routes: Router<AppState>) -> Router {
    let audit_routes = Router::new()
        .route("/api/v1/audit-logs", get(audit_log::list_audit_logs))
        .route("/api/v1/audit-logs/stats", get(audit_log::get_audit_log_stats))
        .route("/api/v1/audit-logs/:id", get(audit_log::get_audit_log));

    let health_routes = Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready));

    Router::new()
        .merge(health_routes)
        .merge(audit_routes)
        .merge(itsm_routes)
        .layer(middleware::from_fn_with_state(
            state.audit.clone(),
            audit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
