//! ITSM-Sec Nexus Server
//!
//! ITSM APIの変更操作を自動的に監査ログへ記録するサーバー

#![warn(missing_docs)]

/// 共通型定義（エラー・認証ユーザー・クライアントIP）
pub mod common;

/// REST APIハンドラー
pub mod api;

/// 監査ログシステム
pub mod audit;

/// サーバー初期化
pub mod bootstrap;

/// CLIインターフェース
pub mod cli;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// データベースアクセス
pub mod db;

/// ロギング初期化ユーティリティ
pub mod logging;

/// axumサーバー起動
pub mod server;

/// Shutdown controller
pub mod shutdown;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// データベース接続プール
    pub db_pool: sqlx::SqlitePool,

    /// 監査ログストレージ（閲覧API用）
    pub audit_log_storage: std::sync::Arc<db::audit_log::AuditLogStorage>,

    /// 監査ミドルウェアの共有状態（ライター・スナップショット取得）
    pub audit: audit::AuditContext,

    /// Cooperative shutdown controller
    pub shutdown: shutdown::ShutdownController,
}
