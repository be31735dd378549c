//! サーバー初期化ロジック
//!
//! データベース接続、マイグレーション、監査ライター起動など
//! サーバー起動に必要なコンポーネントの初期化を担当する。

use crate::audit::snapshot::SnapshotFetcher;
use crate::audit::{AuditContext, AuditWriter};
use crate::common::error::NexusResult;
use crate::config::{AuditConfig, ServerConfig};
use crate::db::audit_log::AuditLogStorage;
use crate::db::migrations::initialize_database;
use crate::shutdown::ShutdownController;
use crate::AppState;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// サーバー初期化結果
///
/// `audit_worker`は`state`の全クローンがDropされた後に完了する。
/// 終了時にawaitすればキュー内の監査レコードを書き切れる。
pub struct InitContext {
    /// アプリケーション状態
    pub state: AppState,
    /// 監査ライターのバックグラウンドタスク
    pub audit_worker: JoinHandle<()>,
}

/// 初期化済みプールから`AppState`を組み立て、監査ライターを起動する
///
/// 監査レコードの書き込み先とスナップショットの読み出し元は同じプール。
pub fn build_state(db_pool: SqlitePool, audit_config: AuditConfig) -> InitContext {
    let storage = Arc::new(AuditLogStorage::new(db_pool.clone()));
    let (writer, audit_worker) = AuditWriter::spawn(storage.clone(), audit_config.queue_capacity);
    let snapshots = SnapshotFetcher::new(Arc::new(db_pool.clone()), audit_config.snapshot_timeout);

    let state = AppState {
        db_pool,
        audit_log_storage: storage,
        audit: AuditContext {
            writer,
            snapshots,
            config: audit_config,
        },
        shutdown: ShutdownController::default(),
    };

    InitContext {
        state,
        audit_worker,
    }
}

/// サーバー初期化を実行する
///
/// DB接続・マイグレーション後に`build_state`を呼ぶ。
pub async fn initialize(
    server_config: &ServerConfig,
    audit_config: AuditConfig,
) -> NexusResult<InitContext> {
    info!("ITSM-Sec Nexus v{}", env!("CARGO_PKG_VERSION"));

    let db_pool = initialize_database(&server_config.database_url).await?;
    info!(
        queue_capacity = audit_config.queue_capacity,
        snapshot_timeout_ms = audit_config.snapshot_timeout.as_millis() as u64,
        max_body_bytes = audit_config.max_body_bytes,
        "Audit pipeline configured"
    );

    Ok(build_state(db_pool, audit_config))
}
