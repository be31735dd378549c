//! ロギング初期化
//!
//! stdoutへのfmtレイヤーに加え、`NEXUS_LOG_DIR`指定時は日次ローテーションの
//! ファイル出力を追加する。

use crate::config::{get_env_with_fallback, get_env_with_fallback_or};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログファイル名のプレフィックス
const LOG_FILE_PREFIX: &str = "itsm-nexus.log";

/// フィルタ文字列を決定する
///
/// `RUST_LOG` → `NEXUS_LOG_LEVEL`（旧: `LOG_LEVEL`）→ `info` の順。
fn filter_directive() -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| get_env_with_fallback_or("NEXUS_LOG_LEVEL", "LOG_LEVEL", "info"))
}

/// tracingサブスクライバを初期化する
///
/// ファイル出力を有効にした場合、戻り値の`WorkerGuard`はプロセス終了まで
/// 保持すること（Dropでバッファがフラッシュされる）。
pub fn init() -> Result<Option<WorkerGuard>, String> {
    let filter = EnvFilter::try_new(filter_directive())
        .map_err(|e| format!("invalid log filter: {}", e))?;

    let (file_layer, guard) = match get_env_with_fallback("NEXUS_LOG_DIR", "LOG_DIR") {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .map_err(|e| format!("failed to create log directory {}: {}", dir, e))?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
