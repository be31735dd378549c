//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs.

use std::time::Duration;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use itsm_nexus::config::get_env_with_fallback;
///
/// let port = get_env_with_fallback("NEXUS_PORT", "PORT");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither variable is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// 監査ミドルウェア設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    /// 書き込み待ちキューの上限。超過分は破棄してwarnログを出す。
    pub queue_capacity: usize,
    /// 変更前スナップショット取得のタイムアウト
    pub snapshot_timeout: Duration,
    /// 監査用に読み取るリクエストボディの上限（バイト）
    pub max_body_bytes: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            snapshot_timeout: Duration::from_millis(2_000),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl AuditConfig {
    /// Load audit configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let queue_capacity = get_env_with_fallback_parse(
            "NEXUS_AUDIT_QUEUE_CAPACITY",
            "AUDIT_QUEUE_CAPACITY",
            defaults.queue_capacity,
        )
        .max(1);
        let snapshot_timeout_ms = get_env_with_fallback_parse(
            "NEXUS_AUDIT_SNAPSHOT_TIMEOUT_MS",
            "AUDIT_SNAPSHOT_TIMEOUT_MS",
            defaults.snapshot_timeout.as_millis() as u64,
        );
        let max_body_bytes = get_env_with_fallback_parse(
            "NEXUS_AUDIT_MAX_BODY_BYTES",
            "AUDIT_MAX_BODY_BYTES",
            defaults.max_body_bytes,
        );

        Self {
            queue_capacity,
            snapshot_timeout: Duration::from_millis(snapshot_timeout_ms),
            max_body_bytes,
        }
    }
}

/// サーバー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// バインドするホスト
    pub host: String,
    /// バインドするポート
    pub port: u16,
    /// SQLiteデータベースURL
    pub database_url: String,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: get_env_with_fallback_or("NEXUS_HOST", "HOST", "0.0.0.0"),
            port: get_env_with_fallback_parse("NEXUS_PORT", "PORT", 5000),
            database_url: get_env_with_fallback_or(
                "NEXUS_DATABASE_URL",
                "DATABASE_URL",
                "sqlite:data/itsm_nexus.db",
            ),
        }
    }

    /// `host:port`形式のバインドアドレス
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
