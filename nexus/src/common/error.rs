//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `NexusError`は`external_message()`と`status_code()`を提供し、
//! 内部情報を含まないHTTPエラーレスポンスを生成できる。

use axum::http::StatusCode;
use thiserror::Error;

/// Common layer error type
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IP address parse error
    #[error("IP address parse error: {0}")]
    IpAddrParse(#[from] std::net::AddrParseError),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// ITSM-Sec Nexus error type
#[derive(Debug, Error)]
pub enum NexusError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Service unavailable (e.g., during initialization)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for NexusError {
    fn from(err: sqlx::Error) -> Self {
        NexusError::Database(err.to_string())
    }
}

impl NexusError {
    /// Returns a safe error message for external clients.
    ///
    /// Full error details (`to_string()`) belong in server logs only.
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::Common(CommonError::Validation(_)) => "Invalid request",
            Self::Common(_) => "Request error",
            Self::NotFound(_) => "Not found",
            Self::Database(_) => "Database error",
            Self::Timeout(_) => "Request timeout",
            Self::ServiceUnavailable(_) => "Service temporarily unavailable",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Common(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias (Common)
pub type CommonResult<T> = Result<T, CommonError>;

/// Result type alias
pub type NexusResult<T> = Result<T, NexusError>;
