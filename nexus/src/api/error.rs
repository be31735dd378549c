//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::common::error::{CommonError, NexusError};
use axum::{response::IntoResponse, Json};
use serde_json::json;

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub NexusError);

impl From<NexusError> for AppError {
    fn from(err: NexusError) -> Self {
        AppError(err)
    }
}

impl From<CommonError> for AppError {
    fn from(err: CommonError) -> Self {
        AppError(NexusError::Common(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // Use external_message() to avoid exposing internal details.
        // Full error details are logged separately for debugging.
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!("API error: {}", self.0);
        } else {
            tracing::debug!("API error: {}", self.0);
        }

        let payload = json!({
            "error": self.0.external_message()
        });

        (status, Json(payload)).into_response()
    }
}
