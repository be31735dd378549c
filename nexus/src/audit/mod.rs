//! 監査ログシステム
//!
//! 変更系HTTPリクエストをミドルウェアで横取りし、変更前状態・差分・
//! リクエスト本文（機密値はマスク）を非同期に記録する。

/// 監査ログの型定義
pub mod types;

/// 機密フィールドのマスク
pub mod redact;

/// パスからのリソース抽出
pub mod resource;

/// アクション分類・セキュリティアクション判定
pub mod classify;

/// 監査対象外パス
pub mod exclusion;

/// 変更前後の差分計算
pub mod diff;

/// 変更前スナップショット取得
pub mod snapshot;

/// 非同期ライター
pub mod writer;

/// 監査ログミドルウェア
pub mod middleware;

pub use middleware::{audit_middleware, AuditContext};
pub use writer::AuditWriter;
