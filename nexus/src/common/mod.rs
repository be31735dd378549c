//! 共通型定義

/// 認証済みアクター
pub mod auth;

/// エラー型
pub mod error;

/// クライアントIPアドレスの解決・正規化
pub mod ip;
