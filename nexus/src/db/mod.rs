//! データベースアクセス層
//!
//! SQLiteベースのデータ永続化

/// データベースマイグレーション
pub mod migrations;

/// 監査ログストレージ
pub mod audit_log;

/// エンティティ行の読み出し（変更前スナップショット用）
pub mod entities;

/// Repository traitパターン（テスタビリティ向上）
pub mod traits;
