// 認証済みアクターの受け渡し型
//
// JWT検証は上流の認証レイヤーが担当する。このcrateは結果だけを受け取る。

use serde::{Deserialize, Serialize};

/// 認証済みユーザー
///
/// 認証ミドルウェアがrequest（またはresponse）のextensionsに挿入する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// ユーザーID（usersテーブルの主キー）
    pub id: i64,
}
