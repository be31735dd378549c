//! 機密フィールドのマスク処理
//!
//! キー名（小文字化）に機密語を含むフィールドの値を`[REDACTED]`に置換する。
//! 入力は変更せず、構造を保った新しい値を返す。

use serde_json::{Map, Value};

/// マスク後に格納する固定値
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// キー名にこれらの部分文字列を含むフィールドは値をマスクする
const SENSITIVE_KEY_PARTS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "api-key",
    "authorization",
    "cookie",
    "credential",
    "private_key",
    "session",
    "ssn",
    "credit_card",
    "card_number",
];

/// キーが機密フィールドか判定する
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower.contains(part))
}

/// JSON値を再帰的にマスクする
///
/// オブジェクト・配列は同じ形のまま複製し、スカラーと`null`はそのまま返す。
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let masked: Map<String, Value> = map
                .iter()
                .map(|(key, inner)| {
                    let masked = if is_sensitive_key(key) {
                        Value::String(REDACTION_MARKER.to_string())
                    } else {
                        redact(inner)
                    };
                    (key.clone(), masked)
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        scalar => scalar.clone(),
    }
}

/// 欠損値（None）を保ったままマスクする
pub fn redact_opt(value: Option<&Value>) -> Option<Value> {
    value.map(redact)
}
