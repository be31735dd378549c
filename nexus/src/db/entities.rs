//! エンティティ行の読み出し
//!
//! エンティティテーブルはCRUD層が所有する。ここでは変更前スナップショット用に
//! 任意の行を型に依存せずJSONへ変換するだけを担当する。

use crate::common::error::{CommonError, NexusError, NexusResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

/// テーブル名・カラム名として使える識別子か
fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// `table`から`id_column = id`の行を取得する
///
/// テーブル名・カラム名はバインドできないため識別子検証の上でSQLに埋め込む。
pub async fn fetch_row(
    pool: &SqlitePool,
    table: &str,
    id_column: &str,
    id: &str,
) -> NexusResult<Option<Value>> {
    for name in [table, id_column] {
        if !is_valid_identifier(name) {
            return Err(CommonError::Validation(format!("Invalid identifier: {}", name)).into());
        }
    }

    let sql = format!(
        "SELECT * FROM \"{}\" WHERE \"{}\" = ? LIMIT 1",
        table, id_column
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| NexusError::Database(format!("Failed to fetch {} row: {}", table, e)))?;

    row.as_ref().map(row_to_json).transpose()
}

/// SQLiteの行をJSONオブジェクトに変換する
///
/// INTEGER→数値、REAL→数値、TEXT→文字列、BLOB→Base64文字列、NULL→null。
pub fn row_to_json(row: &SqliteRow) -> NexusResult<Value> {
    let mut object = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "INT4" | "BIGINT" | "BOOLEAN" => {
                    Value::from(row.try_get_unchecked::<i64, _>(index)?)
                }
                "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                    Value::String(BASE64.encode(bytes))
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }

    Ok(Value::Object(object))
}
