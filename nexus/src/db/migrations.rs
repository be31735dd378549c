// データベース初期化とマイグレーション実行

use crate::common::error::{NexusError, NexusResult};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::path::Path;

/// `sqlite:`URLからファイルパス部分を取り出す（インメモリならNone）
fn database_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

/// SQLiteデータベース接続プールを作成してマイグレーションを実行
///
/// # Arguments
/// * `database_url` - データベースURL（例: "sqlite:data/itsm_nexus.db"）
///
/// # Returns
/// * `Ok(SqlitePool)` - 初期化済みデータベースプール
/// * `Err(NexusError)` - 初期化失敗
pub async fn initialize_database(database_url: &str) -> NexusResult<SqlitePool> {
    if let Some(parent) = database_file_path(database_url)
        .map(Path::new)
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            NexusError::Database(format!(
                "Failed to create database directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // データベースファイルが存在しない場合は作成
    if !Sqlite::database_exists(database_url)
        .await
        .map_err(|e| NexusError::Database(format!("Failed to check database: {}", e)))?
    {
        tracing::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .map_err(|e| NexusError::Database(format!("Failed to create database: {}", e)))?;
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .map_err(|e| NexusError::Database(format!("Failed to connect to database: {}", e)))?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// マイグレーションを実行（sqlx::migrate!マクロを使用）
pub async fn run_migrations(pool: &SqlitePool) -> NexusResult<()> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| NexusError::Database(format!("Failed to run migrations: {}", e)))?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
