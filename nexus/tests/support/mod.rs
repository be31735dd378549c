//! 監査パイプライン統合テスト用ヘルパー
//!
//! 一時ディレクトリ上のSQLiteに実際のマイグレーションを適用し、
//! 監査ミドルウェア配下にテスト用のITSMルートを組み込む。

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Extension, Json, Router};
use itsm_nexus::audit::types::{AuditLogFilter, AuditRecord};
use itsm_nexus::bootstrap::build_state;
use itsm_nexus::common::auth::AuthUser;
use itsm_nexus::config::AuditConfig;
use itsm_nexus::db::audit_log::AuditLogStorage;
use itsm_nexus::db::migrations::initialize_database;
use itsm_nexus::{api, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// テスト用アプリケーション
pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub handler_calls: Arc<AtomicUsize>,
    pub audit_worker: JoinHandle<()>,
    _dir: TempDir,
}

/// ITSM CRUD層の代わりとなるエンティティテーブル
const ENTITY_SCHEMA: &[&str] = &[
    "CREATE TABLE incidents (
        ticket_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        priority TEXT
    )",
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL
    )",
];

async fn create_incident(
    State(state): State<AppState>,
    Extension(calls): Extension<Arc<AtomicUsize>>,
    Json(body): Json<Value>,
) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    let ticket_id = body["ticket_id"].as_str().unwrap_or("INC-0").to_string();
    sqlx::query("INSERT INTO incidents (ticket_id, title, status, priority) VALUES (?, ?, ?, ?)")
        .bind(&ticket_id)
        .bind(body["title"].as_str().unwrap_or_default())
        .bind(body["status"].as_str().unwrap_or("new"))
        .bind(body["priority"].as_str())
        .execute(&state.db_pool)
        .await
        .unwrap();
    (
        StatusCode::CREATED,
        [("x-ticket-id", ticket_id.clone())],
        Json(json!({"ticket_id": ticket_id})),
    )
        .into_response()
}

async fn get_incident(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT title, status FROM incidents WHERE ticket_id = ?")
            .bind(&id)
            .fetch_optional(&state.db_pool)
            .await
            .unwrap();
    match row {
        Some((title, status)) => Json(json!({"title": title, "status": status})).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn update_incident(
    State(state): State<AppState>,
    Extension(calls): Extension<Arc<AtomicUsize>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    sqlx::query("UPDATE incidents SET status = COALESCE(?, status) WHERE ticket_id = ?")
        .bind(body["status"].as_str())
        .bind(&id)
        .execute(&state.db_pool)
        .await
        .unwrap();
    Json(json!({"ticket_id": id})).into_response()
}

async fn delete_incident(
    State(state): State<AppState>,
    Extension(calls): Extension<Arc<AtomicUsize>>,
    Path(id): Path<String>,
) -> StatusCode {
    calls.fetch_add(1, Ordering::SeqCst);
    sqlx::query("DELETE FROM incidents WHERE ticket_id = ?")
        .bind(&id)
        .execute(&state.db_pool)
        .await
        .unwrap();
    StatusCode::NO_CONTENT
}

async fn update_user(
    State(state): State<AppState>,
    Extension(calls): Extension<Arc<AtomicUsize>>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    sqlx::query("UPDATE users SET email = COALESCE(?, email) WHERE id = ?")
        .bind(body["email"].as_str())
        .bind(id)
        .execute(&state.db_pool)
        .await
        .unwrap();
    Json(json!({"id": id})).into_response()
}

/// テーブルを持たないリソース（変更前状態の取得が必ず失敗する）
async fn update_problem(
    Extension(calls): Extension<Arc<AtomicUsize>>,
    Path(id): Path<String>,
) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"problem_id": id})).into_response()
}

async fn reject_change(Extension(calls): Extension<Arc<AtomicUsize>>) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"error": "invalid change"})),
    )
        .into_response()
}

/// `x-test-user`ヘッダーを認証済みユーザーとして扱う
async fn fake_auth(mut request: Request<Body>, next: Next) -> Response {
    let user = request
        .headers()
        .get("x-test-user")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    if let Some(id) = user {
        request.extensions_mut().insert(AuthUser { id });
    }
    next.run(request).await
}

fn itsm_routes(calls: Arc<AtomicUsize>) -> Router<AppState> {
    Router::new()
        .route("/api/v1/incidents", post(create_incident))
        .route(
            "/api/v1/incidents/:id",
            axum::routing::get(get_incident)
                .put(update_incident)
                .delete(delete_incident),
        )
        .route("/api/v1/users/:id", put(update_user))
        .route("/api/v1/problems/:id", put(update_problem))
        .route("/api/v1/changes", post(reject_change))
        .layer(Extension(calls))
}

/// テスト用アプリケーションを構築する
pub async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("nexus.db").display());
    let pool = initialize_database(&url).await.unwrap();
    for ddl in ENTITY_SCHEMA {
        sqlx::query(ddl).execute(&pool).await.unwrap();
    }

    let ctx = build_state(pool.clone(), AuditConfig::default());
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = api::create_app_with_routes(ctx.state, itsm_routes(handler_calls.clone()))
        .layer(middleware::from_fn(fake_auth));

    TestApp {
        app,
        pool,
        handler_calls,
        audit_worker: ctx.audit_worker,
        _dir: dir,
    }
}

impl TestApp {
    /// リクエストを送信し、ステータスとボディ（JSONなら解析済み）を返す
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// 監査レコードが`expected`件以上になるまで待ち、新しい順で返す
    pub async fn wait_for_records(&self, expected: i64) -> Vec<AuditRecord> {
        let storage = AuditLogStorage::new(self.pool.clone());
        let filter = AuditLogFilter::default();
        for _ in 0..200 {
            if storage.count(&filter).await.unwrap() >= expected {
                return storage.query(&filter).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} audit records", expected);
    }

    pub fn handler_calls(&self) -> usize {
        self.handler_calls.load(Ordering::SeqCst)
    }

    pub async fn seed_incident(&self, ticket_id: &str, title: &str, status: &str) {
        sqlx::query(
            "INSERT INTO incidents (ticket_id, title, status, priority) VALUES (?, ?, ?, 'High')",
        )
        .bind(ticket_id)
        .bind(title)
        .bind(status)
        .execute(&self.pool)
        .await
        .unwrap();
    }

    pub async fn seed_user(&self, id: i64, email: &str, password_hash: &str) {
        sqlx::query("INSERT INTO users (id, username, email, password_hash) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(format!("user{}", id))
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .unwrap();
    }
}

/// JSONボディ付きリクエスト（プロキシ経由のクライアント、ユーザー5）
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("user-agent", "itsm-web/2.1")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .header("x-test-user", "5")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// ボディなしリクエスト（ソケットのピアアドレスのみ、未認証）
pub fn bare_request(method: &str, uri: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let peer: SocketAddr = "192.0.2.44:51000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}
