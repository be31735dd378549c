//! 監査パイプライン統合テスト
//!
//! ミドルウェア → ライター → SQLiteストレージ → 閲覧APIまでを実DBで通す。

#[path = "support/mod.rs"]
mod support;

use axum::http::StatusCode;
use itsm_nexus::audit::types::AuditAction;
use serde_json::json;
use support::{bare_request, json_request, spawn_app};

#[tokio::test]
async fn create_writes_one_record_after_single_handler_call() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/api/v1/incidents",
            json!({
                "ticket_id": "INC-1",
                "title": "Mail outage",
                "status": "new",
                "api_token": "t-123"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ticket_id"], "INC-1");
    assert_eq!(app.handler_calls(), 1);

    let records = app.wait_for_records(1).await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.action, AuditAction::Create);
    assert_eq!(record.resource_type, "incidents");
    assert!(record.resource_id.is_none());
    assert_eq!(record.actor_id, Some(5));
    assert_eq!(record.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(record.user_agent.as_deref(), Some("itsm-web/2.1"));
    assert!(record.is_security_action);
    assert!(record.prior_state.is_none());
    assert!(record.diff.is_none());

    let new_state = record.new_state.as_ref().unwrap();
    assert_eq!(new_state["title"], "Mail outage");
    assert_eq!(new_state["api_token"], "[REDACTED]");
}

#[tokio::test]
async fn reads_and_excluded_paths_are_not_recorded() {
    let app = spawn_app().await;
    app.seed_incident("INC-2", "Printer jam", "new").await;

    let (status, body) = app.send(bare_request("GET", "/api/v1/incidents/INC-2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Printer jam");

    let (status, _) = app.send(bare_request("POST", "/health/live")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    // 直列キューなので、これが書かれた時点で先行分も処理済み
    app.send(bare_request("DELETE", "/api/v1/incidents/INC-2")).await;

    let records = app.wait_for_records(1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::Delete);
}

#[tokio::test]
async fn delete_records_prior_state_from_entity_table() {
    let app = spawn_app().await;
    app.seed_incident("INC-3", "VPN down", "active").await;

    let (status, _) = app.send(bare_request("DELETE", "/api/v1/incidents/INC-3")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let records = app.wait_for_records(1).await;
    let record = &records[0];
    assert_eq!(record.resource_id.as_deref(), Some("INC-3"));
    assert_eq!(record.ip_address.as_deref(), Some("192.0.2.44"));
    assert!(record.actor_id.is_none());
    assert!(record.new_state.is_none());
    assert!(record.diff.is_none());

    let prior = record.prior_state.as_ref().unwrap();
    assert_eq!(prior["ticket_id"], "INC-3");
    assert_eq!(prior["title"], "VPN down");
    assert_eq!(prior["status"], "active");
}

#[tokio::test]
async fn update_stores_redacted_prior_state_and_diff() {
    let app = spawn_app().await;
    app.seed_user(7, "old@example.com", "bcrypt$hash").await;

    let (status, _) = app
        .send(json_request(
            "PUT",
            "/api/v1/users/7",
            json!({"email": "new@example.com", "password": "s3cret-pass"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let records = app.wait_for_records(1).await;
    let record = &records[0];
    assert_eq!(record.action, AuditAction::Update);
    assert!(record.is_security_action);

    let prior = record.prior_state.as_ref().unwrap();
    assert_eq!(prior["email"], "old@example.com");
    assert_eq!(prior["password_hash"], "[REDACTED]");

    let diff = record.diff.as_ref().unwrap();
    assert_eq!(diff.changed["email"].from, json!("old@example.com"));
    assert_eq!(diff.changed["email"].to, json!("new@example.com"));
    assert_eq!(diff.added["password"], "[REDACTED]");

    let (old_values, new_values): (String, String) =
        sqlx::query_as("SELECT old_values, new_values FROM audit_logs WHERE id = ?")
            .bind(record.id.unwrap())
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(old_values.contains("previousValues"));
    assert!(!old_values.contains("bcrypt$hash"));
    assert!(!new_values.contains("s3cret-pass"));
}

#[tokio::test]
async fn update_of_unchanged_fields_has_no_diff() {
    let app = spawn_app().await;
    app.seed_incident("INC-4", "Disk full", "new").await;

    app.send(json_request(
        "PUT",
        "/api/v1/incidents/INC-4",
        json!({"ticket_id": "INC-4", "title": "Disk full", "status": "new", "priority": "High"}),
    ))
    .await;

    let records = app.wait_for_records(1).await;
    assert!(records[0].diff.is_none());
    assert_eq!(records[0].prior_state.as_ref().unwrap()["status"], "new");
}

#[tokio::test]
async fn failed_prior_lookup_leaves_prior_state_absent() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(json_request(
            "PUT",
            "/api/v1/problems/PRB-9",
            json!({"status": "resolved"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["problem_id"], "PRB-9");
    assert_eq!(app.handler_calls(), 1);

    let records = app.wait_for_records(1).await;
    let record = &records[0];
    assert_eq!(record.resource_type, "problems");
    assert_eq!(record.resource_id.as_deref(), Some("PRB-9"));
    assert!(record.prior_state.is_none());
    assert!(record.diff.is_none());
    assert_eq!(record.new_state, Some(json!({"status": "resolved"})));
}

#[tokio::test]
async fn error_responses_are_recorded_unchanged() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/api/v1/changes",
            json!({"title": "Patch", "is_security_change": 0}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({"error": "invalid change"}));

    let records = app.wait_for_records(1).await;
    assert_eq!(records[0].resource_type, "changes");
    assert!(!records[0].is_security_action);
}

#[tokio::test]
async fn viewer_api_lists_details_and_summarizes() {
    let app = spawn_app().await;
    app.seed_incident("INC-5", "Login loop", "new").await;

    app.send(json_request(
        "POST",
        "/api/v1/incidents",
        json!({"ticket_id": "INC-6", "title": "Slow VPN"}),
    ))
    .await;
    app.send(json_request(
        "PUT",
        "/api/v1/incidents/INC-5",
        json!({"status": "active"}),
    ))
    .await;
    app.wait_for_records(2).await;

    let (status, list) = app
        .send(bare_request(
            "GET",
            "/api/v1/audit-logs?resource_type=incident&limit=1",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
    assert_eq!(list["data"][0]["action"], "update");
    assert_eq!(list["pagination"]["total"], 2);
    assert_eq!(list["pagination"]["totalPages"], 2);
    assert_eq!(list["pagination"]["hasNext"], true);
    assert_eq!(list["pagination"]["hasPrev"], false);

    let update_id = list["data"][0]["id"].as_i64().unwrap();
    let (status, detail) = app
        .send(bare_request("GET", &format!("/api/v1/audit-logs/{}", update_id)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["previous_values"]["status"], "new");
    assert_eq!(detail["diff"]["changed"]["status"]["to"], "active");

    let (status, filtered) = app
        .send(bare_request(
            "GET",
            "/api/v1/audit-logs?action=create&security_only=true",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filtered["pagination"]["total"], 1);
    assert_eq!(filtered["data"][0]["new_state"]["title"], "Slow VPN");

    let (status, stats) = app
        .send(bare_request("GET", "/api/v1/audit-logs/stats?period=day"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["period"], "day");
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["top_resource_types"][0]["name"], "incidents");
    assert_eq!(stats["top_resource_types"][0]["count"], 2);

    // 閲覧APIのGET自体は記録されない
    let records = app.wait_for_records(2).await;
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn viewer_api_rejects_page_beyond_offset_range() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(bare_request(
            "GET",
            "/api/v1/audit-logs?page=9223372036854775807&limit=100",
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid request"}));
}

#[tokio::test]
async fn worker_drains_queue_when_app_is_dropped() {
    let app = spawn_app().await;

    for i in 0..5 {
        app.send(json_request(
            "POST",
            "/api/v1/incidents",
            json!({"ticket_id": format!("INC-{}", 100 + i), "title": "Batch"}),
        ))
        .await;
    }

    let support::TestApp {
        app: router,
        pool,
        audit_worker,
        ..
    } = app;
    drop(router);
    tokio::time::timeout(std::time::Duration::from_secs(5), audit_worker)
        .await
        .expect("audit worker did not stop")
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 5);
}
