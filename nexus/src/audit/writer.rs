//! 監査ログの非同期ライター
//!
//! 有界mpscチャネルでキャプチャを受信し、バックグラウンドタスクで
//! マスク・差分計算・レコード構築を行ってシンクへ1件ずつ書き込む。
//! レスポンス送信後に動くため、ここでの失敗はクライアントに届かない。

use crate::audit::diff::diff;
use crate::audit::redact::redact_opt;
use crate::audit::types::{AuditAction, AuditCapture, AuditRecord};
use crate::db::traits::AuditSink;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 監査ログの非同期ライター
///
/// Clone可能（senderのクローン）。全クローンがDropされるとワーカーは
/// キュー内の残りを書き終えてから停止する。
#[derive(Clone, Debug)]
pub struct AuditWriter {
    sender: mpsc::Sender<AuditCapture>,
}

impl AuditWriter {
    /// ライターを作成し、バックグラウンドタスクを起動
    ///
    /// 戻り値の`JoinHandle`はワーカー終了（キュー排出完了）の待機に使う。
    pub fn spawn(sink: Arc<dyn AuditSink>, queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = tokio::spawn(Self::background_task(rx, sink));
        (Self { sender: tx }, handle)
    }

    /// キャプチャをキューに送信（ブロックしない）
    ///
    /// キューが満杯・クローズ済みの場合は破棄してfalseを返す。
    pub fn send(&self, capture: AuditCapture) -> bool {
        match self.sender.try_send(capture) {
            Ok(()) => true,
            Err(TrySendError::Full(capture)) => {
                warn!(
                    action = %capture.action,
                    resource_type = %capture.resource.resource_type,
                    "Audit queue full, dropping audit record"
                );
                false
            }
            Err(TrySendError::Closed(capture)) => {
                warn!(
                    action = %capture.action,
                    resource_type = %capture.resource.resource_type,
                    "Audit writer stopped, dropping audit record"
                );
                false
            }
        }
    }

    /// バックグラウンド書き込みタスク
    async fn background_task(mut rx: mpsc::Receiver<AuditCapture>, sink: Arc<dyn AuditSink>) {
        while let Some(capture) = rx.recv().await {
            // レコード構築・書き込み中のpanicはここで止める
            let outcome = AssertUnwindSafe(Self::write_capture(capture, sink.as_ref()))
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                error!("Audit task panicked: {}", panic_message(panic.as_ref()));
            }
        }
        info!("Audit writer background task stopped");
    }

    /// 1件のキャプチャをレコード化して書き込む（失敗はログのみ、再試行しない）
    async fn write_capture(capture: AuditCapture, sink: &dyn AuditSink) {
        let record = build_record(capture, Utc::now());
        match sink.insert_record(&record).await {
            Ok(id) => debug!(
                id,
                action = %record.action,
                resource_type = %record.resource_type,
                "Audit record written"
            ),
            Err(e) => error!(
                action = %record.action,
                resource_type = %record.resource_type,
                resource_id = record.resource_id.as_deref().unwrap_or("-"),
                "Failed to write audit record: {}",
                e
            ),
        }
    }
}

/// キャプチャから永続化用レコードを構築する
///
/// 変更前・変更後の両方をマスクしてから差分を取るため、差分にも
/// 機密値は現れない。差分はupdateのみ。
pub fn build_record(capture: AuditCapture, created_at: DateTime<Utc>) -> AuditRecord {
    let prior_state = if capture.action.needs_prior_state() {
        redact_opt(capture.prior_state.as_ref())
    } else {
        None
    };
    let new_state = redact_opt(capture.request_body.as_ref());
    let diff = if capture.action == AuditAction::Update {
        diff(prior_state.as_ref(), new_state.as_ref())
    } else {
        None
    };

    AuditRecord {
        id: None,
        actor_id: capture.actor_id,
        action: capture.action,
        resource_type: capture.resource.resource_type,
        resource_id: capture.resource.resource_id,
        prior_state,
        diff,
        new_state,
        ip_address: capture.ip_address,
        user_agent: capture.user_agent,
        is_security_action: capture.is_security_action,
        created_at,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
