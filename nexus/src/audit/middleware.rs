//! 監査ログミドルウェア
//!
//! 変更系リクエスト（POST/PUT/PATCH/DELETE）を検出し、ハンドラー実行前に
//! 変更前スナップショットを取得、レスポンスボディ送信完了後に監査レコードを
//! ライターへ渡す。レスポンスのステータス・ヘッダー・ボディは変更しない。

use crate::audit::classify::{is_security_action, method_to_action};
use crate::audit::exclusion::is_excluded_path;
use crate::audit::resource::extract_resource_info;
use crate::audit::snapshot::SnapshotFetcher;
use crate::audit::types::AuditCapture;
use crate::audit::writer::AuditWriter;
use crate::common::auth::AuthUser;
use crate::common::ip::resolve_client_ip;
use crate::config::AuditConfig;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use futures::{future, stream, StreamExt};
use http_body::{Body as HttpBody, Frame, SizeHint};
use serde_json::Value;
use std::{
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};
use tracing::{debug, trace, warn};

/// 監査ミドルウェアの共有状態
#[derive(Clone, Debug)]
pub struct AuditContext {
    /// 非同期ライター
    pub writer: AuditWriter,
    /// 変更前スナップショット取得
    pub snapshots: SnapshotFetcher,
    /// 監査設定
    pub config: AuditConfig,
}

/// Content-TypeがJSON（`application/json`または`+json`）か
fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn declared_content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// ボディを監査用の値に変換する
///
/// JSONとして読めない場合は文字列スカラーとして保持する。
fn parse_body(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}

/// JSONリクエストボディを読み取り、同じ内容でリクエストを組み立て直す
///
/// JSON以外、または宣言サイズが上限を超えるボディは読まずにそのまま渡す。
/// 読み取りは上限+1バイトまで。超えた場合と読み取りエラーの場合は、
/// 読み取り済みの分に残りのストリーム（またはエラー）を繋いでハンドラーに渡す。
async fn capture_request_body(
    request: Request<Body>,
    max_body_bytes: usize,
) -> (Request<Body>, Option<Value>) {
    if !is_json_content_type(request.headers()) {
        return (request, None);
    }
    if declared_content_length(request.headers()).is_some_and(|len| len > max_body_bytes) {
        debug!("Request body exceeds audit limit, not captured");
        return (request, None);
    }

    let (parts, body) = request.into_parts();
    let mut rest = body.into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();

    while let Some(chunk) = rest.next().await {
        match chunk {
            Ok(chunk) => {
                buffered.extend_from_slice(&chunk);
                if buffered.len() > max_body_bytes {
                    debug!(
                        read = buffered.len(),
                        "Request body exceeds audit limit, not captured"
                    );
                    let prefix = Bytes::from(buffered);
                    let body = Body::from_stream(
                        stream::once(future::ready(Ok::<_, axum::Error>(prefix))).chain(rest),
                    );
                    return (Request::from_parts(parts, body), None);
                }
            }
            Err(e) => {
                warn!("Failed to read request body for audit: {}", e);
                let prefix = Bytes::from(buffered);
                let body = Body::from_stream(stream::iter([Ok(prefix), Err(e)]));
                return (Request::from_parts(parts, body), None);
            }
        }
    }

    let bytes = Bytes::from(buffered);
    let captured = parse_body(&bytes);
    (Request::from_parts(parts, Body::from(bytes)), captured)
}

/// 監査ログミドルウェア
///
/// 除外対象はそのまま通す。それ以外は`next`を1回だけ呼び、レスポンスボディを
/// `AuditedBody`で包んで送信完了時にキャプチャをライターへ渡す。
pub async fn audit_middleware(
    State(ctx): State<AuditContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    if is_excluded_path(&path, &method) {
        return next.run(request).await;
    }

    let action = method_to_action(&method);
    let resource = extract_resource_info(&path);

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip_address = resolve_client_ip(request.headers(), peer.as_ref());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request_actor = request.extensions().get::<AuthUser>().map(|user| user.id);

    let (request, request_body) = capture_request_body(request, ctx.config.max_body_bytes).await;
    let is_security = is_security_action(&method, &path, request_body.as_ref());

    // ハンドラーの書き込みより前に取得する
    let prior_state = if action.needs_prior_state() {
        ctx.snapshots
            .fetch(&resource.resource_type, resource.resource_id.as_deref())
            .await
    } else {
        None
    };

    let response = next.run(request).await;

    // 認証が内側のレイヤーで行われた場合はレスポンス側に載っている
    let actor_id = request_actor.or_else(|| response.extensions().get::<AuthUser>().map(|u| u.id));

    trace!(
        method = %method,
        path = %path,
        action = %action,
        resource_type = %resource.resource_type,
        status = response.status().as_u16(),
        is_security,
        "audit capture pending"
    );

    let capture = AuditCapture {
        actor_id,
        action,
        resource,
        prior_state,
        request_body,
        ip_address,
        user_agent,
        is_security_action: is_security,
    };

    let (parts, body) = response.into_parts();
    let body = Body::new(AuditedBody {
        inner: body,
        pending: Some(PendingAudit {
            writer: ctx.writer,
            capture,
        }),
    });
    Response::from_parts(parts, body)
}

/// 送信待ちの監査キャプチャ
#[derive(Debug)]
struct PendingAudit {
    writer: AuditWriter,
    capture: AuditCapture,
}

/// レスポンスボディのラッパー
///
/// ボディが終端に達した時点（またはDrop時）に一度だけキャプチャを送る。
/// フレームは加工せずそのまま流す。
#[derive(Debug)]
struct AuditedBody {
    inner: Body,
    pending: Option<PendingAudit>,
}

impl AuditedBody {
    fn dispatch(&mut self) {
        if let Some(PendingAudit { writer, capture }) = self.pending.take() {
            writer.send(capture);
        }
    }
}

impl Drop for AuditedBody {
    fn drop(&mut self) {
        self.dispatch();
    }
}

impl HttpBody for AuditedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(poll, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.dispatch();
        }
        poll
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}
