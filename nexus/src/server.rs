//! axumサーバー起動・シャットダウンハンドリング

use crate::shutdown::ShutdownController;
use crate::AppState;
use std::net::SocketAddr;
use tracing::{info, warn};

/// axumサーバーを起動し、シャットダウンシグナルを待機する
///
/// 返るのはサーバーが停止した後。監査ワーカーの排出待ちは呼び出し側の責務。
pub async fn run(state: AppState, bind_addr: &str) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();

    let app = crate::api::create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    info!("ITSM-Sec Nexus server listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// シャットダウンシグナルを待機
async fn shutdown_signal(shutdown: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = shutdown.wait() => {
            info!("Shutdown requested, shutting down...");
        }
    }
}
