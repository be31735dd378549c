//! ITSM-Sec Nexus Server Entry Point

use anyhow::Context;
use clap::Parser;
use itsm_nexus::cli::{Cli, Commands};
use itsm_nexus::config::{AuditConfig, ServerConfig};
use itsm_nexus::{bootstrap, logging, server};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let args = match cli.command {
        Some(Commands::Serve(args)) => args,
        None => Default::default(),
    };

    let _log_guard = logging::init().map_err(anyhow::Error::msg)?;

    let config = args.apply(ServerConfig::from_env());
    let ctx = bootstrap::initialize(&config, AuditConfig::from_env())
        .await
        .context("failed to initialize server")?;

    let result = server::run(ctx.state, &config.bind_addr()).await;

    // AppStateは全てDrop済みなので、ワーカーはキューを書き切って終了する
    info!("Waiting for pending audit records to be written");
    if let Err(e) = ctx.audit_worker.await {
        warn!("Audit writer task ended abnormally: {}", e);
    }

    result.with_context(|| format!("server error on {}", config.bind_addr()))
}
