//! CLI module for itsm-nexus
//!
//! Provides the command-line interface for the audit server.

pub mod serve;

use clap::{Parser, Subcommand};

/// ITSM-Sec Nexus - audit-logging server for the ITSM API
#[derive(Parser, Debug)]
#[command(name = "itsm-nexus")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    NEXUS_HOST                       Bind address (default: 0.0.0.0)
    NEXUS_PORT                       Listen port (default: 5000)
    NEXUS_DATABASE_URL               Database URL (default: sqlite:data/itsm_nexus.db)
    NEXUS_LOG_LEVEL                  Log level (default: info)
    NEXUS_LOG_DIR                    Directory for rolling log files
    NEXUS_AUDIT_QUEUE_CAPACITY       Pending audit records before dropping (default: 10000)
    NEXUS_AUDIT_SNAPSHOT_TIMEOUT_MS  Prior-state lookup timeout (default: 2000)
    NEXUS_AUDIT_MAX_BODY_BYTES       Largest request body captured (default: 1048576)
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the audit server
    Serve(serve::ServeArgs),
}
