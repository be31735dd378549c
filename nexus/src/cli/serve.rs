//! serve サブコマンド
//!
//! 監査サーバーを起動します。

use crate::config::ServerConfig;
use clap::Args;

/// serve サブコマンドの引数
///
/// 未指定の項目は`ServerConfig::from_env()`の値（環境変数・デフォルト）を使う。
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind address
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Database URL
    #[arg(long)]
    pub database_url: Option<String>,
}

impl ServeArgs {
    /// 引数で環境変数由来の設定を上書きする
    pub fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(database_url) = self.database_url {
            config.database_url = database_url;
        }
        config
    }
}
