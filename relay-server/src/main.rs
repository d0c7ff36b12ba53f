//! Pack 中继服务端
//!
//! 基于 Tokio 的异步 TCP 服务器，使用旧版 WebSocket 握手与哨兵帧。

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use relay_protocol::{IDLE_TIMEOUT_SECS, KEY_PUSH_INTERVAL_SECS, MAX_CONNECTIONS};
use relay_server::{RelayServer, ServerConfig, DEFAULT_RESOURCE_PATH};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Relays pack records between WebSocket clients and caches them in memory")]
struct Args {
    /// 监听地址 (host:port)
    addr: Option<String>,

    /// 空闲超时（秒）
    #[arg(long, default_value_t = IDLE_TIMEOUT_SECS)]
    idle_timeout: u64,

    /// key 列表推送间隔（秒）
    #[arg(long, default_value_t = KEY_PUSH_INTERVAL_SECS)]
    push_interval: u64,

    /// pack 中继处理器的路径
    #[arg(long, default_value = DEFAULT_RESOURCE_PATH)]
    resource: String,

    /// 最大连接数
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,

    /// 输出调试日志
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            addr: self.addr.unwrap_or(defaults.addr),
            idle_timeout: Duration::from_secs(self.idle_timeout),
            key_push_interval: Duration::from_secs(self.push_interval),
            resource_path: self.resource,
            max_connections: self.max_connections,
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("relay_server={level}").parse()?)
                .add_directive(format!("relay_protocol={level}").parse()?),
        )
        .init();

    let config = args.into_config();
    config.validate()?;

    info!("Relay server starting on {}", config.addr);

    let server = RelayServer::new(config);
    server.run().await?;

    Ok(())
}
