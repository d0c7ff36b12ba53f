//! 服务端配置

use std::time::Duration;

use anyhow::{ensure, Result};
use relay_protocol::{
    TransportConfig, DEFAULT_PORT, IDLE_TIMEOUT, KEY_PUSH_INTERVAL, MAX_CONNECTIONS,
};

/// 默认资源路径
pub const DEFAULT_RESOURCE_PATH: &str = "/packs";

/// 服务端配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 监听地址
    pub addr: String,
    /// 未收到任何数据多久后断开
    pub idle_timeout: Duration,
    /// key 列表推送间隔
    pub key_push_interval: Duration,
    /// pack 中继处理器挂载的路径
    pub resource_path: String,
    /// 最大连接数（含未完成握手的连接）
    pub max_connections: usize,
    /// 接入连接的传输配置
    pub transport: TransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            idle_timeout: IDLE_TIMEOUT,
            key_push_interval: KEY_PUSH_INTERVAL,
            resource_path: DEFAULT_RESOURCE_PATH.to_string(),
            max_connections: MAX_CONNECTIONS,
            transport: TransportConfig::default(),
        }
    }
}

impl ServerConfig {
    /// 检查配置是否可用
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.idle_timeout.is_zero(), "idle timeout must be positive");
        ensure!(
            !self.key_push_interval.is_zero(),
            "key push interval must be positive"
        );
        ensure!(self.max_connections > 0, "max connections must be positive");
        ensure!(
            self.resource_path.starts_with('/'),
            "resource path must start with '/': {}",
            self.resource_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "0.0.0.0:8000");
        assert_eq!(config.idle_timeout, Duration::from_secs(240));
        assert_eq!(config.key_push_interval, Duration::from_secs(5));
        assert_eq!(config.resource_path, "/packs");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = ServerConfig {
            key_push_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_relative_resource_path() {
        let config = ServerConfig {
            resource_path: "packs".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
