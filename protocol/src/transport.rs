//! 传输层抽象
//!
//! 中继协议只需要一个可靠的双向字节流。Transport trait 把 TCP 细节
//! 挡在会话逻辑之外，测试里也可以换成内存流。

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::Result;

/// 传输层配置
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// 是否禁用 Nagle 算法
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            // 消息很小且需要尽快广播
            nodelay: true,
        }
    }
}

/// 传输层抽象 trait
pub trait Transport: Send + Sync + Sized {
    /// 读取端类型
    type Reader: AsyncRead + Unpin + Send;
    /// 写入端类型
    type Writer: AsyncWrite + Unpin + Send;

    /// 对端地址，仅用于日志
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// 分离读写端
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// 传输层监听器抽象 trait（服务端使用）
pub trait TransportListener: Send + Sync + Sized {
    /// 对应的传输类型
    type Transport: Transport;

    /// 绑定地址并开始监听
    fn bind(addr: &str) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 接受新连接
    fn accept(&self) -> impl std::future::Future<Output = Result<Self::Transport>> + Send;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 传输实现
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpTransport {
    /// 包装已建立的 TcpStream
    pub fn from_stream(stream: TcpStream, config: &TransportConfig) -> Result<Self> {
        stream.set_nodelay(config.nodelay)?;
        let peer = stream.peer_addr().ok();
        Ok(Self { stream, peer })
    }
}

impl Transport for TcpTransport {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        self.stream.into_split()
    }
}

/// TCP 监听器实现
pub struct TcpListener {
    listener: tokio::net::TcpListener,
    config: TransportConfig,
}

impl TcpListener {
    /// 使用指定配置处理接入的连接
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// 获取本地绑定地址
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl TransportListener for TcpListener {
    type Transport = TcpTransport;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config: TransportConfig::default(),
        })
    }

    async fn accept(&self) -> Result<TcpTransport> {
        let (stream, _) = self.listener.accept().await?;
        TcpTransport::from_stream(stream, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn dial(addr: SocketAddr) -> TcpStream {
        TcpStream::connect(addr).await.unwrap()
    }

    #[tokio::test]
    async fn test_tcp_listener_bind() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn test_accept_records_peer_addr() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(dial(addr));
        let transport = listener.accept().await.unwrap();
        let client = client.await.unwrap();

        assert_eq!(transport.peer_addr(), Some(client.local_addr().unwrap()));
        assert!(transport.stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_accept_applies_listener_config() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_config(TransportConfig { nodelay: false });
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(dial(addr));
        let transport = listener.accept().await.unwrap();
        client.await.unwrap();

        assert!(!transport.stream.nodelay().unwrap());
    }
}
