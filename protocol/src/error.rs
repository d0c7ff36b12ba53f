//! 错误类型定义

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 收到的字节不是合法 UTF-8
    #[error("Invalid UTF-8 in received data")]
    InvalidUtf8,

    /// 握手请求行不合法（方法、路径、版本）
    #[error("Invalid request line: {0:?}")]
    InvalidRequestLine(String),

    /// 资源路径不以 '/' 开头
    #[error("Invalid resource: {0:?}")]
    InvalidResource(String),

    /// 必需的握手头部值不匹配
    #[error("Header mismatch: {name} expected {expected:?}, got {actual:?}")]
    HeaderMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// 没有为该路径注册资源处理器
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// 帧缺少起始标记
    #[error("Frame format error: missing start sentinel")]
    FrameFormat,

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ProtocolError {
    /// 是否为握手阶段的错误
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidRequestLine(_)
                | ProtocolError::InvalidResource(_)
                | ProtocolError::HeaderMismatch { .. }
                | ProtocolError::UnknownResource(_)
        )
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
