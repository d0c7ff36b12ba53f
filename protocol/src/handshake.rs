//! 握手协商
//!
//! 旧版（标准化之前）WebSocket 握手:
//! ```text
//! GET /packs HTTP/1.1\r\n
//! Upgrade: WebSocket\r\n
//! Connection: Upgrade\r\n
//! Host: example.com:8000\r\n
//! Origin: http://example.com\r\n
//! \r\n
//! ```
//! 成功后返回固定格式的 101 响应，之后连接切换为帧模式。

use tracing::warn;

use crate::error::{ProtocolError, Result};

/// 响应状态行
const STATUS_LINE: &str = "HTTP/1.1 101 Web Socket Protocol Handshake";

/// 请求头结束标记
const HEAD_TERMINATOR: &str = "\r\n\r\n";

/// 按路径查找资源处理器
///
/// 握手只依赖这一个外部能力，具体的处理器由服务端注册。
pub trait ResourceResolver {
    /// 解析得到的处理器类型
    type Resource;

    /// 查找路径对应的处理器，不存在时返回 `None`
    fn resolve(&self, path: &str) -> Option<Self::Resource>;
}

/// 头部值约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderRule {
    /// 接受任意值并记录
    Any,
    /// 必须等于给定值
    Exact(&'static str),
}

/// 握手头部约定表
const HEADER_CONTRACT: [(&str, HeaderRule); 5] = [
    ("Upgrade", HeaderRule::Exact("WebSocket")),
    ("Connection", HeaderRule::Exact("Upgrade")),
    ("Host", HeaderRule::Any),
    ("Origin", HeaderRule::Any),
    ("Cookie", HeaderRule::Any),
];

fn header_rule(name: &str) -> Option<(&'static str, HeaderRule)> {
    HEADER_CONTRACT
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .copied()
}

/// 解析后的握手请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// 请求的资源路径（含查询串）
    pub resource: String,
    pub host: Option<String>,
    pub origin: Option<String>,
    /// 接受但不使用
    pub cookie: Option<String>,
    /// 不在约定表中的头部（仅提示，不中断握手）
    pub unsupported: Vec<String>,
}

impl HandshakeRequest {
    /// 解析请求头（不含结尾空行）
    pub fn parse(head: &str) -> Result<Self> {
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let tokens: Vec<&str> = request_line.split(' ').collect();
        let [method, path, version] = tokens.as_slice() else {
            return Err(ProtocolError::InvalidRequestLine(request_line.to_string()));
        };
        if *method != "GET" || *version != "HTTP/1.1" {
            return Err(ProtocolError::InvalidRequestLine(request_line.to_string()));
        }
        if !path.starts_with('/') {
            return Err(ProtocolError::InvalidResource(path.to_string()));
        }

        let mut request = Self {
            resource: path.to_string(),
            ..Default::default()
        };

        for line in lines.take_while(|line| !line.is_empty()) {
            let Some((name, value)) = line.split_once(": ") else {
                request.unsupported.push(line.to_string());
                continue;
            };

            match header_rule(name) {
                None => request.unsupported.push(name.to_string()),
                Some((_, HeaderRule::Exact(expected))) => {
                    if value != expected {
                        return Err(ProtocolError::HeaderMismatch {
                            name: name.to_string(),
                            expected: expected.to_string(),
                            actual: value.to_string(),
                        });
                    }
                }
                Some((known, HeaderRule::Any)) => request.record(known, value),
            }
        }

        Ok(request)
    }

    fn record(&mut self, name: &str, value: &str) {
        let slot = match name {
            "Host" => &mut self.host,
            "Origin" => &mut self.origin,
            "Cookie" => &mut self.cookie,
            _ => return,
        };
        *slot = Some(value.to_string());
    }

    /// 用于查找处理器的路径（去掉查询串）
    pub fn resource_path(&self) -> &str {
        self.resource
            .split_once('?')
            .map_or(self.resource.as_str(), |(path, _)| path)
    }

    /// `ws://<Host><resource>`
    pub fn location(&self) -> String {
        format!(
            "ws://{}{}",
            self.host.as_deref().unwrap_or_default(),
            self.resource
        )
    }

    /// 生成升级响应
    pub fn response(&self) -> String {
        format!(
            "{STATUS_LINE}\r\n\
             Upgrade: WebSocket\r\n\
             Connection: Upgrade\r\n\
             WebSocket-Origin: {}\r\n\
             WebSocket-Location: {}\r\n\
             \r\n",
            self.origin.as_deref().unwrap_or_default(),
            self.location()
        )
    }
}

/// 握手成功的结果
#[derive(Debug)]
pub struct Accepted<H> {
    pub request: HandshakeRequest,
    /// 绑定到会话的处理器
    pub resource: H,
    /// 需要原样写回的升级响应
    pub response: String,
    /// 空行之后同一次读取里携带的数据（已经是帧数据）
    pub trailing: String,
}

/// 对一次接收到的数据执行握手
///
/// 任何错误都意味着连接应当被关闭，且不发送响应。
pub fn negotiate<R: ResourceResolver>(raw: &str, resolver: &R) -> Result<Accepted<R::Resource>> {
    let (head, trailing) = match raw.find(HEAD_TERMINATOR) {
        Some(pos) => (&raw[..pos], &raw[pos + HEAD_TERMINATOR.len()..]),
        None => (raw, ""),
    };

    let request = HandshakeRequest::parse(head)?;
    for name in &request.unsupported {
        warn!("Unsupported handshake header: {}", name);
    }

    let resource = resolver
        .resolve(request.resource_path())
        .ok_or_else(|| ProtocolError::UnknownResource(request.resource.clone()))?;
    let response = request.response();

    Ok(Accepted {
        request,
        resource,
        response,
        trailing: trailing.to_string(),
    })
}
