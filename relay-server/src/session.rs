//! 连接会话
//!
//! 状态: `PendingHandshake` -> `Active` -> `Closed`
//!
//! 会话本身不做 I/O。收到的数据由连接任务转交给 hub，
//! 发出的数据通过 [`SessionHandle`] 放入连接任务的发送队列。

use std::sync::Arc;

use relay_protocol::{negotiate, FrameDecoder, ProtocolError, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::registry::ClientRegistry;
use crate::resource::{RelayContext, Resource, ResourceTable};

/// 会话 ID，进程内单调递增，不复用
pub type SessionId = u64;

/// 发给连接任务的指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// 握手响应，原样写出
    Handshake(String),
    /// 应用消息，写出时加帧
    Message(String),
    /// 关闭连接
    Close,
}

/// 会话的发送端
///
/// 可以廉价克隆，注册表持有的就是它的克隆。
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn new(id: SessionId, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// 发送一条应用消息
    ///
    /// 连接任务已经退出时返回 [`ProtocolError::ConnectionClosed`]
    pub fn send(&self, message: impl Into<String>) -> Result<()> {
        self.push(Outbound::Message(message.into()))
    }

    fn send_handshake(&self, response: String) -> Result<()> {
        self.push(Outbound::Handshake(response))
    }

    fn close(&self) -> Result<()> {
        self.push(Outbound::Close)
    }

    fn push(&self, outbound: Outbound) -> Result<()> {
        self.tx
            .send(outbound)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

/// 会话状态
#[derive(Clone)]
pub enum SessionState {
    /// 等待握手请求
    PendingHandshake,
    /// 握手完成，绑定了资源处理器
    Active { resource: Arc<dyn Resource> },
    /// 已关闭（终态）
    Closed,
}

/// 单个连接的服务端状态
pub struct Session {
    handle: SessionHandle,
    state: SessionState,
    decoder: FrameDecoder,
}

impl Session {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            state: SessionState::PendingHandshake,
            decoder: FrameDecoder::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    /// 绑定的资源处理器，握手完成前为 `None`
    pub fn resource(&self) -> Option<&Arc<dyn Resource>> {
        match &self.state {
            SessionState::Active { resource } => Some(resource),
            _ => None,
        }
    }

    /// 处理一次接收事件
    ///
    /// 返回错误时调用方必须关闭会话。
    pub fn receive(
        &mut self,
        text: &str,
        resources: &ResourceTable,
        ctx: &mut RelayContext,
    ) -> Result<()> {
        match self.state {
            SessionState::PendingHandshake => self.handshake(text, resources, ctx),
            SessionState::Active { .. } => self.dispatch(text, ctx),
            SessionState::Closed => Ok(()),
        }
    }

    /// 整块数据视为一次握手尝试
    fn handshake(
        &mut self,
        text: &str,
        resources: &ResourceTable,
        ctx: &mut RelayContext,
    ) -> Result<()> {
        let accepted = negotiate(text, resources)?;
        self.handle.send_handshake(accepted.response)?;

        self.state = SessionState::Active {
            resource: accepted.resource,
        };
        ctx.registry.register(self.handle.clone());

        info!(
            "Session {} handshake complete: {} (origin {:?}, {} online)",
            self.id(),
            accepted.request.location(),
            accepted.request.origin,
            ctx.registry.len()
        );

        if accepted.trailing.is_empty() {
            Ok(())
        } else {
            self.dispatch(&accepted.trailing, ctx)
        }
    }

    /// 解帧并逐条交给资源处理器，遇到格式错误立即停止
    fn dispatch(&mut self, text: &str, ctx: &mut RelayContext) -> Result<()> {
        let Some(resource) = self.resource().cloned() else {
            return Ok(());
        };

        self.decoder.feed(text)?;
        while let Some(message) = self.decoder.next_message()? {
            resource.handle_message(&self.handle, &message, ctx);
        }
        Ok(())
    }

    /// 关闭会话
    ///
    /// 可重复调用，只有第一次生效。返回本次是否发生了状态转换。
    pub fn close(&mut self, registry: &mut ClientRegistry) -> bool {
        if self.is_closed() {
            return false;
        }

        registry.deregister(self.id());
        self.state = SessionState::Closed;

        // 连接任务可能已经先退出了
        if let Err(e) = self.handle.close() {
            debug!("Session {} close ignored: {}", self.id(), e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::PackRelay;
    use relay_protocol::encode_frame;

    const HANDSHAKE: &str = "GET /packs HTTP/1.1\r\n\
                             Upgrade: WebSocket\r\n\
                             Connection: Upgrade\r\n\
                             Host: localhost:8000\r\n\
                             Origin: http://localhost\r\n\
                             \r\n";

    fn resources() -> ResourceTable {
        let mut table = ResourceTable::new();
        table.register("/packs", Arc::new(PackRelay));
        table
    }

    fn session(id: SessionId) -> (Session, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(SessionHandle::new(id, tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_handshake_activates_and_registers() {
        let (mut session, mut rx) = session(1);
        let mut ctx = RelayContext::new();

        session.receive(HANDSHAKE, &resources(), &mut ctx).unwrap();

        assert!(session.is_active());
        assert!(ctx.registry.contains(1));
        match drain(&mut rx).as_slice() {
            [Outbound::Handshake(response)] => {
                assert!(response.contains("WebSocket-Location: ws://localhost:8000/packs\r\n"));
            }
            other => panic!("unexpected outbound: {:?}", other),
        }
    }

    #[test]
    fn test_failed_handshake_sends_nothing() {
        let (mut session, mut rx) = session(1);
        let mut ctx = RelayContext::new();

        let err = session
            .receive("POST / HTTP/1.1\r\n\r\n", &resources(), &mut ctx)
            .unwrap_err();
        assert!(err.is_handshake_error());
        assert!(!session.is_active());
        assert!(ctx.registry.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_frames_after_handshake_in_same_chunk() {
        let (mut session, mut rx) = session(1);
        let mut ctx = RelayContext::new();

        let chunk = format!("{HANDSHAKE}{}", encode_frame("READY"));
        session.receive(&chunk, &resources(), &mut ctx).unwrap();

        let out = drain(&mut rx);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], Outbound::Message("[]".to_string()));
    }

    #[test]
    fn test_frame_format_error_aborts_chunk() {
        let (mut session, mut rx) = session(1);
        let mut ctx = RelayContext::new();
        session.receive(HANDSHAKE, &resources(), &mut ctx).unwrap();
        drain(&mut rx);

        let chunk = format!("{}garbage\u{FFFF}{}", encode_frame("READY"), encode_frame("READY"));
        let err = session.receive(&chunk, &resources(), &mut ctx).unwrap_err();

        assert!(matches!(err, ProtocolError::FrameFormat));
        // 只有第一条 READY 被处理
        assert_eq!(drain(&mut rx), vec![Outbound::Message("[]".to_string())]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut session, mut rx) = session(1);
        let mut ctx = RelayContext::new();
        session.receive(HANDSHAKE, &resources(), &mut ctx).unwrap();
        drain(&mut rx);

        assert!(session.close(&mut ctx.registry));
        assert!(!session.close(&mut ctx.registry));

        assert!(session.is_closed());
        assert!(ctx.registry.is_empty());
        assert_eq!(drain(&mut rx), vec![Outbound::Close]);
    }

    #[test]
    fn test_close_after_connection_gone() {
        let (mut session, rx) = session(1);
        let mut ctx = RelayContext::new();
        drop(rx);

        // 发送失败被吞掉，状态仍然转换
        assert!(session.close(&mut ctx.registry));
        assert!(session.is_closed());
    }

    #[test]
    fn test_closed_session_ignores_data() {
        let (mut session, mut rx) = session(1);
        let mut ctx = RelayContext::new();
        session.close(&mut ctx.registry);
        drain(&mut rx);

        session.receive(HANDSHAKE, &resources(), &mut ctx).unwrap();
        assert!(session.is_closed());
        assert!(ctx.registry.is_empty());
        assert!(drain(&mut rx).is_empty());
    }
}
