//! 中继中枢
//!
//! 唯一持有会话表、注册表和 pack 存储的任务。连接任务把接收事件放进
//! 同一个队列，这里按到达顺序逐个处理，所以中继状态不需要加锁。

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::resource::{RelayContext, ResourceTable};
use crate::session::{Session, SessionHandle, SessionId};

/// 连接任务发给中枢的事件
#[derive(Debug)]
pub enum Event {
    /// 新连接
    Accepted { handle: SessionHandle },
    /// 一次接收到的文本
    Received { id: SessionId, text: String },
    /// 对端关闭
    End { id: SessionId },
    /// 空闲超时
    IdleTimeout { id: SessionId },
    /// 读写出错
    Failed { id: SessionId, reason: String },
}

/// 中继中枢
pub struct Hub {
    sessions: HashMap<SessionId, Session>,
    resources: ResourceTable,
    ctx: RelayContext,
}

impl Hub {
    pub fn new(resources: ResourceTable) -> Self {
        Self {
            sessions: HashMap::new(),
            resources,
            ctx: RelayContext::new(),
        }
    }

    /// 所有会话数（含握手中）
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// 处理一个事件
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Accepted { handle } => {
                debug!("Session {} accepted", handle.id());
                self.sessions.insert(handle.id(), Session::new(handle));
            }
            Event::Received { id, text } => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    debug!("Data for closed session {} dropped", id);
                    return;
                };
                if let Err(e) = session.receive(&text, &self.resources, &mut self.ctx) {
                    if e.is_handshake_error() {
                        warn!("Session {} handshake rejected: {}", id, e);
                    } else {
                        warn!("Session {} protocol error: {}", id, e);
                    }
                    self.close_session(id);
                }
            }
            Event::End { id } => {
                if self.close_session(id) {
                    info!("Session {} disconnected", id);
                }
            }
            Event::IdleTimeout { id } => {
                if self.close_session(id) {
                    warn!("Session {} idle timeout", id);
                }
            }
            Event::Failed { id, reason } => {
                if self.close_session(id) {
                    warn!("Session {} transport error: {}", id, reason);
                }
            }
        }
    }

    /// 关闭并移除会话，会话不存在时返回 false
    pub fn close_session(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(mut session) => session.close(&mut self.ctx.registry),
            None => false,
        }
    }

    /// 关闭所有会话
    pub fn close_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.close_session(id);
        }
    }

    /// 给所有已握手的会话推送 key 列表，返回推送的会话数
    pub fn push_keys(&self) -> usize {
        let Self { sessions, ctx, .. } = self;
        let mut pushed = 0;
        ctx.registry.for_each(|handle| {
            if let Some(resource) = sessions.get(&handle.id()).and_then(Session::resource) {
                resource.push_keys(handle, &ctx.store);
                pushed += 1;
            }
        });
        pushed
    }

    /// 事件循环
    ///
    /// 第一次推送发生在启动一个周期之后；错过的周期直接跳过，推送不会重叠。
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Event>,
        push_interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = time::interval_at(Instant::now() + push_interval, push_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }

                _ = ticker.tick() => {
                    let pushed = self.push_keys();
                    debug!(
                        "Pushed {} keys to {} sessions ({} connected)",
                        self.ctx.store.len(),
                        pushed,
                        self.session_count()
                    );
                }

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Hub shutting down, closing {} sessions", self.session_count());
                        break;
                    }
                }
            }
        }

        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::PackRelay;
    use crate::session::Outbound;
    use std::sync::Arc;

    const HANDSHAKE: &str = "GET /packs HTTP/1.1\r\n\
                             Upgrade: WebSocket\r\n\
                             Connection: Upgrade\r\n\
                             Host: localhost:8000\r\n\
                             Origin: http://localhost\r\n\
                             \r\n";

    fn hub() -> Hub {
        let mut resources = ResourceTable::new();
        resources.register("/packs", Arc::new(PackRelay));
        Hub::new(resources)
    }

    fn accept(hub: &mut Hub, id: SessionId) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.handle_event(Event::Accepted {
            handle: SessionHandle::new(id, tx),
        });
        rx
    }

    fn connect(hub: &mut Hub, id: SessionId) -> mpsc::UnboundedReceiver<Outbound> {
        let mut rx = accept(hub, id);
        receive(hub, id, HANDSHAKE.to_string());
        assert!(matches!(rx.try_recv(), Ok(Outbound::Handshake(_))));
        rx
    }

    fn receive(hub: &mut Hub, id: SessionId, text: String) {
        hub.handle_event(Event::Received { id, text });
    }

    fn send(hub: &mut Hub, id: SessionId, message: &str) {
        receive(hub, id, relay_protocol::encode_frame(message));
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn msg(text: &str) -> Outbound {
        Outbound::Message(text.to_string())
    }

    #[test]
    fn test_ready_upload_ready_scenario() {
        let mut hub = hub();
        let mut a = connect(&mut hub, 1);
        let mut b = connect(&mut hub, 2);

        send(&mut hub, 1, "READY");
        assert_eq!(drain(&mut a), vec![msg("[]")]);

        let key = "a".repeat(64);
        let upload = format!("{key}:[1,2,3]");
        send(&mut hub, 1, &upload);
        assert_eq!(drain(&mut b), vec![msg(&upload)]);
        assert!(drain(&mut a).is_empty());

        send(&mut hub, 2, "READY");
        assert_eq!(drain(&mut b), vec![msg(&format!("[\"{key}\"]"))]);
    }

    #[test]
    fn test_malformed_handshake_closes_without_response() {
        let mut hub = hub();
        let mut rx = accept(&mut hub, 1);

        receive(&mut hub, 1, "POST / HTTP/1.1\r\n\r\n".to_string());

        assert_eq!(drain(&mut rx), vec![Outbound::Close]);
        assert_eq!(hub.session_count(), 0);
        assert!(hub.ctx.registry.is_empty());
    }

    #[test]
    fn test_unknown_resource_closes() {
        let mut hub = hub();
        let mut rx = accept(&mut hub, 1);

        receive(
            &mut hub,
            1,
            "GET /chat HTTP/1.1\r\nUpgrade: WebSocket\r\n\r\n".to_string(),
        );
        assert_eq!(drain(&mut rx), vec![Outbound::Close]);
    }

    #[test]
    fn test_idle_session_is_not_pushed() {
        let mut hub = hub();
        let mut a = connect(&mut hub, 1);
        let mut b = connect(&mut hub, 2);

        hub.handle_event(Event::IdleTimeout { id: 1 });
        assert_eq!(drain(&mut a), vec![Outbound::Close]);
        assert!(!hub.ctx.registry.contains(1));

        assert_eq!(hub.push_keys(), 1);
        assert!(drain(&mut a).is_empty());
        assert_eq!(drain(&mut b), vec![msg("[]")]);
    }

    #[test]
    fn test_pending_sessions_are_not_pushed() {
        let mut hub = hub();
        let mut pending = accept(&mut hub, 1);
        let mut active = connect(&mut hub, 2);

        assert_eq!(hub.push_keys(), 1);
        assert!(drain(&mut pending).is_empty());
        assert_eq!(drain(&mut active), vec![msg("[]")]);
    }

    #[test]
    fn test_double_close_is_harmless() {
        let mut hub = hub();
        let mut a = connect(&mut hub, 1);

        hub.handle_event(Event::IdleTimeout { id: 1 });
        hub.handle_event(Event::End { id: 1 });
        receive(&mut hub, 1, "late".to_string());

        assert_eq!(drain(&mut a), vec![Outbound::Close]);
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_frame_error_closes_session() {
        let mut hub = hub();
        let mut a = connect(&mut hub, 1);
        let mut b = connect(&mut hub, 2);

        receive(&mut hub, 1, "no sentinel\u{FFFF}".to_string());
        assert_eq!(drain(&mut a), vec![Outbound::Close]);

        // 2 号不受影响
        send(&mut hub, 2, "READY");
        assert_eq!(drain(&mut b), vec![msg("[]")]);
        assert_eq!(hub.ctx.registry.len(), 1);
    }

    #[test]
    fn test_partial_frame_across_events() {
        let mut hub = hub();
        let mut a = connect(&mut hub, 1);

        receive(&mut hub, 1, "\u{0000}REA".to_string());
        assert!(drain(&mut a).is_empty());
        receive(&mut hub, 1, "DY\u{FFFF}".to_string());
        assert_eq!(drain(&mut a), vec![msg("[]")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_pushes_keys_periodically() {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval = Duration::from_secs(5);
        let task = tokio::spawn(hub().run(events_rx, interval, shutdown_rx));

        let start = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        events_tx
            .send(Event::Accepted {
                handle: SessionHandle::new(1, tx),
            })
            .await
            .unwrap();
        events_tx
            .send(Event::Received {
                id: 1,
                text: HANDSHAKE.to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Outbound::Handshake(_))));
        assert_eq!(rx.recv().await, Some(msg("[]")));
        assert!(start.elapsed() >= interval);

        shutdown_tx.send(true).unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::Close));
        task.await.unwrap();
    }
}
