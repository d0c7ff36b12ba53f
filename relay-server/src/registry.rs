//! 在线客户端注册表
//!
//! 只包含握手已完成的会话。迭代顺序等于注册顺序。

use std::collections::HashMap;

use tracing::debug;

use crate::session::{SessionHandle, SessionId};

/// 已完成握手的会话目录
#[derive(Debug, Default)]
pub struct ClientRegistry {
    order: Vec<SessionId>,
    sessions: HashMap<SessionId, SessionHandle>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册会话，调用方保证同一个 ID 不重复注册
    pub fn register(&mut self, handle: SessionHandle) {
        let id = handle.id();
        debug_assert!(!self.contains(id), "session {id} registered twice");
        self.order.push(id);
        self.sessions.insert(id, handle);
    }

    /// 注销会话，ID 不存在时什么也不做
    pub fn deregister(&mut self, id: SessionId) -> Option<SessionHandle> {
        let handle = self.sessions.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(handle)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 按注册顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &SessionHandle> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn for_each<F: FnMut(&SessionHandle)>(&self, f: F) {
        self.iter().for_each(f);
    }

    /// 发给除 `sender` 之外的所有会话
    ///
    /// 尽力而为：某个接收方失败不影响其他接收方。返回尝试发送的次数。
    pub fn broadcast_except(&self, sender: SessionId, message: &str) -> usize {
        let mut attempted = 0;
        for handle in self.iter().filter(|handle| handle.id() != sender) {
            attempted += 1;
            if let Err(e) = handle.send(message) {
                debug!("Broadcast to session {} failed: {}", handle.id(), e);
            }
        }
        attempted
    }
}
