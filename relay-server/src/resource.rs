//! 资源处理器
//!
//! 握手时按请求路径选出一个处理器，之后该会话的所有消息都交给它。

use std::collections::HashMap;
use std::sync::Arc;

use relay_protocol::ResourceResolver;

use crate::registry::ClientRegistry;
use crate::session::SessionHandle;
use crate::store::PackStore;

/// 处理器共享的中继状态
#[derive(Debug, Default)]
pub struct RelayContext {
    pub registry: ClientRegistry,
    pub store: PackStore,
}

impl RelayContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 路径可寻址的协议处理器
pub trait Resource: Send + Sync {
    /// 处理一条已解帧的消息
    fn handle_message(&self, session: &SessionHandle, message: &str, ctx: &mut RelayContext);

    /// 向会话推送当前 key 列表
    fn push_keys(&self, session: &SessionHandle, store: &PackStore);
}

/// 路径 -> 处理器
#[derive(Clone, Default)]
pub struct ResourceTable {
    handlers: HashMap<String, Arc<dyn Resource>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同一路径后注册的覆盖先注册的
    pub fn register(&mut self, path: impl Into<String>, resource: Arc<dyn Resource>) {
        self.handlers.insert(path.into(), resource);
    }
}

impl ResourceResolver for ResourceTable {
    type Resource = Arc<dyn Resource>;

    fn resolve(&self, path: &str) -> Option<Arc<dyn Resource>> {
        self.handlers.get(path).cloned()
    }
}
