//! Pack 中继服务端库
//!
//! - 会话状态机 (session)
//! - 在线客户端注册表 (registry)
//! - Pack 存储 (store)
//! - 资源处理器与中继协议 (resource, relay)
//! - 事件中枢与 TCP 服务器 (hub, server)

pub mod config;
pub mod hub;
pub mod registry;
pub mod relay;
pub mod resource;
pub mod server;
pub mod session;
pub mod store;

pub use config::{ServerConfig, DEFAULT_RESOURCE_PATH};
pub use hub::{Event, Hub};
pub use registry::ClientRegistry;
pub use relay::PackRelay;
pub use resource::{RelayContext, Resource, ResourceTable};
pub use server::RelayServer;
pub use session::{Outbound, Session, SessionHandle, SessionId, SessionState};
pub use store::PackStore;
