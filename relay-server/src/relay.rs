//! Pack 中继协议
//!
//! | 消息                | 处理                                         |
//! |---------------------|----------------------------------------------|
//! | `PING`              | 忽略                                         |
//! | `READY`             | 回复全部 key 的 JSON 数组                    |
//! | `<key>`             | 回复 `<key>:<value>`，不存在时 `<key>:null` |
//! | `<key>:[...]`       | 原样广播给其他会话，key 不存在时写入         |

use relay_protocol::{key_list, missing_pack_reply, pack_reply, RelayMessage};
use tracing::{debug, info, warn};

use crate::resource::{RelayContext, Resource};
use crate::session::SessionHandle;
use crate::store::PackStore;

/// Pack 中继处理器（无状态，状态都在 [`RelayContext`] 中）
#[derive(Debug, Clone, Copy, Default)]
pub struct PackRelay;

impl PackRelay {
    fn reply(session: &SessionHandle, message: String) {
        if let Err(e) = session.send(message) {
            debug!("Reply to session {} dropped: {}", session.id(), e);
        }
    }
}

impl Resource for PackRelay {
    fn handle_message(&self, session: &SessionHandle, message: &str, ctx: &mut RelayContext) {
        match RelayMessage::classify(message) {
            RelayMessage::Ping => {
                debug!("PING from session {}", session.id());
            }
            RelayMessage::Ready => {
                self.push_keys(session, &ctx.store);
            }
            RelayMessage::Pull { key } => {
                let reply = match ctx.store.get(key) {
                    Some(value) => pack_reply(key, value),
                    None => {
                        debug!("Session {} pulled unknown key {}", session.id(), key);
                        missing_pack_reply(key)
                    }
                };
                Self::reply(session, reply);
            }
            RelayMessage::Upload { key, value } => {
                let recipients = ctx.registry.broadcast_except(session.id(), message);
                if ctx.store.insert(key, value) {
                    info!(
                        "Stored pack {} from session {} ({} bytes, relayed to {})",
                        key,
                        session.id(),
                        value.len(),
                        recipients
                    );
                } else {
                    debug!("Pack {} already stored, relayed to {}", key, recipients);
                }
            }
            RelayMessage::Unknown => {
                debug!(
                    "Unmatched message from session {} ({} bytes)",
                    session.id(),
                    message.len()
                );
            }
        }
    }

    fn push_keys(&self, session: &SessionHandle, store: &PackStore) {
        match key_list(store.keys()) {
            Ok(payload) => Self::reply(session, payload),
            Err(e) => warn!("Failed to encode key list: {}", e),
        }
    }
}
