//! Pack 中继共享协议库
//!
//! 包含:
//! - 握手协商 (handshake)
//! - 帧编解码 (Codec)
//! - 中继消息分类 (RelayMessage)
//! - 传输层抽象 (Transport trait)
//! - 连接封装 (Connection)

mod codec;
mod connection;
mod constants;
mod error;
mod handshake;
mod message;
mod transport;

pub use codec::{encode_frame, ChunkReader, FrameDecoder, FrameWriter};
pub use connection::Connection;
pub use constants::*;
pub use error::{ProtocolError, Result};
pub use handshake::{negotiate, Accepted, HandshakeRequest, ResourceResolver};
pub use message::{key_list, missing_pack_reply, pack_reply, RelayMessage};
pub use transport::{TcpListener, TcpTransport, Transport, TransportConfig, TransportListener};
