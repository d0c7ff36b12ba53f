//! 连接封装
//!
//! 把传输层的读写两端分别包装成 [`ChunkReader`] 和 [`FrameWriter`]。

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{ChunkReader, FrameWriter};
use crate::transport::Transport;

/// 连接封装
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: ChunkReader<R>,
    writer: FrameWriter<W>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T) -> Self {
        let (reader, writer) = transport.split();
        Self::from_parts(reader, writer)
    }

    /// 从读写端直接创建连接
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader: ChunkReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// 分离为读取端和写入端
    ///
    /// 会话的 I/O 任务需要同时等待读取和待发送消息
    pub fn split(self) -> (ChunkReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}
