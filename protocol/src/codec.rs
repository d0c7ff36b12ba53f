//! 帧编解码
//!
//! 帧格式（UTF-8 文本流）:
//! ```text
//! ┌──────────────┬──────────────────────────┬──────────────┐
//! │ U+0000 start │     body (任意文本)       │  U+FFFF end  │
//! └──────────────┴──────────────────────────┴──────────────┘
//! ```
//!
//! 一次读取可能包含零个、一个或多个完整帧，也可能只包含半个帧。
//! [`FrameDecoder`] 缓存未结束的部分，直到看到结束标记。

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};
use crate::{MAX_FRAME_SIZE, READ_BUFFER_SIZE, SENTINEL_END, SENTINEL_START};

/// 将消息包装成一帧
pub fn encode_frame(body: &str) -> String {
    let mut frame =
        String::with_capacity(body.len() + SENTINEL_START.len_utf8() + SENTINEL_END.len_utf8());
    frame.push(SENTINEL_START);
    frame.push_str(body);
    frame.push(SENTINEL_END);
    frame
}

/// 增量帧解码器
///
/// 先 [`feed`](Self::feed) 收到的文本，再反复调用
/// [`next_message`](Self::next_message) 直到返回 `None`。
///
/// 每个字节只被扫描一次：已确认没有结束标记的前缀不会重复查找，
/// 已取出的帧在缓冲区耗尽时才一次性移除。
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    /// 下一帧在 `buffer` 中的起始位置
    head: usize,
    /// `buffer[..scanned]` 中已经没有未处理的结束标记
    scanned: usize,
    /// 最后一个结束标记之后的字节数
    tail: usize,
    #[cfg(test)]
    searched: usize,
}

impl FrameDecoder {
    /// 创建空解码器
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加收到的文本
    ///
    /// 最后一个结束标记之后的未完成部分超过 [`MAX_FRAME_SIZE`] 时返回错误。
    pub fn feed(&mut self, text: &str) -> Result<()> {
        #[cfg(test)]
        {
            self.searched += text.len();
        }
        self.tail = match text.rfind(SENTINEL_END) {
            Some(pos) => text.len() - pos - SENTINEL_END.len_utf8(),
            None => self.tail + text.len(),
        };
        if self.tail > MAX_FRAME_SIZE {
            let size = self.tail;
            self.reset();
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        self.buffer.push_str(text);
        Ok(())
    }

    /// 取出下一条完整消息
    ///
    /// 缓冲区里只剩半帧时返回 `Ok(None)`。片段缺少起始标记时返回
    /// [`ProtocolError::FrameFormat`]，并丢弃剩余缓冲。
    pub fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            #[cfg(test)]
            {
                self.searched += self.buffer.len() - self.scanned;
            }
            let Some(offset) = self.buffer[self.scanned..].find(SENTINEL_END) else {
                self.scanned = self.buffer.len();
                self.compact();
                return Ok(None);
            };

            let end = self.scanned + offset;
            let start = self.head;
            self.head = end + SENTINEL_END.len_utf8();
            self.scanned = self.head;

            // 长度 <= 1 的片段是噪声或心跳，跳过
            let fragment = &self.buffer[start..end];
            let mut chars = fragment.chars();
            let first = chars.next();
            if chars.next().is_none() {
                continue;
            }

            if first != Some(SENTINEL_START) {
                self.reset();
                return Err(ProtocolError::FrameFormat);
            }

            return Ok(Some(fragment[SENTINEL_START.len_utf8()..].to_string()));
        }
    }

    /// 尚未解码的字节数
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.head
    }

    /// 移除已经取出的帧，剩下的半帧只移动一次
    fn compact(&mut self) {
        if self.head > 0 {
            self.buffer.drain(..self.head);
            self.scanned -= self.head;
            self.head = 0;
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.head = 0;
        self.scanned = 0;
        self.tail = 0;
    }
}

/// 文本块读取器
///
/// 每次读取对应一次接收事件。被拆开的多字节 UTF-8 字符会留到下一次读取。
pub struct ChunkReader<R> {
    reader: R,
    buffer: Vec<u8>,
    partial: Vec<u8>,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// 创建新的读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: vec![0; READ_BUFFER_SIZE],
            partial: Vec::new(),
        }
    }

    /// 读取下一块文本
    ///
    /// 可以安全地用在 `tokio::select!` 中：取消只会发生在读取等待点上。
    pub async fn read_chunk(&mut self) -> Result<String> {
        loop {
            let n = self.reader.read(&mut self.buffer).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }

            let text = self.decode(n)?;
            if !text.is_empty() {
                return Ok(text);
            }
        }
    }

    fn decode(&mut self, n: usize) -> Result<String> {
        self.partial.extend_from_slice(&self.buffer[..n]);

        let valid = match std::str::from_utf8(&self.partial) {
            Ok(_) => self.partial.len(),
            // 末尾是不完整的字符，等下一次读取
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => return Err(ProtocolError::InvalidUtf8),
        };

        let rest = self.partial.split_off(valid);
        let bytes = std::mem::replace(&mut self.partial, rest);
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// 创建新的帧写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 编码并写入一帧消息
    pub async fn write_frame(&mut self, body: &str) -> Result<()> {
        self.write_raw(&encode_frame(body)).await
    }

    /// 原样写入文本（握手响应）
    pub async fn write_raw(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 关闭写入端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
