//! 协议常量定义

use std::time::Duration;

/// 帧起始标记 (U+0000)
pub const SENTINEL_START: char = '\u{0000}';

/// 帧结束标记 (U+FFFF)
pub const SENTINEL_END: char = '\u{FFFF}';

/// Pack key 长度（字符数）
pub const PACK_KEY_LEN: usize = 64;

/// 拉取不存在的 key 时回复的值
pub const PULL_MISS_VALUE: &str = "null";

/// 未结束帧的最大缓冲大小（字节）
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// 单次读取缓冲区大小
pub const READ_BUFFER_SIZE: usize = 8192;

/// 默认监听端口
pub const DEFAULT_PORT: u16 = 8000;

/// 服务端最大连接数
pub const MAX_CONNECTIONS: usize = 100;

/// 空闲超时（秒）- 超过此时间未收到数据则断开
pub const IDLE_TIMEOUT_SECS: u64 = 240;

/// key 列表推送间隔（秒）
pub const KEY_PUSH_INTERVAL_SECS: u64 = 5;

/// 空闲超时 Duration
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(IDLE_TIMEOUT_SECS);

/// key 列表推送间隔 Duration
pub const KEY_PUSH_INTERVAL: Duration = Duration::from_secs(KEY_PUSH_INTERVAL_SECS);
