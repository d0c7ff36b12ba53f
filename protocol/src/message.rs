//! 中继消息定义
//!
//! 帧解码后的消息按形状分类:
//! - `PING`: 心跳
//! - `READY`: 请求全部 key 列表
//! - `<64 字符 key>`: 拉取一个 pack
//! - `<64 字符 key>:<JSON 数组或对象>`: 上传一个 pack

use crate::error::Result;
use crate::{PACK_KEY_LEN, PULL_MISS_VALUE};

/// 客户端发来的中继消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMessage<'a> {
    /// 心跳，无需回复
    Ping,
    /// 请求全部 key 列表
    Ready,
    /// 按 key 拉取 pack
    Pull { key: &'a str },
    /// 上传 pack，value 不解析
    Upload { key: &'a str, value: &'a str },
    /// 无法识别的消息
    Unknown,
}

impl<'a> RelayMessage<'a> {
    /// 根据消息形状分类
    pub fn classify(raw: &'a str) -> Self {
        match raw {
            "PING" => return RelayMessage::Ping,
            "READY" => return RelayMessage::Ready,
            _ => {}
        }

        let Some((key, rest)) = split_key(raw) else {
            return RelayMessage::Unknown;
        };

        if rest.is_empty() {
            return RelayMessage::Pull { key };
        }
        if rest.starts_with(":[") || rest.starts_with(":{") {
            return RelayMessage::Upload {
                key,
                value: &rest[1..],
            };
        }
        RelayMessage::Unknown
    }
}

/// 在第 64 个字符处切分，不足 64 个字符时返回 `None`
fn split_key(raw: &str) -> Option<(&str, &str)> {
    let end = match raw.char_indices().nth(PACK_KEY_LEN) {
        Some((idx, _)) => idx,
        None if raw.chars().count() == PACK_KEY_LEN => raw.len(),
        None => return None,
    };
    Some(raw.split_at(end))
}

/// 拉取命中时的回复: `<key>:<value>`
pub fn pack_reply(key: &str, value: &str) -> String {
    format!("{key}:{value}")
}

/// 拉取未命中时的回复: `<key>:null`
pub fn missing_pack_reply(key: &str) -> String {
    pack_reply(key, PULL_MISS_VALUE)
}

/// 全部 key 的 JSON 数组
pub fn key_list<S: AsRef<str>>(keys: &[S]) -> Result<String> {
    let keys: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
    Ok(serde_json::to_string(&keys)?)
}
