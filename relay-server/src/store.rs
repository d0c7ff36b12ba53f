//! Pack 存储
//!
//! 只增不删的内存 key/value 表，同一个 key 先写入者生效。

use std::collections::HashMap;

/// 内存中的 pack 表
#[derive(Debug, Default)]
pub struct PackStore {
    /// 按发现顺序排列的 key，用于 key 列表推送
    keys: Vec<String>,
    packs: HashMap<String, String>,
}

impl PackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入 pack，key 已存在时不覆盖
    ///
    /// 返回是否为新 key
    pub fn insert(&mut self, key: &str, value: &str) -> bool {
        if self.contains(key) {
            return false;
        }
        self.packs.insert(key.to_string(), value.to_string());
        self.keys.push(key.to_string());
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.packs.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.packs.contains_key(key)
    }

    /// 全部 key（发现顺序）
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
