use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 单条记录及其版本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub value: Value,
    /// 每次覆盖写入递增
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// 进程内的作用域键值存储，值以JSON形式保存
#[derive(Debug, Default)]
pub struct Memory {
    data: HashMap<String, MemoryEntry>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(scope: &str, key: &str) -> String {
        format!("{}:{}", scope, key)
    }

    /// 存储数据，返回写入后的版本号
    pub fn store<T>(&mut self, scope: &str, key: &str, data: T) -> Result<u64>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(data)?;
        let full_key = Self::full_key(scope, key);

        let revision = self
            .data
            .get(&full_key)
            .map(|entry| entry.revision + 1)
            .unwrap_or(1);

        self.data.insert(
            full_key,
            MemoryEntry {
                value,
                revision,
                updated_at: Utc::now(),
            },
        );
        Ok(revision)
    }

    /// 读取数据，结构不匹配时返回错误而不是静默丢弃
    pub fn get<T>(&self, scope: &str, key: &str) -> Result<Option<T>>
    where
        T: for<'a> Deserialize<'a>,
    {
        match self.data.get(&Self::full_key(scope, key)) {
            Some(entry) => Ok(Some(serde_json::from_value(entry.value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn revision(&self, scope: &str, key: &str) -> Option<u64> {
        self.data
            .get(&Self::full_key(scope, key))
            .map(|entry| entry.revision)
    }

    /// 列出指定作用域的所有键
    pub fn list_keys(&self, scope: &str) -> Vec<String> {
        let prefix = format!("{}:", scope);
        let mut keys: Vec<String> = self
            .data
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_bumps_revision() {
        let mut memory = Memory::new();
        assert_eq!(memory.store("checkpoint", "t1", "draft-1").unwrap(), 1);
        assert_eq!(memory.store("checkpoint", "t1", "draft-2").unwrap(), 2);
        assert_eq!(memory.revision("checkpoint", "t1"), Some(2));

        let value: Option<String> = memory.get("checkpoint", "t1").unwrap();
        assert_eq!(value.as_deref(), Some("draft-2"));
    }

    #[test]
    fn test_scopes_are_isolated() {
        let mut memory = Memory::new();
        memory.store("a", "k", 1u32).unwrap();
        memory.store("b", "k", 2u32).unwrap();
        memory.store("a", "j", 3u32).unwrap();

        assert_eq!(memory.list_keys("a"), vec!["j".to_string(), "k".to_string()]);
        assert_eq!(memory.get::<u32>("b", "k").unwrap(), Some(2));
        assert!(memory.get::<u32>("c", "k").unwrap().is_none());
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let mut memory = Memory::new();
        memory.store("a", "k", "text").unwrap();
        assert!(memory.get::<u32>("a", "k").is_err());
    }
}
