use serde::{Deserialize, Serialize};

use crate::types::section::Query;

/// 检索后端返回的单条结果，任何字段都可能缺失
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl SearchHit {
    pub fn new(url: &str, title: &str, content: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            title: Some(title.to_string()),
            content: Some(content.to_string()),
        }
    }
}

/// 引用来源
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
}

/// 一条查询的检索结果。`raw_content` 为空表示执行过但没有可用内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: Query,
    pub raw_content: Vec<String>,
    /// 与 `raw_content` 一一对应
    pub sources: Vec<SourceRef>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.raw_content.is_empty()
    }
}
