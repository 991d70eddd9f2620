//! 外部检索能力

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{SearchConfig, SearchProvider};
use crate::types::SearchHit;

mod tavily;

pub use tavily::TavilySearch;

/// 检索服务接口
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// 返回最多 `max_results` 条结果，条目字段可能缺失
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// 不访问外部服务，所有查询都返回空结果
#[derive(Debug, Default, Clone)]
pub struct DisabledSearch;

#[async_trait]
impl WebSearch for DisabledSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// 按配置创建检索服务
pub fn build_search(config: &SearchConfig) -> Result<Arc<dyn WebSearch>> {
    match config.provider {
        SearchProvider::Tavily => Ok(Arc::new(TavilySearch::new(config)?)),
        SearchProvider::Disabled => Ok(Arc::new(DisabledSearch)),
    }
}
