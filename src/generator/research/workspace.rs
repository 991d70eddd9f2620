use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{Query, SearchResult, SourceRef};

/// 单个章节在调研循环中的工作记忆，只属于一个工作流实例
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionWorkspace {
    /// 模型已有知识，只写入一次
    pub knowledge: String,
    /// 本轮生成的查询，每轮整体替换
    pub generated_queries: Vec<Query>,
    /// 所有生成过的查询，只增不减，允许重复
    pub searched_queries_history: Vec<Query>,
    /// 所有检索结果，只增不减
    pub search_results_history: Vec<SearchResult>,
    /// 累积草稿，每轮整体替换
    pub accumulated_content: String,
    /// 最近一次反思给出的修改意见，首轮为空
    pub reflection_feedback: String,
    pub reflection_iteration_count: u32,
}

impl SectionWorkspace {
    pub fn record_queries(&mut self, queries: Vec<Query>) {
        self.searched_queries_history.extend(queries.iter().cloned());
        self.generated_queries = queries;
    }

    pub fn record_results(&mut self, results: Vec<SearchResult>) {
        self.search_results_history.extend(results);
    }

    /// 按URL去重的引用来源，保持首次出现顺序
    pub fn sources(&self) -> Vec<SourceRef> {
        let mut seen = HashSet::new();
        self.search_results_history
            .iter()
            .flat_map(|result| result.sources.iter())
            .filter(|source| seen.insert(source.url.clone()))
            .cloned()
            .collect()
    }
}
