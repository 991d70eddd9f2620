use anyhow::{Context, Result};
use tracing::debug;

use crate::generator::context::ResearchContext;
use crate::llm::LanguageModel;
use crate::types::{Query, SearchHit, SearchResult, SourceRef};
use crate::utils::threads::do_parallel_with_limit;

/// 丢弃缺少URL、标题或正文的条目，返回 (正文, 来源)，两者一一对应
pub fn filter_hits(hits: Vec<SearchHit>) -> (Vec<String>, Vec<SourceRef>) {
    fn present(field: Option<String>) -> Option<String> {
        field.filter(|value| !value.trim().is_empty())
    }

    hits.into_iter()
        .filter_map(|hit| {
            let url = present(hit.url)?;
            let title = present(hit.title)?;
            let content = present(hit.content)?;
            Some((content, SourceRef { url, title }))
        })
        .unzip()
}

/// 对一组查询执行检索
pub struct SearchExecutor {
    search_depth: usize,
    max_parallels: usize,
}

impl SearchExecutor {
    pub fn new(search_depth: usize, max_parallels: usize) -> Self {
        Self {
            search_depth,
            max_parallels,
        }
    }

    /// 每条查询恰好产生一个结果，顺序与查询一致。传输错误会使整批失败
    pub async fn execute<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        queries: &[Query],
    ) -> Result<Vec<SearchResult>> {
        let futures: Vec<_> = queries
            .iter()
            .map(|query| {
                let search = context.search.clone();
                let depth = self.search_depth;
                Box::pin(async move {
                    let hits = search
                        .search(&query.text, depth)
                        .await
                        .context(format!("检索失败: {}", query.text))?;
                    let total = hits.len();
                    let (raw_content, sources) = filter_hits(hits);
                    debug!(
                        query = %query.text,
                        total,
                        kept = raw_content.len(),
                        "检索完成"
                    );
                    Ok::<_, anyhow::Error>(SearchResult {
                        query: query.clone(),
                        raw_content,
                        sources,
                    })
                })
            })
            .collect();

        do_parallel_with_limit(futures, self.max_parallels)
            .await
            .into_iter()
            .collect()
    }
}
