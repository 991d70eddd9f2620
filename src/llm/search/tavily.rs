use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::WebSearch;
use crate::config::SearchConfig;
use crate::types::SearchHit;

/// Tavily检索客户端
#[derive(Clone)]
pub struct TavilySearch {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    include_raw_content: bool,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
    raw_content: Option<String>,
}

impl From<TavilyResult> for SearchHit {
    fn from(result: TavilyResult) -> Self {
        // 优先使用网页原文，没有时退回摘要
        let content = result
            .raw_content
            .filter(|c| !c.trim().is_empty())
            .or(result.content);
        SearchHit {
            url: result.url,
            title: result.title,
            content,
        }
    }
}

impl TavilySearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build search http client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/search", config.api_base_url.trim_end_matches('/')),
            include_raw_content: config.include_raw_content,
        })
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest {
                query,
                max_results,
                include_raw_content: self.include_raw_content,
            })
            .send()
            .await
            .with_context(|| format!("检索请求失败: {}", query))?
            .error_for_status()
            .with_context(|| format!("检索服务返回错误状态: {}", query))?;

        let body: TavilyResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        Ok(body
            .results
            .into_iter()
            .take(max_results)
            .map(SearchHit::from)
            .collect())
    }
}
