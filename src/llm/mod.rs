//! 模型与检索能力接口。工作流只依赖这里的trait，provider在配置阶段选择

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

use crate::types::Stage;

pub mod client;
pub mod search;

/// 一次模型调用的参数
#[derive(Debug, Clone)]
pub struct AgentExecuteParams {
    pub prompt_sys: String,
    pub prompt_user: String,
    /// 发起调用的阶段
    pub stage: Stage,
    /// 日志标记，通常是章节名或主题
    pub log_tag: String,
}

impl AgentExecuteParams {
    pub fn new(stage: Stage, log_tag: &str, prompt_sys: String, prompt_user: String) -> Self {
        Self {
            prompt_sys,
            prompt_user,
            stage,
            log_tag: log_tag.to_string(),
        }
    }
}

/// 模型返回的数据不符合目标结构
#[derive(Debug, Error)]
#[error("返回数据不符合目标结构: {0}")]
pub struct SchemaMismatch(pub String);

/// 文本生成能力
pub trait TextCompletion: Send + Sync {
    fn complete(&self, params: &AgentExecuteParams)
    -> impl Future<Output = Result<String>> + Send;
}

/// 结构化提取能力，结构不匹配时返回 [`SchemaMismatch`]
pub trait StructuredExtraction: Send + Sync {
    fn extract<T>(&self, params: &AgentExecuteParams) -> impl Future<Output = Result<T>> + Send
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static;
}

/// 同时具备文本生成与结构化提取的模型
pub trait LanguageModel: TextCompletion + StructuredExtraction {}

impl<M: TextCompletion + StructuredExtraction> LanguageModel for M {}

/// 判断错误是否来自后端限流
pub fn is_throttling_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let message = cause.to_string().to_lowercase();
        message.contains("429")
            || message.contains("rate limit")
            || message.contains("too many requests")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_throttling_error() {
        assert!(is_throttling_error(&anyhow::anyhow!("HTTP 429 Too Many Requests")));
        assert!(is_throttling_error(
            &anyhow::anyhow!("Rate limit reached for gpt-4o-mini").context("章节失败")
        ));
        assert!(!is_throttling_error(&anyhow::anyhow!("connection reset")));
    }
}
