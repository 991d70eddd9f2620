//! LLM客户端 - 基于rig的统一LLM服务实现

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, warn};

use crate::config::LLMConfig;
use crate::llm::{AgentExecuteParams, SchemaMismatch, StructuredExtraction, TextCompletion};

mod providers;
pub mod utils;

use providers::ProviderClient;
use utils::evaluate_befitting_model;

/// LLM客户端 - 提供统一的LLM服务接口，provider在配置阶段确定
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        println!("🔄 正在检查模型连接...");
        match self
            .prompt_with_model(
                &self.config.model_efficient,
                "System: You are a helpful assistant.",
                "Hello",
            )
            .await
        {
            Ok(_) => {
                println!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                eprintln!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑。结构不匹配不属于传输错误，直接返回
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) if err.downcast_ref::<SchemaMismatch>().is_some() => return Err(err),
                Err(err) => {
                    retries += 1;
                    warn!(
                        attempt = retries,
                        max = max_retries,
                        "❌ 调用模型服务出错，重试中: {}",
                        err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    async fn prompt_with_model(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String> {
        let agent = self.client.create_agent(model, system_prompt, &self.config);
        self.retry_with_backoff(|| async { agent.prompt(user_prompt).await })
            .await
    }

    async fn extract_with_model<T>(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let extractor = self
            .client
            .create_extractor::<T>(model, system_prompt, &self.config);
        self.retry_with_backoff(|| async { extractor.extract(user_prompt).await })
            .await
    }
}

impl TextCompletion for LLMClient {
    async fn complete(&self, params: &AgentExecuteParams) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, &params.prompt_sys, &params.prompt_user);
        debug!(stage = %params.stage, tag = %params.log_tag, model = %befitting_model, "prompt");

        match self
            .prompt_with_model(&befitting_model, &params.prompt_sys, &params.prompt_user)
            .await
        {
            Ok(text) => Ok(text),
            Err(e) => match fallover_model {
                Some(model) => {
                    warn!(
                        stage = %params.stage,
                        "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                        self.config.retry_attempts, model, e
                    );
                    self.prompt_with_model(&model, &params.prompt_sys, &params.prompt_user)
                        .await
                }
                None => Err(e),
            },
        }
    }
}

impl StructuredExtraction for LLMClient {
    async fn extract<T>(&self, params: &AgentExecuteParams) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, &params.prompt_sys, &params.prompt_user);
        debug!(stage = %params.stage, tag = %params.log_tag, model = %befitting_model, "extract");

        match self
            .extract_with_model::<T>(&befitting_model, &params.prompt_sys, &params.prompt_user)
            .await
        {
            Ok(value) => Ok(value),
            Err(e) if e.downcast_ref::<SchemaMismatch>().is_some() => Err(e),
            Err(e) => match fallover_model {
                Some(model) => {
                    warn!(
                        stage = %params.stage,
                        "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                        self.config.retry_attempts, model, e
                    );
                    self.extract_with_model::<T>(&model, &params.prompt_sys, &params.prompt_user)
                        .await
                }
                None => Err(e),
            },
        }
    }
}
