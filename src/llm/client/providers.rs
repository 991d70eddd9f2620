//! LLM Provider支持模块

use anyhow::Result;
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::Prompt,
    extractor::{ExtractionError, Extractor},
    providers::gemini::completion::gemini_api_types::{AdditionalParameters, GenerationConfig},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{LLMConfig, LLMProvider};
use crate::llm::SchemaMismatch;

/// 按变体分组生成同名变体之间的映射，组内各变体共用同一段构建代码
macro_rules! map_provider {
    ($value:expr, $from:ident => $to:ident; $([$($variant:ident),+] |$inner:ident| $body:expr;)+) => {
        match $value {
            $($($from::$variant($inner) => $to::$variant($body),)+)+
        }
    };
}

/// 对每个provider变体执行同一段代码
macro_rules! each_provider {
    ($value:expr, $enum:ident, |$inner:ident| $body:expr) => {
        match $value {
            $enum::OpenAI($inner) => $body,
            $enum::Moonshot($inner) => $body,
            $enum::DeepSeek($inner) => $body,
            $enum::Mistral($inner) => $body,
            $enum::OpenRouter($inner) => $body,
            $enum::Anthropic($inner) => $body,
            $enum::Gemini($inner) => $body,
            $enum::Ollama($inner) => $body,
        }
    };
}

/// 统一的Provider客户端枚举
#[derive(Clone)]
pub enum ProviderClient {
    OpenAI(rig::providers::openai::Client),
    Moonshot(rig::providers::moonshot::Client),
    DeepSeek(rig::providers::deepseek::Client),
    Mistral(rig::providers::mistral::Client),
    OpenRouter(rig::providers::openrouter::Client),
    Anthropic(rig::providers::anthropic::Client),
    Gemini(rig::providers::gemini::Client),
    Ollama(rig::providers::ollama::Client),
}

impl ProviderClient {
    /// 根据配置创建相应的provider客户端
    pub fn new(config: &LLMConfig) -> Result<Self> {
        match config.provider {
            LLMProvider::OpenAI => {
                let client = rig::providers::openai::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build();
                Ok(ProviderClient::OpenAI(client))
            }
            LLMProvider::Moonshot => {
                let client = rig::providers::moonshot::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build();
                Ok(ProviderClient::Moonshot(client))
            }
            LLMProvider::DeepSeek => {
                let client = rig::providers::deepseek::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build();
                Ok(ProviderClient::DeepSeek(client))
            }
            LLMProvider::Mistral => {
                let client = rig::providers::mistral::Client::builder(&config.api_key).build();
                Ok(ProviderClient::Mistral(client))
            }
            LLMProvider::OpenRouter => {
                // reference： https://docs.rig.rs/docs/integrations/model_providers/anthropic#basic-usage
                let client = rig::providers::openrouter::Client::builder(&config.api_key).build();
                Ok(ProviderClient::OpenRouter(client))
            }
            LLMProvider::Anthropic => {
                let client =
                    rig::providers::anthropic::ClientBuilder::new(&config.api_key).build()?;
                Ok(ProviderClient::Anthropic(client))
            }
            LLMProvider::Gemini => {
                let client = rig::providers::gemini::Client::builder(&config.api_key).build()?;
                Ok(ProviderClient::Gemini(client))
            }
            LLMProvider::Ollama => {
                let client = rig::providers::ollama::Client::builder().build();
                Ok(ProviderClient::Ollama(client))
            }
        }
    }

    /// 创建Agent
    pub fn create_agent(
        &self,
        model: &str,
        system_prompt: &str,
        config: &LLMConfig,
    ) -> ProviderAgent {
        map_provider!(self, ProviderClient => ProviderAgent;
            [OpenAI] |client| client
                .completion_model(model)
                .completions_api()
                .into_agent_builder()
                .preamble(system_prompt)
                .max_tokens(config.max_tokens.into())
                .temperature(config.temperature)
                .build();
            [Moonshot, DeepSeek, Mistral, OpenRouter] |client| client
                .agent(model)
                .preamble(system_prompt)
                .temperature(config.temperature)
                .build();
            [Anthropic, Ollama] |client| client
                .agent(model)
                .preamble(system_prompt)
                .max_tokens(config.max_tokens.into())
                .temperature(config.temperature)
                .build();
            [Gemini] |client| client
                .agent(model)
                .preamble(system_prompt)
                .max_tokens(config.max_tokens.into())
                .temperature(config.temperature)
                .additional_params(gemini_params())
                .build();
        )
    }

    /// 创建Extractor
    pub fn create_extractor<T>(
        &self,
        model: &str,
        system_prompt: &str,
        config: &LLMConfig,
    ) -> ProviderExtractor<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        map_provider!(self, ProviderClient => ProviderExtractor;
            [OpenAI] |client| client
                .extractor_completions_api::<T>(model)
                .preamble(system_prompt)
                .max_tokens(config.max_tokens.into())
                .build();
            [Moonshot, DeepSeek, Mistral, OpenRouter, Anthropic, Ollama] |client| client
                .extractor::<T>(model)
                .preamble(system_prompt)
                .max_tokens(config.max_tokens.into())
                .build();
            [Gemini] |client| client
                .extractor::<T>(model)
                .preamble(system_prompt)
                .max_tokens(config.max_tokens.into())
                .additional_params(gemini_params())
                .build();
        )
    }
}

fn gemini_params() -> serde_json::Value {
    let cfg = AdditionalParameters::default().with_config(GenerationConfig::default());
    serde_json::to_value(cfg).unwrap_or_default()
}

/// 统一的Agent枚举
pub enum ProviderAgent {
    OpenAI(Agent<rig::providers::openai::CompletionModel>),
    Mistral(Agent<rig::providers::mistral::CompletionModel>),
    OpenRouter(Agent<rig::providers::openrouter::CompletionModel>),
    Anthropic(Agent<rig::providers::anthropic::completion::CompletionModel>),
    Gemini(Agent<rig::providers::gemini::completion::CompletionModel>),
    Moonshot(Agent<rig::providers::moonshot::CompletionModel>),
    DeepSeek(Agent<rig::providers::deepseek::CompletionModel>),
    Ollama(Agent<rig::providers::ollama::CompletionModel<reqwest::Client>>),
}

impl ProviderAgent {
    /// 执行prompt
    pub async fn prompt(&self, prompt: &str) -> Result<String> {
        each_provider!(self, ProviderAgent, |agent| Ok(agent.prompt(prompt).await?))
    }
}

/// 统一的Extractor枚举
pub enum ProviderExtractor<T>
where
    T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
{
    OpenAI(Extractor<rig::providers::openai::CompletionModel, T>),
    Mistral(Extractor<rig::providers::mistral::CompletionModel, T>),
    OpenRouter(Extractor<rig::providers::openrouter::CompletionModel, T>),
    Anthropic(Extractor<rig::providers::anthropic::completion::CompletionModel, T>),
    Gemini(Extractor<rig::providers::gemini::completion::CompletionModel, T>),
    Moonshot(Extractor<rig::providers::moonshot::CompletionModel, T>),
    DeepSeek(Extractor<rig::providers::deepseek::CompletionModel, T>),
    Ollama(Extractor<rig::providers::ollama::CompletionModel<reqwest::Client>, T>),
}

impl<T> ProviderExtractor<T>
where
    T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
{
    /// 执行提取，数据不符合目标结构时返回 [`SchemaMismatch`]
    pub async fn extract(&self, prompt: &str) -> Result<T> {
        let result = each_provider!(self, ProviderExtractor, |extractor| {
            extractor.extract(prompt).await
        });

        result.map_err(|e| match e {
            ExtractionError::NoData => SchemaMismatch("模型未返回结构化数据".to_string()).into(),
            ExtractionError::DeserializationError(de) => SchemaMismatch(de.to_string()).into(),
            other => anyhow::Error::from(other),
        })
    }
}
