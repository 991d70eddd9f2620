use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ResearchError;
use crate::i18n::TargetLanguage;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl LLMProvider {
    /// 是否需要API KEY
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LLMProvider::Ollama)
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 检索服务类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum SearchProvider {
    #[serde(rename = "tavily")]
    #[default]
    Tavily,
    /// 不访问外部检索，所有查询都得到空结果
    #[serde(rename = "disabled")]
    Disabled,
}

impl std::str::FromStr for SearchProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tavily" => Ok(SearchProvider::Tavily),
            "disabled" | "none" => Ok(SearchProvider::Disabled),
            _ => Err(format!("Unknown search provider: {}", s)),
        }
    }
}

/// 章节调度方式
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
pub enum DispatchMode {
    /// 一次只运行一个章节，章节之间按节流策略等待
    #[serde(rename = "sequential")]
    #[default]
    Sequential,
    /// 最多同时运行 max_concurrent_sections 个章节
    #[serde(rename = "concurrent")]
    Concurrent,
}

impl std::str::FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "queue" => Ok(DispatchMode::Sequential),
            "concurrent" | "parallel" => Ok(DispatchMode::Concurrent),
            _ => Err(format!("Unknown dispatch mode: {}", s)),
        }
    }
}

/// 单个章节失败时的处理策略
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub enum SectionFailurePolicy {
    /// 终止整个运行
    #[serde(rename = "abort_run")]
    AbortRun,
    /// 以占位内容继续，最终报告照常生成
    #[serde(rename = "placeholder")]
    Placeholder,
}

impl std::str::FromStr for SectionFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort_run" | "abort" => Ok(SectionFailurePolicy::AbortRun),
            "placeholder" => Ok(SectionFailurePolicy::Placeholder),
            _ => Err(format!("Unknown failure policy: {}", s)),
        }
    }
}

/// 节流策略类型
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
pub enum PacingKind {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "fixed")]
    #[default]
    Fixed,
    #[serde(rename = "token_bucket")]
    TokenBucket,
    #[serde(rename = "adaptive")]
    Adaptive,
}

impl std::str::FromStr for PacingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(PacingKind::None),
            "fixed" => Ok(PacingKind::Fixed),
            "token_bucket" | "token-bucket" => Ok(PacingKind::TokenBucket),
            "adaptive" => Ok(PacingKind::Adaptive),
            _ => Err(format!("Unknown pacing strategy: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 报告主题
    pub topic: String,

    /// 用户提供的简要大纲或诉求
    pub outline: String,

    /// 报告输出目录
    pub output_path: PathBuf,

    /// 内部工作目录路径 (.deepresearch)，存放检查点与日志
    pub internal_path: PathBuf,

    /// 会话标识，用于检查点的保存与恢复
    pub thread_id: Option<String>,

    /// 目标语言
    pub target_language: TargetLanguage,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 检索配置
    pub search: SearchConfig,

    /// 调研流程配置
    pub research: ResearchConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，用于常规推理任务
    pub model_efficient: String,

    /// 高质量模型，用于长上下文任务，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,

    /// 单个章节内并发执行检索的上限
    pub max_parallels: usize,
}

/// 检索配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProvider,

    /// 检索服务 API KEY
    pub api_key: String,

    /// 检索服务基地址
    pub api_base_url: String,

    /// 是否请求网页原文
    pub include_raw_content: bool,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 调研流程配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ResearchConfig {
    /// 每轮生成的最大查询数
    pub max_queries: usize,

    /// 每条查询的最大检索结果数
    pub search_depth: usize,

    /// 反思循环的上限
    pub num_reflections: u32,

    /// 章节调度方式
    pub dispatch: DispatchMode,

    /// 并发调度时同时运行的最大章节数
    pub max_concurrent_sections: usize,

    /// 结构化提取失败后的重新提示次数
    pub schema_retries: u32,

    /// 单个章节的时间预算（秒），为空则不限
    pub section_timeout_secs: Option<u64>,

    /// 章节失败策略，为空时按调度方式推导
    pub failure_policy: Option<SectionFailurePolicy>,

    /// 顺序调度时的节流配置
    pub pacing: PacingConfig,
}

/// 节流配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PacingConfig {
    pub strategy: PacingKind,

    /// 基础等待时长（毫秒）；令牌桶中为补充一个令牌的间隔
    pub delay_ms: u64,

    /// 令牌桶容量
    pub burst: u32,

    /// 自适应退避的最大等待时长（毫秒）
    pub max_delay_ms: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 在任何流程步骤执行之前校验配置
    pub fn validate(&self) -> Result<(), ResearchError> {
        // 恢复已有会话时主题取自检查点
        let resuming = self.thread_id.as_deref().is_some_and(|id| !id.trim().is_empty());
        if self.topic.trim().is_empty() && !resuming {
            return Err(ResearchError::Configuration("未指定报告主题 (topic)".into()));
        }
        if self.llm.model_efficient.trim().is_empty() || self.llm.model_powerful.trim().is_empty()
        {
            return Err(ResearchError::Configuration("未指定模型 (model)".into()));
        }
        if self.llm.provider.requires_api_key() && self.llm.api_key.trim().is_empty() {
            return Err(ResearchError::Configuration(format!(
                "provider {} 缺少 API KEY，请设置 DEEPRESEARCH_LLM_API_KEY 或 --llm-api-key",
                self.llm.provider
            )));
        }
        if self.search.provider == SearchProvider::Tavily && self.search.api_key.trim().is_empty()
        {
            return Err(ResearchError::Configuration(
                "检索服务缺少 API KEY，请设置 TAVILY_API_KEY 或 --search-api-key".into(),
            ));
        }

        let research = &self.research;
        if research.max_queries == 0 {
            return Err(ResearchError::Configuration("max_queries 必须大于 0".into()));
        }
        if research.search_depth == 0 {
            return Err(ResearchError::Configuration("search_depth 必须大于 0".into()));
        }
        if research.dispatch == DispatchMode::Concurrent && research.max_concurrent_sections == 0
        {
            return Err(ResearchError::Configuration(
                "max_concurrent_sections 必须大于 0".into(),
            ));
        }
        if research.pacing.strategy == PacingKind::TokenBucket && research.pacing.burst == 0 {
            return Err(ResearchError::Configuration("令牌桶容量 burst 必须大于 0".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ResearchError::Configuration(format!(
                "temperature 超出范围: {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }

    /// 获取会话标识，未配置时生成新的UUID
    pub fn get_thread_id(&self) -> String {
        match &self.thread_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 根据主题推导最终报告的输出路径
    pub fn report_path(&self) -> PathBuf {
        self.output_path
            .join(format!("{}.md", crate::utils::text::slugify(&self.topic)))
    }

    /// 检查点目录
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.internal_path.join("checkpoints")
    }
}

impl ResearchConfig {
    /// 实际生效的章节失败策略：顺序调度默认中止运行，并发调度默认隔离失败
    pub fn effective_failure_policy(&self) -> SectionFailurePolicy {
        self.failure_policy.unwrap_or(match self.dispatch {
            DispatchMode::Sequential => SectionFailurePolicy::AbortRun,
            DispatchMode::Concurrent => SectionFailurePolicy::Placeholder,
        })
    }

    pub fn section_timeout(&self) -> Option<Duration> {
        self.section_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic: String::new(),
            outline: String::new(),
            output_path: PathBuf::from("./reports"),
            internal_path: PathBuf::from("./.deepresearch"),
            thread_id: None,
            target_language: TargetLanguage::default(),
            llm: LLMConfig::default(),
            search: SearchConfig::default(),
            research: ResearchConfig::default(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("DEEPRESEARCH_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.openai.com/v1"),
            model_efficient: String::from("gpt-4o-mini"),
            model_powerful: String::from("gpt-4o"),
            max_tokens: 16384,
            temperature: 0.3,
            retry_attempts: 3,
            retry_delay_ms: 5000,
            timeout_seconds: 300,
            max_parallels: 3,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::default(),
            api_key: std::env::var("TAVILY_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.tavily.com"),
            include_raw_content: true,
            timeout_seconds: 60,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_queries: 2,
            search_depth: 2,
            num_reflections: 2,
            dispatch: DispatchMode::default(),
            max_concurrent_sections: 2,
            schema_retries: 1,
            section_timeout_secs: None,
            failure_policy: None,
            pacing: PacingConfig::default(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            strategy: PacingKind::default(),
            delay_ms: 30_000,
            burst: 1,
            max_delay_ms: 120_000,
        }
    }
}
