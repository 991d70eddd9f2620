use crate::config::{Config, LLMProvider};
use crate::error::ResearchError;
use crate::i18n::TargetLanguage;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

/// DeepResearch-RS - 由Rust与AI驱动的长篇调研报告生成引擎
#[derive(Parser, Debug)]
#[command(name = "deepresearch-rs")]
#[command(
    about = "AI-driven long-form research report generator. It plans a report structure with human feedback, researches every section with web search and reflection, and assembles a referenced Markdown report."
)]
#[command(version)]
pub struct Args {
    /// 报告主题
    #[arg(short, long)]
    pub topic: Option<String>,

    /// 简要大纲或诉求
    #[arg(long)]
    pub outline: Option<String>,

    /// 输出路径
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// 内部工作目录（检查点与日志）
    #[arg(long)]
    pub internal_path: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 会话标识，用于恢复已保存的规划会话
    #[arg(long)]
    pub thread_id: Option<String>,

    /// 对当前报告结构草稿的反馈，输入 continue 表示批准
    #[arg(long)]
    pub feedback: Option<String>,

    /// 不从终端读取反馈：保存草稿后退出，之后用 --thread-id 与 --feedback 恢复
    #[arg(long)]
    pub non_interactive: bool,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 高能效模型，用于常规推理任务
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于长上下文任务，以及作为efficient失效情况下的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 单个章节内检索的并发上限
    #[arg(long)]
    pub max_parallels: Option<usize>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// 目标语言 (zh, en, ja, ko, de, fr, ru)
    #[arg(long)]
    pub target_language: Option<String>,

    /// 检索服务 (tavily, disabled)
    #[arg(long)]
    pub search_provider: Option<String>,

    /// 检索服务 API KEY
    #[arg(long)]
    pub search_api_key: Option<String>,

    /// 每轮生成的最大查询数
    #[arg(long)]
    pub max_queries: Option<usize>,

    /// 每条查询的最大检索结果数
    #[arg(long)]
    pub search_depth: Option<usize>,

    /// 反思循环的上限
    #[arg(long)]
    pub num_reflections: Option<u32>,

    /// 结构化提取失败后的重新提示次数
    #[arg(long)]
    pub schema_retries: Option<u32>,

    /// 章节调度方式 (sequential, concurrent)
    #[arg(long)]
    pub dispatch: Option<String>,

    /// 并发调度时同时运行的最大章节数
    #[arg(long)]
    pub max_concurrent_sections: Option<usize>,

    /// 章节失败策略 (abort_run, placeholder)
    #[arg(long)]
    pub failure_policy: Option<String>,

    /// 节流策略 (none, fixed, token_bucket, adaptive)
    #[arg(long)]
    pub pacing: Option<String>,

    /// 节流基础等待时长（毫秒）
    #[arg(long)]
    pub pacing_delay_ms: Option<u64>,

    /// 单个章节的时间预算（秒）
    #[arg(long)]
    pub section_timeout_secs: Option<u64>,
}

fn parse_option<T: FromStr<Err = String>>(value: &str) -> Result<T, ResearchError> {
    value.parse::<T>().map_err(ResearchError::Configuration)
}

impl Args {
    /// 是否从终端交互式获取反馈
    pub fn interactive(&self) -> bool {
        !self.non_interactive && self.feedback.is_none()
    }

    /// 将CLI参数转换为配置，CLI参数覆盖配置文件中的设置
    pub fn into_config(self) -> Result<Config> {
        let mut config = if let Some(config_path) = &self.config {
            // 显式指定的配置文件必须可读
            Config::from_file(config_path)?
        } else {
            // 如果没有显式指定配置文件，尝试从默认位置加载
            let default_config_path = std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("deepresearch.toml");

            if default_config_path.exists() {
                Config::from_file(&default_config_path)?
            } else {
                Config::default()
            }
        };

        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        if let Some(outline) = self.outline {
            config.outline = outline;
        }
        if let Some(output_path) = self.output_path {
            config.output_path = output_path;
        }
        if let Some(internal_path) = self.internal_path {
            config.internal_path = internal_path;
        }
        if let Some(thread_id) = self.thread_id {
            config.thread_id = Some(thread_id);
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            if let Ok(provider) = provider_str.parse::<LLMProvider>() {
                config.llm.provider = provider;
            } else {
                eprintln!(
                    "⚠️ 警告: 未知的provider: {}，使用默认provider",
                    provider_str
                );
            }
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        match (self.model_efficient, self.model_powerful) {
            (Some(efficient), Some(powerful)) => {
                config.llm.model_efficient = efficient;
                config.llm.model_powerful = powerful;
            }
            // 只指定了一个模型时两者相同
            (Some(efficient), None) => {
                config.llm.model_powerful = efficient.clone();
                config.llm.model_efficient = efficient;
            }
            (None, Some(powerful)) => config.llm.model_powerful = powerful,
            (None, None) => {}
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(max_parallels) = self.max_parallels {
            config.llm.max_parallels = max_parallels;
        }

        // 目标语言配置
        if let Some(target_language_str) = self.target_language {
            if let Ok(target_language) = target_language_str.parse::<TargetLanguage>() {
                config.target_language = target_language;
            } else {
                eprintln!(
                    "⚠️ 警告: 未知的目标语言: {}，使用默认语言 (English)",
                    target_language_str
                );
            }
        }

        // 检索配置
        if let Some(provider) = self.search_provider {
            config.search.provider = parse_option(&provider)?;
        }
        if let Some(api_key) = self.search_api_key {
            config.search.api_key = api_key;
        }

        // 调研流程配置
        let research = &mut config.research;
        if let Some(max_queries) = self.max_queries {
            research.max_queries = max_queries;
        }
        if let Some(search_depth) = self.search_depth {
            research.search_depth = search_depth;
        }
        if let Some(num_reflections) = self.num_reflections {
            research.num_reflections = num_reflections;
        }
        if let Some(schema_retries) = self.schema_retries {
            research.schema_retries = schema_retries;
        }
        if let Some(dispatch) = self.dispatch {
            research.dispatch = parse_option(&dispatch)?;
        }
        if let Some(max_concurrent) = self.max_concurrent_sections {
            research.max_concurrent_sections = max_concurrent;
        }
        if let Some(policy) = self.failure_policy {
            research.failure_policy = Some(parse_option(&policy)?);
        }
        if let Some(pacing) = self.pacing {
            research.pacing.strategy = parse_option(&pacing)?;
        }
        if let Some(delay_ms) = self.pacing_delay_ms {
            research.pacing.delay_ms = delay_ms;
        }
        if let Some(timeout) = self.section_timeout_secs {
            research.section_timeout_secs = Some(timeout);
        }

        config.verbose = self.verbose;

        Ok(config)
    }
}
