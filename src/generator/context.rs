use std::sync::Arc;

use crate::config::Config;
use crate::generator::outlet::{ResultSink, SinkGuard};
use crate::llm::search::WebSearch;
use crate::llm::{AgentExecuteParams, LanguageModel};
use crate::types::Stage;

/// 一次调研运行共享的上下文：模型、检索、结果输出与配置
pub struct ResearchContext<L: LanguageModel> {
    /// 模型调用器
    pub llm: L,
    /// 检索服务
    pub search: Arc<dyn WebSearch>,
    /// 结果输出，失败只记录不中断
    pub sink: SinkGuard,
    /// 配置
    pub config: Config,
}

impl<L: LanguageModel> ResearchContext<L> {
    pub fn new(llm: L, search: Arc<dyn WebSearch>, sink: Arc<dyn ResultSink>, config: Config) -> Self {
        Self {
            llm,
            search,
            sink: SinkGuard::new(sink),
            config,
        }
    }

    /// 构造调用参数，系统提示词末尾追加目标语言要求
    pub fn params(
        &self,
        stage: Stage,
        log_tag: &str,
        prompt_sys: &str,
        prompt_user: String,
    ) -> AgentExecuteParams {
        let prompt_sys = format!(
            "{}\n\n{}",
            prompt_sys.trim_end(),
            self.config.target_language.prompt_instruction()
        );
        AgentExecuteParams::new(stage, log_tag, prompt_sys, prompt_user)
    }
}
