use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 工作流阶段，用于日志、错误定位以及模型调用标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ReportPlanner,
    SectionFormatter,
    KnowledgeSeed,
    QueryGenerator,
    SearchExecutor,
    ResultAccumulator,
    ReflectionGate,
    FinalSectionFormatter,
    FinalAssembler,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ReportPlanner => "report_planner",
            Stage::SectionFormatter => "section_formatter",
            Stage::KnowledgeSeed => "knowledge_seed",
            Stage::QueryGenerator => "query_generator",
            Stage::SearchExecutor => "search_executor",
            Stage::ResultAccumulator => "result_accumulator",
            Stage::ReflectionGate => "reflection_gate",
            Stage::FinalSectionFormatter => "final_section_formatter",
            Stage::FinalAssembler => "final_assembler",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
