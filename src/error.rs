//! 错误分类：配置错误、结构化提取失败、阶段失败、取消与检查点错误

use thiserror::Error;

use crate::types::Stage;

#[derive(Debug, Error)]
pub enum ResearchError {
    /// 缺少凭据、模型或数值配置不合法，在任何步骤执行前抛出
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 模型返回的数据不符合预期结构
    #[error("[{stage}] 结构化提取失败（{target}）: {message}")]
    SchemaViolation {
        stage: Stage,
        target: String,
        message: String,
    },

    /// 某个工作单元（章节或规划步骤）的阶段失败
    #[error("[{stage}] {target} 执行失败: {source}")]
    Stage {
        stage: Stage,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// 章节被取消或超出时间预算
    #[error("章节「{section}」已中止: {reason}")]
    Cancelled { section: String, reason: String },

    /// 检查点缺失或损坏
    #[error("检查点错误: {0}")]
    Checkpoint(String),
}

impl ResearchError {
    pub fn stage(stage: Stage, target: impl Into<String>, source: anyhow::Error) -> Self {
        ResearchError::Stage {
            stage,
            target: target.into(),
            source,
        }
    }

    /// 进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            ResearchError::Configuration(_) => 2,
            ResearchError::Checkpoint(_) => 3,
            ResearchError::SchemaViolation { stage, .. } | ResearchError::Stage { stage, .. } => {
                match stage {
                    Stage::ReportPlanner | Stage::SectionFormatter => 3,
                    _ => 4,
                }
            }
            ResearchError::Cancelled { .. } => 4,
        }
    }
}

/// 从 anyhow 错误链中推导退出码，非 ResearchError 的错误统一视为运行失败
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ResearchError>())
        .map(ResearchError::exit_code)
        .unwrap_or(1)
}
