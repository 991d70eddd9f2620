use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ResearchError;
use crate::generator::context::ResearchContext;
use crate::llm::{LanguageModel, SchemaMismatch};

pub use crate::llm::AgentExecuteParams;

/// 文本生成，失败时标注阶段与目标
pub async fn prompt<L: LanguageModel>(
    context: &ResearchContext<L>,
    params: AgentExecuteParams,
) -> Result<String> {
    debug!(stage = %params.stage, target = %params.log_tag, "prompt");
    context
        .llm
        .complete(&params)
        .await
        .map_err(|e| ResearchError::stage(params.stage, &params.log_tag, e).into())
}

/// 结构化提取。结构不匹配时附带错误信息重新提示，
/// 超过 `schema_retries` 次后返回 [`ResearchError::SchemaViolation`]
pub async fn extract<L, T>(context: &ResearchContext<L>, params: AgentExecuteParams) -> Result<T>
where
    L: LanguageModel,
    T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
{
    extract_with_retries(context, params, context.config.research.schema_retries).await
}

pub async fn extract_with_retries<L, T>(
    context: &ResearchContext<L>,
    params: AgentExecuteParams,
    max_retries: u32,
) -> Result<T>
where
    L: LanguageModel,
    T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
{
    let mut attempt_params = params.clone();
    let mut attempt = 0;

    loop {
        debug!(stage = %params.stage, target = %params.log_tag, attempt, "extract");
        let err = match context.llm.extract::<T>(&attempt_params).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let mismatch = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<SchemaMismatch>())
            .map(|m| m.0.clone());

        match mismatch {
            Some(message) if attempt < max_retries => {
                attempt += 1;
                warn!(
                    stage = %params.stage,
                    target = %params.log_tag,
                    attempt,
                    error = %message,
                    "返回结构不符合要求，重新提示"
                );
                attempt_params.prompt_user = format!(
                    "{}\n\nYour previous answer could not be parsed: {}\nAnswer again and follow the required structure exactly.",
                    params.prompt_user, message
                );
            }
            Some(message) => {
                return Err(ResearchError::SchemaViolation {
                    stage: params.stage,
                    target: params.log_tag.clone(),
                    message,
                }
                .into());
            }
            None => return Err(ResearchError::stage(params.stage, &params.log_tag, err).into()),
        }
    }
}
