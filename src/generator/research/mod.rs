//! 单个章节的调研循环：
//! 知识准备 → 查询生成 → 检索 → 结果累积 → 反思，未通过时带着反馈回到查询生成，
//! 通过（或达到反思上限）后生成终稿

use anyhow::Result;
use tracing::{info, warn};

use crate::error::ResearchError;
use crate::generator::agent_executor::{extract, prompt};
use crate::generator::context::ResearchContext;
use crate::generator::outlet::WorkflowEvent;
use crate::generator::scheduler::CancelToken;
use crate::llm::LanguageModel;
use crate::types::{
    FinalSectionContent, Feedback, Queries, Query, ReflectionVerdict, SearchResult, Section, Stage,
};
use crate::utils::text::truncate_chars;

pub mod reflection;
pub mod search_executor;
pub mod workspace;

pub use reflection::{LoopDecision, decide};
pub use search_executor::{SearchExecutor, filter_hits};
pub use workspace::SectionWorkspace;

/// 单条检索正文写入提示词时的最大字符数
const MAX_BLOCK_CHARS: usize = 4000;

/// 一个章节的调研产出
#[derive(Debug, Clone)]
pub struct SectionRun {
    pub content: FinalSectionContent,
    pub workspace: SectionWorkspace,
}

/// 章节调研工作流，每次 `run` 使用独立的工作记忆
#[derive(Default)]
pub struct ResearchWorkflow;

impl ResearchWorkflow {
    pub async fn run<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        index: usize,
        section: &Section,
        cancel: &CancelToken,
    ) -> Result<SectionRun> {
        let research = &context.config.research;
        let mut workspace = SectionWorkspace::default();
        println!("🔍 [{}] 开始调研章节: {}", index + 1, section.name);

        ensure_active(cancel, section)?;
        workspace.knowledge = self.seed_knowledge(context, section).await?;
        self.stage_done(context, index, section, Stage::KnowledgeSeed, &workspace)
            .await;

        loop {
            ensure_active(cancel, section)?;
            let queries = self.generate_queries(context, section, &workspace).await?;
            workspace.record_queries(queries);
            self.stage_done(context, index, section, Stage::QueryGenerator, &workspace)
                .await;

            ensure_active(cancel, section)?;
            let results = SearchExecutor::new(research.search_depth, context.config.llm.max_parallels)
                .execute(context, &workspace.generated_queries)
                .await
                .map_err(|e| ResearchError::stage(Stage::SearchExecutor, &section.name, e))?;
            workspace.record_results(results);
            self.stage_done(context, index, section, Stage::SearchExecutor, &workspace)
                .await;

            ensure_active(cancel, section)?;
            workspace.accumulated_content = self.accumulate(context, section, &workspace).await?;
            self.stage_done(context, index, section, Stage::ResultAccumulator, &workspace)
                .await;

            ensure_active(cancel, section)?;
            let verdict = self.reflect(context, section, &workspace).await?;
            let decision = decide(
                &verdict,
                workspace.reflection_iteration_count,
                research.num_reflections,
            );

            context
                .sink
                .event(WorkflowEvent::ReflectionVerdict {
                    index,
                    section: section.name.clone(),
                    iteration: workspace.reflection_iteration_count,
                    accepted: verdict.is_accept(),
                    forced: decision == LoopDecision::Accept { forced: true },
                })
                .await;

            match decision {
                LoopDecision::Accept { forced } => {
                    if forced {
                        warn!(
                            section = %section.name,
                            index,
                            iteration = workspace.reflection_iteration_count,
                            "已达到反思上限，按当前内容定稿"
                        );
                    }
                    break;
                }
                LoopDecision::Continue { feedback } => {
                    workspace.reflection_iteration_count += 1;
                    info!(
                        section = %section.name,
                        index,
                        iteration = workspace.reflection_iteration_count,
                        feedback = %feedback,
                        "内容不足，继续调研"
                    );
                    workspace.reflection_feedback = feedback;
                }
            }
        }

        ensure_active(cancel, section)?;
        let text = self.format_final(context, section, &workspace).await?;
        self.stage_done(context, index, section, Stage::FinalSectionFormatter, &workspace)
            .await;
        println!("✅ [{}] 章节完成: {}", index + 1, section.name);

        Ok(SectionRun {
            content: FinalSectionContent {
                section_index: index,
                section_name: section.name.clone(),
                text,
                placeholder: false,
            },
            workspace,
        })
    }

    async fn seed_knowledge<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        section: &Section,
    ) -> Result<String> {
        let params = context.params(
            Stage::KnowledgeSeed,
            &section.name,
            include_str!("prompts/knowledge_seed_sys.tpl"),
            format!(
                include_str!("prompts/knowledge_seed_user.tpl"),
                context.config.topic,
                section.describe()
            ),
        );
        prompt(context, params).await
    }

    async fn generate_queries<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        section: &Section,
        workspace: &SectionWorkspace,
    ) -> Result<Vec<Query>> {
        let max_queries = context.config.research.max_queries;
        let history = if workspace.searched_queries_history.is_empty() {
            "(none)".to_string()
        } else {
            workspace
                .searched_queries_history
                .iter()
                .map(|q| format!("- {}", q.text))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let feedback = if workspace.reflection_feedback.is_empty() {
            "(none, this is the first pass)"
        } else {
            workspace.reflection_feedback.as_str()
        };

        let params = context.params(
            Stage::QueryGenerator,
            &section.name,
            &format!(include_str!("prompts/query_generator_sys.tpl"), max_queries),
            format!(
                include_str!("prompts/query_generator_user.tpl"),
                context.config.topic,
                section.describe(),
                workspace.knowledge,
                history,
                feedback
            ),
        );

        let queries: Queries = extract(context, params).await?;
        Ok(queries
            .queries
            .into_iter()
            .filter(|q| !q.text.trim().is_empty())
            .take(max_queries)
            .collect())
    }

    async fn accumulate<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        section: &Section,
        workspace: &SectionWorkspace,
    ) -> Result<String> {
        let draft = if workspace.accumulated_content.is_empty() {
            "(empty)"
        } else {
            workspace.accumulated_content.as_str()
        };
        let params = context.params(
            Stage::ResultAccumulator,
            &section.name,
            include_str!("prompts/result_accumulator_sys.tpl"),
            format!(
                include_str!("prompts/result_accumulator_user.tpl"),
                section.describe(),
                workspace.knowledge,
                draft,
                format_evidence(&workspace.search_results_history)
            ),
        );
        prompt(context, params).await
    }

    async fn reflect<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        section: &Section,
        workspace: &SectionWorkspace,
    ) -> Result<ReflectionVerdict> {
        let params = context.params(
            Stage::ReflectionGate,
            &section.name,
            include_str!("prompts/reflection_sys.tpl"),
            format!(
                include_str!("prompts/reflection_user.tpl"),
                section.describe(),
                workspace.accumulated_content
            ),
        );
        let feedback: Feedback = extract(context, params).await?;
        Ok(feedback.into())
    }

    async fn format_final<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        section: &Section,
        workspace: &SectionWorkspace,
    ) -> Result<String> {
        let params = context.params(
            Stage::FinalSectionFormatter,
            &section.name,
            include_str!("prompts/final_section_sys.tpl"),
            format!(
                include_str!("prompts/final_section_user.tpl"),
                context.config.topic,
                section.describe(),
                workspace.knowledge,
                workspace.accumulated_content
            ),
        );
        prompt(context, params).await
    }

    async fn stage_done<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        index: usize,
        section: &Section,
        stage: Stage,
        workspace: &SectionWorkspace,
    ) {
        context
            .sink
            .event(WorkflowEvent::StageCompleted {
                index,
                section: section.name.clone(),
                stage,
                iteration: workspace.reflection_iteration_count,
            })
            .await;
    }
}

fn ensure_active(cancel: &CancelToken, section: &Section) -> Result<(), ResearchError> {
    if cancel.is_cancelled() {
        return Err(ResearchError::Cancelled {
            section: section.name.clone(),
            reason: "cancelled".to_string(),
        });
    }
    Ok(())
}

fn format_evidence(results: &[SearchResult]) -> String {
    let mut text = String::new();
    for result in results {
        text.push_str(&format!("### Query: {}\n", result.query.text));
        if result.is_empty() {
            text.push_str("(no usable results)\n\n");
            continue;
        }
        for (i, (content, source)) in result.raw_content.iter().zip(&result.sources).enumerate() {
            text.push_str(&format!(
                "[{}] {} ({})\n{}\n\n",
                i + 1,
                source.title,
                source.url,
                truncate_chars(content, MAX_BLOCK_CHARS)
            ));
        }
    }
    if text.is_empty() {
        text.push_str("(no search results yet)");
    }
    text
}

#[cfg(test)]
mod tests;
