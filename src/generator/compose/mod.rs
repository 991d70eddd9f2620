use anyhow::Result;
use std::collections::HashSet;

use crate::error::ResearchError;
use crate::generator::agent_executor::extract_with_retries;
use crate::generator::context::ResearchContext;
use crate::generator::outlet::WorkflowEvent;
use crate::generator::scheduler::SectionOutcome;
use crate::llm::LanguageModel;
use crate::types::{ConclusionAndReferences, FinalReport, SourceRef, Stage};
use crate::utils::text::truncate_chars;

/// 每个章节写入结论提示词时的最大字符数
const MAX_SECTION_CHARS: usize = 6000;

/// 汇总所有章节，生成结论与参考文献。没有循环与重试，任何失败都终止运行
#[derive(Default)]
pub struct FinalAssembler;

impl FinalAssembler {
    pub async fn assemble<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        topic: &str,
        outcomes: &[SectionOutcome],
    ) -> Result<FinalReport> {
        println!("\n🤖 正在汇总报告: {}", topic);
        Self::check_complete(outcomes)?;

        let sources = Self::collect_sources(outcomes);
        let mut ordered: Vec<&SectionOutcome> = outcomes.iter().collect();
        ordered.sort_by_key(|o| o.index);
        let sections_text = ordered
            .iter()
            .map(|o| truncate_chars(o.content.text.trim(), MAX_SECTION_CHARS))
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources_text = if sources.is_empty() {
            "(no sources were collected)".to_string()
        } else {
            sources
                .iter()
                .map(|s| format!("- {} - {}", s.title, s.url))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let params = context.params(
            Stage::FinalAssembler,
            topic,
            include_str!("prompts/final_assembler_sys.tpl"),
            format!(
                include_str!("prompts/final_assembler_user.tpl"),
                topic, sections_text, sources_text
            ),
        );
        let closing: ConclusionAndReferences = extract_with_retries(context, params, 0).await?;

        let report = FinalReport::new(
            topic,
            outcomes.iter().map(|o| o.content.clone()).collect(),
            closing.conclusion,
            closing.references,
        );

        context
            .sink
            .event(WorkflowEvent::ReportAssembled {
                sections: report.sections.len(),
                references: report.references.len(),
            })
            .await;
        println!(
            "✅ 报告汇总完成: {}个章节，{}条参考文献",
            report.sections.len(),
            report.references.len()
        );
        Ok(report)
    }

    /// 每个序号恰好一份章节内容，序号从0连续
    fn check_complete(outcomes: &[SectionOutcome]) -> Result<(), ResearchError> {
        let mut indices: Vec<usize> = outcomes.iter().map(|o| o.content.section_index).collect();
        indices.sort_unstable();
        let expected: Vec<usize> = (0..outcomes.len()).collect();
        if outcomes.is_empty() || indices != expected {
            return Err(ResearchError::stage(
                Stage::FinalAssembler,
                "sections",
                anyhow::anyhow!("章节内容不完整或重复: {:?}", indices),
            ));
        }
        Ok(())
    }

    /// 按URL去重的所有来源，保持章节顺序与首次出现顺序
    pub fn collect_sources(outcomes: &[SectionOutcome]) -> Vec<SourceRef> {
        let mut ordered: Vec<&SectionOutcome> = outcomes.iter().collect();
        ordered.sort_by_key(|o| o.index);

        let mut seen = HashSet::new();
        ordered
            .into_iter()
            .filter_map(|o| o.workspace.as_ref())
            .flat_map(|ws| ws.sources())
            .filter(|source| seen.insert(source.url.clone()))
            .collect()
    }
}
