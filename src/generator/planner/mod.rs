//! 报告结构规划：草稿生成、人工审核、检查点与章节提取

use anyhow::{Result, anyhow};
use tracing::info;

use crate::error::ResearchError;
use crate::generator::agent_executor::{extract, prompt};
use crate::generator::context::ResearchContext;
use crate::generator::outlet::WorkflowEvent;
use crate::llm::LanguageModel;
use crate::types::{Section, Sections, Stage};

pub mod checkpoint;
pub mod human_input;
pub mod session;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use human_input::{HumanInput, ScriptedHumanInput, StdinHumanInput};
pub use session::{
    APPROVAL_TOKEN, ChatRole, ChatTurn, GateState, GateTransition, HumanFeedbackGate,
    PlanningSession,
};

/// 规划流程的当前状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningStatus {
    /// 草稿等待人工反馈，此时进程可以退出，稍后用同一会话标识恢复
    AwaitingApproval { draft: String },
    /// 报告结构已冻结
    Approved(ApprovedPlan),
}

/// 已批准的规划结果。主题与大纲取自会话本身，恢复运行时不依赖当前配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedPlan {
    pub topic: String,
    pub outline: String,
    pub structure: String,
}

impl ApprovedPlan {
    fn of(session: &PlanningSession, structure: String) -> Self {
        Self {
            topic: session.topic.clone(),
            outline: session.outline.clone(),
            structure,
        }
    }
}

/// 根据主题、大纲与历史对话生成报告结构草稿
#[derive(Default)]
pub struct ReportPlanner;

impl ReportPlanner {
    pub async fn propose<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        topic: &str,
        outline: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        println!("🧭 正在规划报告结构: {}", topic);
        let prompt_user = format!(
            include_str!("prompts/report_planner_user.tpl"),
            topic,
            outline,
            Self::format_history(history)
        );
        let params = context.params(
            Stage::ReportPlanner,
            topic,
            include_str!("prompts/report_planner_sys.tpl"),
            prompt_user,
        );

        let draft = prompt(context, params).await?;
        if draft.trim().is_empty() {
            return Err(ResearchError::stage(
                Stage::ReportPlanner,
                topic,
                anyhow!("模型返回了空的报告结构"),
            )
            .into());
        }
        Ok(draft)
    }

    fn format_history(history: &[ChatTurn]) -> String {
        if history.is_empty() {
            return String::new();
        }

        let mut text = String::from("\n## Conversation so far\n");
        let mut drafts = 0;
        for turn in history {
            match turn.role {
                ChatRole::Planner => {
                    drafts += 1;
                    text.push_str(&format!("\n### Draft {}\n{}\n", drafts, turn.content.trim()));
                }
                ChatRole::Human => {
                    text.push_str(&format!("\n### User feedback\n{}\n", turn.content.trim()));
                }
            }
        }
        text.push_str("\nProduce the complete revised report structure.\n");
        text
    }
}

/// 将冻结的报告结构转为章节列表
#[derive(Default)]
pub struct SectionFormatter;

impl SectionFormatter {
    pub async fn format<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        structure: &str,
    ) -> Result<Vec<Section>> {
        let params = context.params(
            Stage::SectionFormatter,
            "report_structure",
            include_str!("prompts/section_formatter_sys.tpl"),
            format!(include_str!("prompts/section_formatter_user.tpl"), structure),
        );

        let sections: Sections = extract(context, params).await?;
        let sections: Vec<Section> = sections
            .sections
            .into_iter()
            .filter(|s| !s.name.trim().is_empty())
            .collect();

        if sections.is_empty() {
            return Err(ResearchError::SchemaViolation {
                stage: Stage::SectionFormatter,
                target: "report_structure".to_string(),
                message: "报告结构中没有可调研的章节".to_string(),
            }
            .into());
        }

        context
            .sink
            .event(WorkflowEvent::SectionsFormatted {
                count: sections.len(),
            })
            .await;
        println!("📋 共{}个章节待调研", sections.len());
        Ok(sections)
    }
}

/// 推进一步规划流程并保存检查点。
///
/// - 新会话：生成第一版草稿
/// - 有草稿且给出反馈：交给审核关口，必要时重新规划
/// - 未给出反馈：返回当前草稿（或补齐中断时缺失的草稿）
pub async fn advance<L: LanguageModel>(
    context: &ResearchContext<L>,
    store: &dyn CheckpointStore,
    thread_id: &str,
    message: Option<&str>,
) -> Result<PlanningStatus> {
    let mut session = match store.load(thread_id).await? {
        Some(session) => session,
        None if message.is_some() => {
            return Err(ResearchError::Checkpoint(format!(
                "会话 {} 不存在，无法提交反馈",
                thread_id
            ))
            .into());
        }
        None => {
            if context.config.topic.trim().is_empty() {
                return Err(
                    ResearchError::Configuration("未指定报告主题 (topic)".into()).into(),
                );
            }
            info!(thread_id, "创建新的规划会话");
            PlanningSession::new(thread_id, &context.config.topic, &context.config.outline)
        }
    };

    if session.state == GateState::Approved {
        return approved(&session);
    }

    if let Some(message) = message {
        if session.needs_draft() {
            // 上一轮反馈尚未得到新草稿，合并到同一轮修订中
            session.push_feedback(message.to_string());
            store.save(&session).await?;
        } else {
            let transition = HumanFeedbackGate::default().receive(&mut session, message)?;
            store.save(&session).await?;
            context
                .sink
                .event(WorkflowEvent::FeedbackReceived {
                    thread_id: thread_id.to_string(),
                    approved: transition != GateTransition::Revise,
                })
                .await;

            if let GateTransition::Approved(structure) = transition {
                println!("✅ 报告结构已确认");
                return Ok(PlanningStatus::Approved(ApprovedPlan::of(&session, structure)));
            }
        }
    }

    if session.needs_draft() {
        let draft = ReportPlanner
            .propose(context, &session.topic, &session.outline, &session.messages)
            .await?;
        session.push_draft(draft);
        store.save(&session).await?;
        context
            .sink
            .event(WorkflowEvent::PlanDrafted {
                thread_id: thread_id.to_string(),
                revision: session.revision(),
            })
            .await;
    }

    let draft = session
        .latest_draft()
        .map(str::to_string)
        .ok_or_else(|| ResearchError::Checkpoint(format!("会话 {} 缺少草稿", thread_id)))?;
    Ok(PlanningStatus::AwaitingApproval { draft })
}

fn approved(session: &PlanningSession) -> Result<PlanningStatus> {
    let structure = session.structure.clone().ok_or_else(|| {
        ResearchError::Checkpoint(format!("会话 {} 已批准但缺少报告结构", session.thread_id))
    })?;
    Ok(PlanningStatus::Approved(ApprovedPlan::of(session, structure)))
}

/// 交互式规划：循环展示草稿并收集反馈，直到批准
pub async fn plan_interactively<L: LanguageModel>(
    context: &ResearchContext<L>,
    store: &dyn CheckpointStore,
    input: &dyn HumanInput,
    thread_id: &str,
) -> Result<ApprovedPlan> {
    let mut message: Option<String> = None;
    loop {
        match advance(context, store, thread_id, message.as_deref()).await? {
            PlanningStatus::Approved(plan) => return Ok(plan),
            PlanningStatus::AwaitingApproval { draft } => {
                message = Some(input.ask(&draft).await?);
            }
        }
    }
}
