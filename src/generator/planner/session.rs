use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResearchError;

/// 批准报告结构的口令
pub const APPROVAL_TOKEN: &str = "continue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Planner,
    Human,
}

/// 规划对话中的一轮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    AwaitingApproval,
    Approved,
}

/// 一次规划会话，整体作为检查点持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningSession {
    pub thread_id: String,
    pub topic: String,
    pub outline: String,
    /// 草稿与反馈交替出现
    pub messages: Vec<ChatTurn>,
    pub state: GateState,
    /// 仅在批准后写入，之后不再变化
    pub structure: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PlanningSession {
    pub fn new(thread_id: &str, topic: &str, outline: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            topic: topic.to_string(),
            outline: outline.to_string(),
            messages: Vec::new(),
            state: GateState::AwaitingApproval,
            structure: None,
            updated_at: Utc::now(),
        }
    }

    pub fn latest_draft(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|turn| turn.role == ChatRole::Planner)
            .map(|turn| turn.content.as_str())
    }

    /// 已生成的草稿数
    pub fn revision(&self) -> usize {
        self.messages
            .iter()
            .filter(|turn| turn.role == ChatRole::Planner)
            .count()
    }

    /// 尚无草稿，或最后一轮是未处理的反馈
    pub fn needs_draft(&self) -> bool {
        self.state == GateState::AwaitingApproval
            && self
                .messages
                .last()
                .is_none_or(|turn| turn.role == ChatRole::Human)
    }

    pub fn push_draft(&mut self, draft: String) {
        self.push(ChatRole::Planner, draft);
    }

    pub fn push_feedback(&mut self, feedback: String) {
        self.push(ChatRole::Human, feedback);
    }

    fn push(&mut self, role: ChatRole, content: String) {
        self.messages.push(ChatTurn { role, content });
        self.updated_at = Utc::now();
    }
}

/// 人工反馈处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateTransition {
    /// 草稿被批准，携带冻结的报告结构
    Approved(String),
    /// 反馈已记录，需要重新规划
    Revise,
}

/// 人工审核关口：口令批准当前草稿，其它内容作为修订意见
#[derive(Debug, Clone)]
pub struct HumanFeedbackGate {
    approval_token: String,
}

impl Default for HumanFeedbackGate {
    fn default() -> Self {
        Self {
            approval_token: APPROVAL_TOKEN.to_string(),
        }
    }
}

impl HumanFeedbackGate {
    pub fn approval_token(&self) -> &str {
        &self.approval_token
    }

    pub fn receive(
        &self,
        session: &mut PlanningSession,
        message: &str,
    ) -> Result<GateTransition, ResearchError> {
        if session.state == GateState::Approved {
            return session
                .structure
                .clone()
                .map(GateTransition::Approved)
                .ok_or_else(|| {
                    ResearchError::Checkpoint(format!(
                        "会话 {} 已批准但缺少报告结构",
                        session.thread_id
                    ))
                });
        }

        let draft = session
            .latest_draft()
            .map(str::to_string)
            .ok_or_else(|| {
                ResearchError::Checkpoint(format!("会话 {} 尚无可审核的草稿", session.thread_id))
            })?;

        session.push_feedback(message.to_string());

        // 输入行末的换行不影响口令判断，大小写需严格一致
        if message.trim() == self.approval_token {
            session.state = GateState::Approved;
            session.structure = Some(draft.clone());
            Ok(GateTransition::Approved(draft))
        } else {
            Ok(GateTransition::Revise)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drafted() -> PlanningSession {
        let mut session = PlanningSession::new("t1", "SVM", "basics");
        session.push_draft("1. Intro\n2. Kernels".to_string());
        session
    }

    #[test]
    fn test_approval_freezes_latest_draft() {
        let gate = HumanFeedbackGate::default();
        let mut session = drafted();

        let transition = gate.receive(&mut session, "continue\n").unwrap();
        assert_eq!(transition, GateTransition::Approved("1. Intro\n2. Kernels".into()));
        assert_eq!(session.state, GateState::Approved);
        assert_eq!(session.structure.as_deref(), Some("1. Intro\n2. Kernels"));
        assert!(!session.needs_draft());
    }

    #[test]
    fn test_other_message_requests_revision() {
        let gate = HumanFeedbackGate::default();
        let mut session = drafted();

        let transition = gate.receive(&mut session, "Add a section on kernels").unwrap();
        assert_eq!(transition, GateTransition::Revise);
        assert_eq!(session.state, GateState::AwaitingApproval);
        assert!(session.structure.is_none());
        assert!(session.needs_draft());
        assert_eq!(session.messages.last().unwrap().role, ChatRole::Human);
    }

    #[test]
    fn test_token_is_case_sensitive() {
        let gate = HumanFeedbackGate::default();
        let mut session = drafted();
        assert_eq!(gate.receive(&mut session, "Continue").unwrap(), GateTransition::Revise);
    }

    #[test]
    fn test_feedback_without_draft_is_rejected() {
        let gate = HumanFeedbackGate::default();
        let mut session = PlanningSession::new("t2", "SVM", "");
        assert!(matches!(
            gate.receive(&mut session, "continue"),
            Err(ResearchError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_revision_counts_drafts() {
        let mut session = drafted();
        session.push_feedback("more".into());
        session.push_draft("v2".into());
        assert_eq!(session.revision(), 2);
        assert_eq!(session.latest_draft(), Some("v2"));
    }
}
