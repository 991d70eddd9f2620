//! 章节调度：顺序（带节流）或有界并发地为每个章节运行一次调研工作流

use anyhow::Result;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{DispatchMode, ResearchConfig, SectionFailurePolicy};
use crate::error::ResearchError;
use crate::generator::context::ResearchContext;
use crate::generator::outlet::WorkflowEvent;
use crate::generator::research::{ResearchWorkflow, SectionRun, SectionWorkspace};
use crate::llm::{LanguageModel, is_throttling_error};
use crate::types::{FinalSectionContent, Section};

pub mod handles;
pub mod pacing;

pub use handles::{CancelToken, SectionHandles};
pub use pacing::{
    AdaptiveBackoff, FixedDelay, NoPacing, PacingStrategy, TokenBucket, build_pacing,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Dispatching,
    AwaitingPacingDelay,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Completed,
    /// 章节失败，按占位策略继续
    Failed(String),
    /// 章节被取消或超时
    Cancelled(String),
}

/// 单个章节的调度结果
#[derive(Debug, Clone)]
pub struct SectionOutcome {
    pub index: usize,
    pub section: Section,
    pub content: FinalSectionContent,
    /// 失败或取消的章节没有工作记忆
    pub workspace: Option<SectionWorkspace>,
    pub status: OutcomeStatus,
}

/// 一次调度的汇总
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// 按章节序号升序，与完成顺序无关
    pub outcomes: Vec<SectionOutcome>,
    /// 顺序调度中执行过的节流等待次数
    pub pacing_delays: usize,
    pub pacing_waited: Duration,
    pub peak_in_flight: usize,
    pub dispatch_order: Vec<usize>,
    pub completion_order: Vec<usize>,
    /// 状态迁移记录
    pub states: Vec<SchedulerState>,
}

/// 调度协调者的可变状态，只由调度循环写入
struct Coordinator {
    cursor: usize,
    len: usize,
    state: SchedulerState,
    report: DispatchReport,
}

impl Coordinator {
    fn new(len: usize) -> Self {
        Self {
            cursor: 0,
            len,
            state: SchedulerState::Idle,
            report: DispatchReport {
                states: vec![SchedulerState::Idle],
                ..DispatchReport::default()
            },
        }
    }

    fn transition(&mut self, state: SchedulerState) {
        if self.state != state {
            self.state = state;
            self.report.states.push(state);
        }
    }

    /// 游标只前进，每个序号只会被取出一次
    fn next_index(&mut self) -> Option<usize> {
        if self.cursor >= self.len {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.report.dispatch_order.push(index);
        Some(index)
    }

    fn finish(mut self) -> DispatchReport {
        self.transition(SchedulerState::Completed);
        self.report.outcomes.sort_by_key(|o| o.index);
        self.report
    }
}

pub struct SectionScheduler {
    mode: DispatchMode,
    max_concurrent: usize,
    pacing: Box<dyn PacingStrategy>,
    failure_policy: SectionFailurePolicy,
    section_timeout: Option<Duration>,
    handles: SectionHandles,
    workflow: ResearchWorkflow,
}

impl SectionScheduler {
    pub fn new(mode: DispatchMode, max_concurrent: usize, pacing: Box<dyn PacingStrategy>) -> Self {
        let failure_policy = match mode {
            DispatchMode::Sequential => SectionFailurePolicy::AbortRun,
            DispatchMode::Concurrent => SectionFailurePolicy::Placeholder,
        };
        Self {
            mode,
            max_concurrent: max_concurrent.max(1),
            pacing,
            failure_policy,
            section_timeout: None,
            handles: SectionHandles::new(),
            workflow: ResearchWorkflow,
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(
            config.dispatch,
            config.max_concurrent_sections,
            pacing::build_pacing(&config.pacing),
        )
        .with_failure_policy(config.effective_failure_policy())
        .with_section_timeout(config.section_timeout())
    }

    pub fn with_failure_policy(mut self, policy: SectionFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_section_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.section_timeout = timeout;
        self
    }

    /// 取消句柄，可在调度进行中从其它任务使用
    pub fn handles(&self) -> SectionHandles {
        self.handles.clone()
    }

    pub async fn dispatch<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        sections: &[Section],
    ) -> Result<DispatchReport> {
        let mut coordinator = Coordinator::new(sections.len());
        println!(
            "🚀 开始调研{}个章节，调度方式: {}",
            sections.len(),
            match self.mode {
                DispatchMode::Sequential => format!("顺序（节流: {}）", self.pacing.name()),
                DispatchMode::Concurrent => format!("并发（上限: {}）", self.max_concurrent),
            }
        );

        match self.mode {
            DispatchMode::Sequential => {
                self.dispatch_sequential(context, sections, &mut coordinator)
                    .await?
            }
            DispatchMode::Concurrent => {
                self.dispatch_concurrent(context, sections, &mut coordinator)
                    .await?
            }
        }

        let report = coordinator.finish();
        info!(
            sections = report.outcomes.len(),
            peak_in_flight = report.peak_in_flight,
            pacing_delays = report.pacing_delays,
            "章节调度完成"
        );
        Ok(report)
    }

    async fn dispatch_sequential<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        sections: &[Section],
        coordinator: &mut Coordinator,
    ) -> Result<()> {
        while coordinator.cursor < coordinator.len {
            if coordinator.cursor > 0 {
                coordinator.transition(SchedulerState::AwaitingPacingDelay);
                let waited = self.pacing.wait().await;
                coordinator.report.pacing_delays += 1;
                coordinator.report.pacing_waited += waited;
                context
                    .sink
                    .event(WorkflowEvent::PacingDelay {
                        before_index: coordinator.cursor,
                        waited_ms: waited.as_millis() as u64,
                    })
                    .await;
            }

            let Some(index) = coordinator.next_index() else {
                break;
            };
            coordinator.transition(SchedulerState::Dispatching);
            self.announce(context, index, &sections[index]).await;
            coordinator.report.peak_in_flight = coordinator.report.peak_in_flight.max(1);

            let (index, result) = self.run_unit(context, index, &sections[index]).await;
            let outcome = self.settle(context, index, &sections[index], result).await?;
            coordinator.report.completion_order.push(index);
            coordinator.report.outcomes.push(outcome);
        }
        Ok(())
    }

    async fn dispatch_concurrent<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        sections: &[Section],
        coordinator: &mut Coordinator,
    ) -> Result<()> {
        let mut in_flight = FuturesUnordered::new();
        coordinator.transition(SchedulerState::Dispatching);

        loop {
            while in_flight.len() < self.max_concurrent {
                let Some(index) = coordinator.next_index() else {
                    break;
                };
                self.announce(context, index, &sections[index]).await;
                in_flight.push(self.run_unit(context, index, &sections[index]));
                coordinator.report.peak_in_flight =
                    coordinator.report.peak_in_flight.max(in_flight.len());
            }

            let Some((index, result)) = in_flight.next().await else {
                break;
            };
            // 中止运行时直接返回，未完成的章节随 in_flight 一起被丢弃
            let outcome = self.settle(context, index, &sections[index], result).await?;
            coordinator.report.completion_order.push(index);
            coordinator.report.outcomes.push(outcome);
        }
        Ok(())
    }

    async fn announce<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        index: usize,
        section: &Section,
    ) {
        context
            .sink
            .event(WorkflowEvent::SectionDispatched {
                index,
                section: section.name.clone(),
            })
            .await;
    }

    /// 运行单个章节，受取消信号与时间预算约束
    async fn run_unit<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        index: usize,
        section: &Section,
    ) -> (usize, Result<SectionRun>) {
        let mut token = self.handles.token(index);
        let view = token.clone();
        let work = self.workflow.run(context, index, section, &view);

        let bounded = async {
            match self.section_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(ResearchError::Cancelled {
                        section: section.name.clone(),
                        reason: format!("超出时间预算 {}秒", limit.as_secs()),
                    }
                    .into()),
                },
                None => work.await,
            }
        };

        let result = tokio::select! {
            result = bounded => result,
            _ = token.cancelled() => Err(ResearchError::Cancelled {
                section: section.name.clone(),
                reason: "cancelled".to_string(),
            }
            .into()),
        };
        (index, result)
    }

    /// 处理章节结果：成功则输出，取消总是用占位内容，失败按策略中止或占位
    async fn settle<L: LanguageModel>(
        &self,
        context: &ResearchContext<L>,
        index: usize,
        section: &Section,
        result: Result<SectionRun>,
    ) -> Result<SectionOutcome> {
        let err = match result {
            Ok(run) => {
                self.pacing.on_success();
                context.sink.section(&run.content).await;
                context
                    .sink
                    .event(WorkflowEvent::SectionCompleted {
                        index,
                        section: section.name.clone(),
                        placeholder: false,
                    })
                    .await;
                return Ok(SectionOutcome {
                    index,
                    section: section.clone(),
                    content: run.content,
                    workspace: Some(run.workspace),
                    status: OutcomeStatus::Completed,
                });
            }
            Err(err) => err,
        };

        if is_throttling_error(&err) {
            self.pacing.on_throttled();
        }

        let cancelled = err.chain().find_map(|cause| match cause.downcast_ref::<ResearchError>() {
            Some(ResearchError::Cancelled { reason, .. }) => Some(reason.clone()),
            _ => None,
        });

        let status = match cancelled {
            Some(reason) => {
                warn!(section = %section.name, index, reason = %reason, "章节已中止，使用占位内容");
                OutcomeStatus::Cancelled(reason)
            }
            None => {
                context
                    .sink
                    .event(WorkflowEvent::SectionFailed {
                        index,
                        section: section.name.clone(),
                        error: format!("{:#}", err),
                    })
                    .await;
                if self.failure_policy == SectionFailurePolicy::AbortRun {
                    error!(section = %section.name, index, error = %err, "章节失败，中止运行");
                    return Err(err);
                }
                error!(section = %section.name, index, error = %err, "章节失败，使用占位内容");
                OutcomeStatus::Failed(format!("{:#}", err))
            }
        };

        let reason = match &status {
            OutcomeStatus::Cancelled(reason) | OutcomeStatus::Failed(reason) => reason.as_str(),
            OutcomeStatus::Completed => "",
        };
        let content = placeholder(index, section, reason);
        println!("⚠️ [{}] 章节未完成，已使用占位内容: {}", index + 1, section.name);
        context.sink.section(&content).await;
        context
            .sink
            .event(WorkflowEvent::SectionCompleted {
                index,
                section: section.name.clone(),
                placeholder: true,
            })
            .await;

        Ok(SectionOutcome {
            index,
            section: section.clone(),
            content,
            workspace: None,
            status,
        })
    }
}

fn placeholder(index: usize, section: &Section, reason: &str) -> FinalSectionContent {
    FinalSectionContent {
        section_index: index,
        section_name: section.name.clone(),
        text: format!(
            "## {}\n\n> This section could not be completed: {}\n",
            section.name, reason
        ),
        placeholder: true,
    }
}
