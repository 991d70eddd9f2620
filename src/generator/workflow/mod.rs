use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Config;
use crate::generator::compose::FinalAssembler;
use crate::generator::context::ResearchContext;
use crate::generator::outlet::{self, DiskOutlet};
use crate::generator::planner::{
    self, CheckpointStore, FileCheckpointStore, HumanInput, PlanningStatus, SectionFormatter,
    StdinHumanInput,
};
use crate::generator::scheduler::SectionScheduler;
use crate::llm::LanguageModel;
use crate::llm::client::LLMClient;
use crate::llm::search::build_search;
use crate::types::{FinalReport, Section};

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: HashMap<String, Instant>,
    /// 按结束顺序记录
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .insert(phase_name.to_string(), Instant::now());
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let start_time = self.phase_start_times.remove(phase_name)?;
        let duration = start_time.elapsed();
        self.phase_durations
            .push((phase_name.to_string(), duration));
        Some(duration)
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const PLANNING: &'static str = "planning";
    pub const RESEARCH: &'static str = "research";
    pub const ASSEMBLY: &'static str = "assembly";
    pub const OUTPUT: &'static str = "output";
}

/// 规划阶段如何获取人工反馈
pub enum FeedbackMode<'a> {
    /// 在当前进程中循环询问直到批准
    Interactive(&'a dyn HumanInput),
    /// 只推进一步：提交一条反馈（或不提交），未批准时保存检查点后返回
    Resume(Option<String>),
}

/// 已批准结构之后的全部流程：章节调度与最终汇总
pub async fn run_research<L: LanguageModel>(
    context: &ResearchContext<L>,
    topic: &str,
    sections: &[Section],
) -> Result<FinalReport> {
    let mut timing = TimingScope::new();
    run_research_timed(context, topic, sections, &mut timing).await
}

async fn run_research_timed<L: LanguageModel>(
    context: &ResearchContext<L>,
    topic: &str,
    sections: &[Section],
    timing: &mut TimingScope,
) -> Result<FinalReport> {
    timing.start_phase(TimingKeys::RESEARCH);
    let scheduler = SectionScheduler::from_config(&context.config.research);
    let dispatch = scheduler.dispatch(context, sections).await?;
    timing.end_phase(TimingKeys::RESEARCH);

    let placeholders = dispatch
        .outcomes
        .iter()
        .filter(|o| o.content.placeholder)
        .count();
    if placeholders > 0 {
        println!("⚠️ {}个章节使用了占位内容", placeholders);
    }

    timing.start_phase(TimingKeys::ASSEMBLY);
    let report = FinalAssembler
        .assemble(context, topic, &dispatch.outcomes)
        .await?;
    timing.end_phase(TimingKeys::ASSEMBLY);
    Ok(report)
}

/// 执行一次完整运行。规划未被批准时返回 `Ok(None)`，否则返回报告路径。
///
/// 批准后以会话中保存的主题与大纲为准，覆盖上下文中的配置
pub async fn execute<L: LanguageModel>(
    context: &mut ResearchContext<L>,
    store: &dyn CheckpointStore,
    thread_id: &str,
    feedback: FeedbackMode<'_>,
) -> Result<Option<PathBuf>> {
    let mut timing = TimingScope::new();

    timing.start_phase(TimingKeys::PLANNING);
    let plan = match feedback {
        FeedbackMode::Interactive(input) => {
            planner::plan_interactively(context, store, input, thread_id).await?
        }
        FeedbackMode::Resume(message) => {
            match planner::advance(context, store, thread_id, message.as_deref()).await? {
                PlanningStatus::Approved(plan) => plan,
                PlanningStatus::AwaitingApproval { draft } => {
                    println!("\n📋 报告结构草稿:\n\n{}\n", draft.trim());
                    println!(
                        "💡 使用 --thread-id {} --feedback \"{}\" 批准，或提交修改意见",
                        thread_id,
                        planner::APPROVAL_TOKEN
                    );
                    return Ok(None);
                }
            }
        }
    };
    context.config.topic = plan.topic;
    context.config.outline = plan.outline;
    let context = &*context;
    let sections = SectionFormatter.format(context, &plan.structure).await?;
    timing.end_phase(TimingKeys::PLANNING);

    let report = run_research_timed(context, &context.config.topic, &sections, &mut timing).await?;

    timing.start_phase(TimingKeys::OUTPUT);
    let path = outlet::save_report(&context.config, &report).await?;
    timing.end_phase(TimingKeys::OUTPUT);

    info!(report = %path.display(), "运行完成");
    println!("\n{}", timing.generate_timing_report());
    Ok(Some(path))
}

/// 启动调研报告生成工作流
pub async fn launch(config: &Config, feedback: Option<String>, interactive: bool) -> Result<()> {
    config.validate()?;
    let thread_id = config.get_thread_id();
    println!("🧵 会话标识: {}", thread_id);
    println!("🌐 目标语言: {}", config.target_language.display_name());

    let llm = LLMClient::new(config.llm.clone())?;
    // 启动时检查模型连接
    llm.check_connection().await?;

    let search = build_search(&config.search)?;
    let sink = Arc::new(DiskOutlet::for_run(config, &thread_id));
    let mut context = ResearchContext::new(llm, search, sink, config.clone());
    let store = FileCheckpointStore::new(&config.checkpoint_dir());

    let stdin = StdinHumanInput::new();
    let mode = if interactive && feedback.is_none() {
        FeedbackMode::Interactive(&stdin)
    } else {
        FeedbackMode::Resume(feedback)
    };

    match execute(&mut context, &store, &thread_id, mode).await? {
        Some(path) => println!("🎉 报告已生成: {}", path.display()),
        None => println!("⏸️ 规划已暂停，检查点保存在 {}", config.checkpoint_dir().display()),
    }
    Ok(())
}
