//! 测试替身：按阶段应答的模型、可编排的检索与记录输出

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{Config, DispatchMode, PacingKind, SearchProvider};
use crate::generator::context::ResearchContext;
use crate::generator::outlet::{ResultSink, WorkflowEvent};
use crate::llm::search::WebSearch;
use crate::llm::{AgentExecuteParams, SchemaMismatch, StructuredExtraction, TextCompletion};
use crate::types::{FinalSectionContent, SearchHit, Stage};
use crate::utils::text::slugify;

#[derive(Default)]
struct ModelState {
    calls: HashMap<Stage, usize>,
    prompts: Vec<AgentExecuteParams>,
    sections: Value,
    verdicts: HashMap<String, VecDeque<Value>>,
    malformed: HashMap<Stage, usize>,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    planner_budget: Option<usize>,
    queries_per_call: usize,
    active: usize,
    peak_active: usize,
}

/// 按调用阶段返回固定内容的模型
pub struct ScriptedModel {
    state: Mutex<ModelState>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        let state = ModelState {
            sections: json!({ "sections": [] }),
            queries_per_call: 3,
            ..ModelState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ModelState> {
        self.state.lock().unwrap()
    }

    pub fn with_sections(self, sections: &[(&str, &[&str])]) -> Self {
        let list: Vec<Value> = sections
            .iter()
            .map(|(name, subs)| json!({ "section_name": name, "sub_sections": subs }))
            .collect();
        self.lock().sections = json!({ "sections": list });
        self
    }

    pub fn with_raw_sections(self, value: Value) -> Self {
        self.lock().sections = value;
        self
    }

    /// 指定章节的反思结论，按调用顺序消费，用完后默认通过
    pub fn with_verdicts(self, section: &str, verdicts: Vec<Value>) -> Self {
        self.lock()
            .verdicts
            .insert(section.to_string(), verdicts.into());
        self
    }

    /// 指定阶段的前 `times` 次结构化提取返回不合格数据
    pub fn with_malformed(self, stage: Stage, times: usize) -> Self {
        self.lock().malformed.insert(stage, times);
        self
    }

    /// 指定章节在知识准备阶段失败
    pub fn with_failure(self, section: &str, message: &str) -> Self {
        self.lock()
            .failures
            .insert(section.to_string(), message.to_string());
        self
    }

    /// 指定章节在知识准备阶段等待的时长
    pub fn with_delay(self, section: &str, delay: Duration) -> Self {
        self.lock().delays.insert(section.to_string(), delay);
        self
    }

    /// 报告规划只成功前 `drafts` 次，之后的调用失败
    pub fn with_planner_budget(self, drafts: usize) -> Self {
        self.lock().planner_budget = Some(drafts);
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.lock().calls.get(&stage).copied().unwrap_or(0)
    }

    pub fn calls_for(&self, stage: Stage, tag: &str) -> usize {
        self.lock()
            .prompts
            .iter()
            .filter(|p| p.stage == stage && p.log_tag == tag)
            .count()
    }

    pub fn prompts(&self, stage: Stage) -> Vec<AgentExecuteParams> {
        self.lock()
            .prompts
            .iter()
            .filter(|p| p.stage == stage)
            .cloned()
            .collect()
    }

    /// 同时处于调研中的章节数峰值
    pub fn peak_active(&self) -> usize {
        self.lock().peak_active
    }

    fn record(&self, params: &AgentExecuteParams) -> usize {
        let mut state = self.lock();
        state.prompts.push(params.clone());
        let count = state.calls.entry(params.stage).or_insert(0);
        *count += 1;
        *count
    }
}

impl TextCompletion for ScriptedModel {
    async fn complete(&self, params: &AgentExecuteParams) -> Result<String> {
        let n = self.record(params);
        let tag = params.log_tag.clone();

        match params.stage {
            Stage::ReportPlanner => {
                if self.lock().planner_budget.is_some_and(|budget| n > budget) {
                    bail!("planner unavailable");
                }
                Ok(format!("1. Introduction\n2. Kernels\n(draft {})", n))
            }
            Stage::KnowledgeSeed => {
                let (delay, failure) = {
                    let mut state = self.lock();
                    state.active += 1;
                    state.peak_active = state.peak_active.max(state.active);
                    (
                        state.delays.get(&tag).copied(),
                        state.failures.get(&tag).cloned(),
                    )
                };
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if let Some(message) = failure {
                    self.lock().active -= 1;
                    bail!(message);
                }
                Ok(format!("Background knowledge on {}", tag))
            }
            Stage::ResultAccumulator => Ok(format!("Accumulated notes for {} (pass {})", tag, n)),
            Stage::FinalSectionFormatter => {
                self.lock().active -= 1;
                Ok(format!("## {}\n\nFinal text for {}.", tag, tag))
            }
            other => Err(anyhow!("unexpected completion for stage {}", other)),
        }
    }
}

impl StructuredExtraction for ScriptedModel {
    async fn extract<T>(&self, params: &AgentExecuteParams) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let n = self.record(params);
        let tag = params.log_tag.clone();

        let value = {
            let mut state = self.lock();
            if let Some(left) = state.malformed.get_mut(&params.stage) {
                if *left > 0 {
                    *left -= 1;
                    return Err(SchemaMismatch("missing field".to_string()).into());
                }
            }

            match params.stage {
                Stage::SectionFormatter => state.sections.clone(),
                Stage::QueryGenerator => {
                    let queries: Vec<Value> = (1..=state.queries_per_call)
                        .map(|i| json!({ "query": format!("{} query {}.{}", tag, n, i) }))
                        .collect();
                    json!({ "queries": queries })
                }
                Stage::ReflectionGate => state
                    .verdicts
                    .get_mut(&tag)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(json!({ "feedback": true })),
                Stage::FinalAssembler => json!({
                    "conclusion": "Overall conclusion.",
                    "references": ["Primary source - https://example.com/primary"]
                }),
                other => return Err(anyhow!("unexpected extraction for stage {}", other)),
            }
        };

        serde_json::from_value(value).map_err(|e| SchemaMismatch(e.to_string()).into())
    }
}

#[derive(Default)]
struct SearchState {
    queries: Vec<String>,
    failing: HashSet<String>,
    hits: Option<Vec<SearchHit>>,
}

/// 记录查询并返回可预测结果的检索服务
#[derive(Default)]
pub struct ScriptedSearch {
    state: Mutex<SearchState>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有查询返回同一组结果
    pub fn with_hits(self, hits: Vec<SearchHit>) -> Self {
        self.state.lock().unwrap().hits = Some(hits);
        self
    }

    /// 查询包含该片段时返回传输错误
    pub fn failing_on(self, fragment: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(fragment.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl WebSearch for ScriptedSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.to_string());
        if state.failing.iter().any(|f| query.contains(f.as_str())) {
            bail!("search backend unavailable");
        }
        if let Some(hits) = &state.hits {
            return Ok(hits.clone());
        }
        Ok((0..max_results)
            .map(|i| {
                SearchHit::new(
                    &format!("https://example.com/{}/{}", slugify(query), i),
                    &format!("{} result {}", query, i),
                    &format!("Content about {} #{}", query, i),
                )
            })
            .collect())
    }
}

/// 记录所有输出，可设置为总是失败
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<WorkflowEvent>>,
    pub sections: Mutex<Vec<FinalSectionContent>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn sections(&self) -> Vec<FinalSectionContent> {
        self.sections.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn record_event(&self, event: &WorkflowEvent) -> Result<()> {
        if self.fail {
            bail!("sink unavailable");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn record_section(&self, content: &FinalSectionContent) -> Result<()> {
        if self.fail {
            bail!("sink unavailable");
        }
        self.sections.lock().unwrap().push(content.clone());
        Ok(())
    }
}

/// 不访问任何外部服务的配置
pub fn test_config() -> Config {
    let mut config = Config {
        topic: "Support Vector Machines".to_string(),
        outline: "Explain SVMs for practitioners".to_string(),
        ..Config::default()
    };
    config.llm.api_key = "test-key".to_string();
    config.search.provider = SearchProvider::Disabled;
    config.research.dispatch = DispatchMode::Sequential;
    config.research.pacing.strategy = PacingKind::None;
    config
}

pub fn test_context(
    model: ScriptedModel,
    search: Arc<ScriptedSearch>,
    config: Config,
) -> (ResearchContext<ScriptedModel>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let context = ResearchContext::new(model, search, sink.clone(), config);
    (context, sink)
}
