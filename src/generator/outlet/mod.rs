use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::config::Config;
use crate::types::{FinalReport, FinalSectionContent, Stage};
use crate::utils::text::slugify;

/// 工作流事件，逐行写入事件日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    PlanDrafted {
        thread_id: String,
        revision: usize,
    },
    FeedbackReceived {
        thread_id: String,
        approved: bool,
    },
    SectionsFormatted {
        count: usize,
    },
    SectionDispatched {
        index: usize,
        section: String,
    },
    PacingDelay {
        before_index: usize,
        waited_ms: u64,
    },
    StageCompleted {
        index: usize,
        section: String,
        stage: Stage,
        iteration: u32,
    },
    ReflectionVerdict {
        index: usize,
        section: String,
        iteration: u32,
        accepted: bool,
        forced: bool,
    },
    SectionCompleted {
        index: usize,
        section: String,
        placeholder: bool,
    },
    SectionFailed {
        index: usize,
        section: String,
        error: String,
    },
    ReportAssembled {
        sections: usize,
        references: usize,
    },
}

#[derive(Serialize)]
struct EventRecord<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a WorkflowEvent,
}

/// 结果输出：接收事件流与已完成的章节
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_event(&self, event: &WorkflowEvent) -> Result<()>;

    async fn record_section(&self, content: &FinalSectionContent) -> Result<()>;
}

/// 包装 [`ResultSink`]，输出失败只告警，不影响调研流程
#[derive(Clone)]
pub struct SinkGuard {
    inner: Arc<dyn ResultSink>,
}

impl SinkGuard {
    pub fn new(inner: Arc<dyn ResultSink>) -> Self {
        Self { inner }
    }

    pub async fn event(&self, event: WorkflowEvent) {
        if let Err(e) = self.inner.record_event(&event).await {
            warn!(error = %e, "事件写入失败，已忽略");
        }
    }

    pub async fn section(&self, content: &FinalSectionContent) {
        if let Err(e) = self.inner.record_section(content).await {
            warn!(
                section = %content.section_name,
                index = content.section_index,
                error = %e,
                "章节输出失败，已忽略"
            );
        }
    }
}

/// 丢弃所有输出
pub struct NullOutlet;

#[async_trait]
impl ResultSink for NullOutlet {
    async fn record_event(&self, _event: &WorkflowEvent) -> Result<()> {
        Ok(())
    }

    async fn record_section(&self, _content: &FinalSectionContent) -> Result<()> {
        Ok(())
    }
}

/// 写入内部目录：`agent_logs.jsonl` 事件日志与 `sections/` 下的章节草稿
pub struct DiskOutlet {
    log_path: PathBuf,
    sections_dir: PathBuf,
}

impl DiskOutlet {
    pub fn new(root: &Path) -> Self {
        Self {
            log_path: root.join("agent_logs.jsonl"),
            sections_dir: root.join("sections"),
        }
    }

    /// 按主题与会话划分目录，多次运行互不覆盖
    pub fn for_run(config: &Config, thread_id: &str) -> Self {
        let root = config
            .internal_path
            .join("runs")
            .join(slugify(thread_id));
        Self::new(&root)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn section_path(&self, content: &FinalSectionContent) -> PathBuf {
        self.sections_dir.join(format!(
            "{:02}_{}.md",
            content.section_index,
            slugify(&content.section_name)
        ))
    }
}

#[async_trait]
impl ResultSink for DiskOutlet {
    async fn record_event(&self, event: &WorkflowEvent) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&EventRecord {
            timestamp: Utc::now(),
            event,
        })?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .context(format!("无法打开事件日志: {}", self.log_path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn record_section(&self, content: &FinalSectionContent) -> Result<()> {
        fs::create_dir_all(&self.sections_dir).await?;
        let path = self.section_path(content);
        fs::write(&path, &content.text)
            .await
            .context(format!("无法写入章节: {}", path.display()))?;
        Ok(())
    }
}

/// 将最终报告写入 `<output_path>/<slug(topic)>.md`。与章节输出不同，这里的失败会终止运行
pub async fn save_report(config: &Config, report: &FinalReport) -> Result<PathBuf> {
    println!("\n🖊️ 报告存储中...");
    let path = config.report_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context(format!("无法创建输出目录: {}", parent.display()))?;
    }
    fs::write(&path, report.render(&config.target_language))
        .await
        .context(format!("无法写入报告: {}", path.display()))?;
    println!("💾 已保存报告: {}", path.display());
    Ok(path)
}
