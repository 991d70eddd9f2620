use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines, Stdin};

use crate::generator::planner::session::APPROVAL_TOKEN;

/// 向用户展示草稿并取得一条反馈
#[async_trait]
pub trait HumanInput: Send + Sync {
    async fn ask(&self, draft: &str) -> Result<String>;
}

/// 终端交互。整个会话共用一个行读取器，缓冲中未消费的输入不会丢失
pub struct StdinHumanInput<R = Stdin> {
    lines: tokio::sync::Mutex<Lines<BufReader<R>>>,
}

impl StdinHumanInput {
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }
}

impl Default for StdinHumanInput {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AsyncRead + Unpin + Send> StdinHumanInput<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(reader).lines()),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> HumanInput for StdinHumanInput<R> {
    async fn ask(&self, draft: &str) -> Result<String> {
        println!("\n📋 报告结构草稿:\n\n{}\n", draft.trim());
        print!(
            "💬 Please provide feedback on the report structure (type '{}' to continue): ",
            APPROVAL_TOKEN
        );
        std::io::stdout().flush()?;

        self.lines
            .lock()
            .await
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("标准输入已关闭，无法获取反馈"))
    }
}

/// 按顺序返回预设的反馈，并记录看到的草稿
#[derive(Default)]
pub struct ScriptedHumanInput {
    replies: Mutex<VecDeque<String>>,
    drafts: Mutex<Vec<String>>,
}

impl ScriptedHumanInput {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            drafts: Mutex::new(Vec::new()),
        }
    }

    pub fn drafts_seen(&self) -> Vec<String> {
        self.drafts
            .lock()
            .map(|drafts| drafts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HumanInput for ScriptedHumanInput {
    async fn ask(&self, draft: &str) -> Result<String> {
        if let Ok(mut drafts) = self.drafts.lock() {
            drafts.push(draft.to_string());
        }
        self.replies
            .lock()
            .map_err(|_| anyhow!("反馈脚本不可用"))?
            .pop_front()
            .ok_or_else(|| anyhow!("反馈脚本已用完"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_lines_carry_over_between_asks() {
        // 两行反馈一次性到达，第二次询问仍能读到
        let input = StdinHumanInput::from_reader(&b"add history\ncontinue\n"[..]);

        assert_eq!(input.ask("draft 1").await.unwrap(), "add history");
        assert_eq!(input.ask("draft 2").await.unwrap(), "continue");
        assert!(input.ask("draft 3").await.is_err());
    }
}
