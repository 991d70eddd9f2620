use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::ResearchError;
use crate::generator::planner::session::PlanningSession;
use crate::memory::Memory;

/// 规划会话的持久化，以会话标识为键
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<PlanningSession>>;

    async fn save(&self, session: &PlanningSession) -> Result<()>;
}

/// 每个会话一个JSON文件
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, ResearchError> {
        let valid = !thread_id.is_empty()
            && thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ResearchError::Checkpoint(format!(
                "非法的会话标识: {:?}",
                thread_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", thread_id)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<PlanningSession>> {
        let path = self.path_for(thread_id)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .context(format!("无法读取检查点: {}", path.display()))?;
        let session = serde_json::from_str(&content).map_err(|e| {
            ResearchError::Checkpoint(format!("检查点已损坏 {}: {}", path.display(), e))
        })?;
        Ok(Some(session))
    }

    async fn save(&self, session: &PlanningSession) -> Result<()> {
        let path = self.path_for(&session.thread_id)?;
        fs::create_dir_all(&self.dir)
            .await
            .context(format!("无法创建检查点目录: {}", self.dir.display()))?;

        // 先写临时文件再改名，中断时不会留下半截JSON
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(session)?).await?;
        fs::rename(&tmp, &path)
            .await
            .context(format!("无法写入检查点: {}", path.display()))?;
        Ok(())
    }
}

/// 进程内检查点，基于 [`Memory`]
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    memory: RwLock<Memory>,
}

impl InMemoryCheckpointStore {
    const SCOPE: &'static str = "planning_sessions";

    pub fn new() -> Self {
        Self::default()
    }

    /// 会话被保存的次数
    pub async fn revision(&self, thread_id: &str) -> Option<u64> {
        self.memory.read().await.revision(Self::SCOPE, thread_id)
    }

    /// 已保存的会话标识
    pub async fn threads(&self) -> Vec<String> {
        self.memory.read().await.list_keys(Self::SCOPE)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<PlanningSession>> {
        let memory = self.memory.read().await;
        memory
            .get(Self::SCOPE, thread_id)
            .map_err(|e| ResearchError::Checkpoint(format!("检查点已损坏 {}: {}", thread_id, e)).into())
    }

    async fn save(&self, session: &PlanningSession) -> Result<()> {
        let mut memory = self.memory.write().await;
        memory.store(Self::SCOPE, &session.thread_id, session)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(id: &str) -> PlanningSession {
        let mut session = PlanningSession::new(id, "SVM", "basics");
        session.push_draft("1. Intro".into());
        session
    }

    #[tokio::test]
    async fn test_file_store_round_trip_survives_new_instance() {
        let dir = TempDir::new().unwrap();
        FileCheckpointStore::new(dir.path())
            .save(&session("thread-1"))
            .await
            .unwrap();

        let reopened = FileCheckpointStore::new(dir.path());
        let loaded = reopened.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.latest_draft(), Some("1. Intro"));
        assert!(reopened.load("thread-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_reports_corruption() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let err = FileCheckpointStore::new(dir.path())
            .load("broken")
            .await
            .unwrap_err();
        assert_eq!(crate::error::exit_code_of(&err), 3);
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load("../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_tracks_revisions() {
        let store = InMemoryCheckpointStore::new();
        let mut s = session("t");
        store.save(&s).await.unwrap();
        s.push_feedback("more detail".into());
        store.save(&s).await.unwrap();

        assert_eq!(store.revision("t").await, Some(2));
        assert_eq!(store.threads().await, vec!["t".to_string()]);
        assert_eq!(store.load("t").await.unwrap().unwrap().messages.len(), 2);
    }
}
