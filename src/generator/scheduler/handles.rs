use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// 单个章节的取消信号
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// 永远不会被取消的信号
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待取消；发送端已释放时永不返回
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// 按章节序号索引的取消句柄，可在调度开始前或调度过程中从外部取消
#[derive(Debug, Clone, Default)]
pub struct SectionHandles {
    senders: Arc<Mutex<HashMap<usize, watch::Sender<bool>>>>,
}

impl SectionHandles {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_sender<R>(&self, index: usize, f: impl FnOnce(&watch::Sender<bool>) -> R) -> R {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = senders
            .entry(index)
            .or_insert_with(|| watch::channel(false).0);
        f(sender)
    }

    pub fn token(&self, index: usize) -> CancelToken {
        self.with_sender(index, |tx| CancelToken { rx: tx.subscribe() })
    }

    /// 取消指定章节，返回此前是否未被取消
    pub fn cancel(&self, index: usize) -> bool {
        self.with_sender(index, |tx| !tx.send_replace(true))
    }

    pub fn is_cancelled(&self, index: usize) -> bool {
        self.with_sender(index, |tx| *tx.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_before_token_is_observed() {
        let handles = SectionHandles::new();
        assert!(handles.cancel(2));
        assert!(!handles.cancel(2));
        assert!(handles.token(2).is_cancelled());
        assert!(!handles.token(1).is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiting_token() {
        let handles = SectionHandles::new();
        let mut token = handles.token(0);

        let remote = handles.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            remote.cancel(0);
        });

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_token_stays_pending() {
        let mut token = CancelToken::never();
        assert!(!token.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(waited.is_err());
    }
}
