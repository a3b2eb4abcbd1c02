use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// 批次取消信号: 显式取消或到达截止时间
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            deadline: None,
        }
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        let mut token = Self::new();
        token.deadline = Some(Instant::now() + timeout);
        token
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// 等待取消 (显式取消或截止时间先到者)
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let flagged = async move {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flagged => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => flagged.await,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
