pub mod handlers;

pub use handlers::*;

use crate::service::MatchingPipeline;
use axum::{
    routing::{delete, get, post},
    Router,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按 batch_id 加锁, 不同批次互不阻塞
#[derive(Default)]
pub struct BatchLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BatchLocks {
    /// 等待该批次的独占权; 守卫释放后若无人等待则移除条目
    pub async fn acquire(&self, batch_id: &str) -> BatchGuard<'_> {
        let lock = self
            .locks
            .entry(batch_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        BatchGuard {
            locks: self,
            batch_id: batch_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct BatchGuard<'a> {
    locks: &'a BatchLocks,
    batch_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 条目只剩 map 自身持有时才删; 等待者已 clone 的 Arc 会阻止删除
        self.locks
            .locks
            .remove_if(&self.batch_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MatchingPipeline>,
    pub batch_locks: Arc<BatchLocks>,
}

impl AppState {
    pub fn new(pipeline: Arc<MatchingPipeline>) -> Self {
        Self {
            pipeline,
            batch_locks: Arc::new(BatchLocks::default()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/match/batch", post(batch_match))
        .route("/api/matches", delete(clear_matches))
        .route("/api/matches/pending", get(pending_notifications))
        .route("/api/batches/:batch_id/matches", get(batch_matches))
        .route("/api/batches/:batch_id/summary", get(batch_summary))
        .route("/api/batches/:batch_id/export", get(export_batch))
        .with_state(state)
}
