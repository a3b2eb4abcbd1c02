use crate::error::{RepositoryError, StoreError};
use crate::models::{Applicant, BatchMatchSummary, Match, MatchUpsert, Product};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 本次匹配的申请人范围
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantScope {
    /// 同一批次上传的申请人
    Batch(String),
    /// 指定申请人 ID
    Ids(Vec<i64>),
}

impl ApplicantScope {
    pub fn batch_id(&self) -> Option<&str> {
        match self {
            ApplicantScope::Batch(batch_id) => Some(batch_id),
            ApplicantScope::Ids(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            ApplicantScope::Batch(batch_id) => format!("batch {batch_id}"),
            ApplicantScope::Ids(ids) => format!("{} applicant id(s)", ids.len()),
        }
    }
}

/// 申请人/产品只读仓库. 同一数据库状态下必须返回确定的结果 (按 id 排序).
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_applicants(&self, scope: &ApplicantScope)
        -> Result<Vec<Applicant>, RepositoryError>;

    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError>;

    /// 可选: 在存储端用范围比较预筛 (applicant_id, product_id) 组合.
    /// 结果须为合格组合的超集 (调用方会逐对复核).
    /// 返回 None 表示不支持, 由调用方在内存中双循环筛选.
    async fn prefilter_pairs(
        &self,
        _scope: &ApplicantScope,
    ) -> Result<Option<Vec<(i64, i64)>>, RepositoryError> {
        Ok(None)
    }
}

/// 批量写入结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistOutcome {
    pub written: usize,
    pub failed: usize,
}

/// 匹配结果存储
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// 按 (applicant_id, product_id) 幂等写入; 单行失败计入 failed, 连接失败返回 Err
    async fn upsert_matches(&self, matches: &[MatchUpsert]) -> Result<PersistOutcome, StoreError>;

    /// 待通知: status = eligible 且 notified_at 为空
    async fn pending_notifications(&self, batch_id: Option<&str>)
        -> Result<Vec<Match>, StoreError>;

    /// 批次内匹配, 按分数降序
    async fn list_batch_matches(&self, batch_id: &str, limit: usize)
        -> Result<Vec<Match>, StoreError>;

    async fn batch_summary(&self, batch_id: &str) -> Result<BatchMatchSummary, StoreError>;

    /// 批量清除 (唯一的删除途径); batch_id 为空时清除全部
    async fn clear_matches(&self, batch_id: Option<&str>) -> Result<u64, StoreError>;
}
