use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 流水线阶段, 按执行顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Generated,
    Scored,
    Ranked,
    Assessed,
    Persisted,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Generated => "generated",
            PipelineStage::Scored => "scored",
            PipelineStage::Ranked => "ranked",
            PipelineStage::Assessed => "assessed",
            PipelineStage::Persisted => "persisted",
        }
    }
}

/// 批次最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Failed,
    Cancelled,
}

/// 单阶段进出数量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageCount {
    pub entered: usize,
    pub passed: usize,
}

impl StageCount {
    pub fn filtered_out(&self) -> usize {
        self.entered.saturating_sub(self.passed)
    }
}

/// 各阶段统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub applicants: usize,
    pub products: usize,
    /// Stage 1: 入 = 全部组合数
    pub generation: StageCount,
    /// Stage 2: 评分 + 还款能力
    pub scoring: StageCount,
    /// 排序截断
    pub ranking: StageCount,
    /// Stage 3: 定性评估
    pub assessment: StageCount,
    /// 写库: passed = 成功写入行数
    pub persistence: StageCount,
    /// 行级写入失败数
    pub persist_failures: usize,
    /// Stage 3 兜底判定数量 (服务异常)
    pub assessment_fallbacks: usize,
}

/// 返回给调用方的批次汇总 (任何情况下都会返回)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub batch_id: Option<String>,
    pub status: BatchStatus,
    /// 最后完成的阶段; None 表示 Stage 1 未完成
    pub reached_stage: Option<PipelineStage>,
    pub counts: StageCounts,
    pub final_matches: usize,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
}

impl PipelineSummary {
    pub fn is_completed(&self) -> bool {
        self.status == BatchStatus::Completed
    }
}

/// 批次匹配统计 (查询接口)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BatchMatchSummary {
    pub batch_id: String,
    pub total_applicants: i64,
    pub total_products: i64,
    pub total_matches: i64,
    pub applicants_with_matches: i64,
    pub avg_matches_per_applicant: f64,
    pub sql_filter_matches: i64,
    pub logic_filter_matches: i64,
    pub llm_check_matches: i64,
}
