use crate::config::MatchingConfig;
use crate::db::{ApplicantScope, CatalogRepository, MatchStore};
use crate::error::PipelineError;
use crate::models::{BatchStatus, PipelineStage, PipelineSummary, StageCount, StageCounts};
use crate::service::assessor::QualitativeAssessor;
use crate::service::cancel::CancelToken;
use crate::service::{candidates, persister, ranker, scoring};
use std::sync::Arc;
use std::time::Instant;

/// 单次批处理的进度 (失败时作为部分结果返回)
#[derive(Default)]
struct RunProgress {
    counts: StageCounts,
    reached: Option<PipelineStage>,
    final_matches: usize,
    errors: Vec<String>,
}

/// 匹配流水线: 生成 -> 评分 -> 排序 -> 定性评估 -> 写库
pub struct MatchingPipeline {
    catalog: Arc<dyn CatalogRepository>,
    store: Arc<dyn MatchStore>,
    assessor: QualitativeAssessor,
    config: MatchingConfig,
}

impl MatchingPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        store: Arc<dyn MatchStore>,
        assessor: QualitativeAssessor,
        config: MatchingConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            assessor,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// 运行一个批次. 任何情况下都返回汇总 (失败时带部分统计).
    pub async fn run_batch(&self, scope: &ApplicantScope, cancel: &CancelToken) -> PipelineSummary {
        let start_time = Instant::now();
        tracing::info!("开始匹配: {}", scope.label());

        let mut progress = RunProgress::default();
        let status = match self.execute(scope, cancel, &mut progress).await {
            Ok(true) => BatchStatus::Completed,
            Ok(false) => {
                tracing::warn!(
                    "批次已取消 ({}), 最后完成阶段: {:?}",
                    scope.label(),
                    progress.reached.map(|s| s.as_str())
                );
                progress.errors.push("batch cancelled".to_string());
                BatchStatus::Cancelled
            }
            Err(e) => {
                tracing::error!("批次失败 ({}): {}", scope.label(), e);
                progress.errors.push(e.to_string());
                BatchStatus::Failed
            }
        };

        let elapsed = start_time.elapsed();
        tracing::info!(
            "匹配结束: {} status={:?} 写入 {} 条, 耗时: {:?}",
            scope.label(),
            status,
            progress.final_matches,
            elapsed
        );

        PipelineSummary {
            batch_id: scope.batch_id().map(str::to_string),
            status,
            reached_stage: progress.reached,
            counts: progress.counts,
            final_matches: progress.final_matches,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            errors: progress.errors,
        }
    }

    /// Ok(true) 完成, Ok(false) 被取消
    async fn execute(
        &self,
        scope: &ApplicantScope,
        cancel: &CancelToken,
        progress: &mut RunProgress,
    ) -> Result<bool, PipelineError> {
        if cancel.is_cancelled() {
            return Ok(false);
        }

        // Stage 1: 硬性条件. 仓库查询挂起时以取消/截止时间为准
        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            set = candidates::generate(self.catalog.as_ref(), scope, self.config.use_sql_prefilter) => Some(set),
        };
        let Some(set) = generated.transpose()? else {
            tracing::warn!("Stage 1 被取消: 仓库查询未完成");
            return Ok(false);
        };
        progress.counts.applicants = set.applicants.len();
        progress.counts.products = set.products.len();
        progress.counts.generation = StageCount {
            entered: set.total_pairs(),
            passed: set.candidates.len(),
        };
        progress.reached = Some(PipelineStage::Generated);
        if cancel.is_cancelled() {
            return Ok(false);
        }

        // Stage 2: 还款能力 + 评分
        let entered = set.candidates.len();
        let scored = scoring::score_and_filter(
            set.candidates,
            &set.applicants,
            &set.products,
            self.config.affordability_buffer,
        );
        progress.counts.scoring = StageCount {
            entered,
            passed: scored.len(),
        };
        progress.reached = Some(PipelineStage::Scored);
        tracing::info!("Stage 2 完成: {} -> {}", entered, scored.len());
        if cancel.is_cancelled() {
            return Ok(false);
        }

        // 排序截断
        let entered = scored.len();
        let ranked = ranker::rank(scored, self.config.max_assessment_candidates);
        progress.counts.ranking = StageCount {
            entered,
            passed: ranked.len(),
        };
        progress.reached = Some(PipelineStage::Ranked);
        if ranked.len() < entered {
            tracing::info!(
                "候选截断: {} -> {} (max_assessment_candidates={})",
                entered,
                ranked.len(),
                self.config.max_assessment_candidates
            );
        }
        if cancel.is_cancelled() {
            return Ok(false);
        }

        // Stage 3: 定性评估
        let entered = ranked.len();
        let outcome = self
            .assessor
            .assess_all(ranked, &set.applicants, &set.products, cancel)
            .await;
        progress.counts.assessment = StageCount {
            entered,
            passed: outcome.accepted.len(),
        };
        progress.counts.assessment_fallbacks = outcome.fallbacks;
        if outcome.fallbacks > 0 {
            progress.errors.push(format!(
                "Stage 3 fell back to heuristic for {} candidates due to API errors",
                outcome.fallbacks
            ));
        }
        if !outcome.cancelled {
            progress.reached = Some(PipelineStage::Assessed);
        }

        // 写库 (取消时仍写入已判定放行的候选)
        let persisted =
            persister::persist(self.store.as_ref(), &outcome.accepted, scope.batch_id()).await?;
        progress.counts.persistence = StageCount {
            entered: outcome.accepted.len(),
            passed: persisted.written,
        };
        progress.counts.persist_failures = persisted.failed;
        progress.final_matches = persisted.written;
        if persisted.failed > 0 {
            progress
                .errors
                .push(format!("{} match rows failed to persist", persisted.failed));
        }

        if outcome.cancelled {
            return Ok(false);
        }
        progress.reached = Some(PipelineStage::Persisted);
        Ok(true)
    }
}
