use crate::config::MatchingConfig;
use crate::llm::{AssessmentResponse, ReasoningService};
use crate::models::{Applicant, Assessment, MatchCandidate, Product, VerdictSource};
use crate::service::cancel::CancelToken;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};

/// 离线模式下的固定置信度
pub const OFFLINE_CONFIDENCE: f64 = 0.7;

const OFFLINE_NOTE: &str =
    "Qualitative check skipped: no reasoning service credentials configured, accepted on hard criteria";

/// Stage 3 输出
#[derive(Debug, Default)]
pub struct AssessmentOutcome {
    /// 放行的候选, 保持排序顺序, assessment 已填充
    pub accepted: Vec<MatchCandidate>,
    /// 实际完成评估的候选数
    pub evaluated: usize,
    /// 服务失败走兜底的数量
    pub fallbacks: usize,
    pub cancelled: bool,
}

enum Decision {
    Accept(Assessment),
    Decline,
}

/// 请求发起节流: 两次发起之间至少间隔 min_interval
struct Pacer {
    interval: Option<Interval>,
}

impl Pacer {
    fn new(min_interval: Duration) -> Self {
        let interval = (!min_interval.is_zero()).then(|| {
            let mut interval = tokio::time::interval(min_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { interval }
    }

    async fn wait(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }
    }
}

/// Stage 3 定性评估
pub struct QualitativeAssessor {
    service: Option<Arc<dyn ReasoningService>>,
    fallback_threshold: f64,
    concurrency: usize,
    min_interval: Duration,
    timeout: Duration,
}

impl QualitativeAssessor {
    pub fn new(service: Option<Arc<dyn ReasoningService>>, config: &MatchingConfig) -> Self {
        Self {
            service,
            fallback_threshold: config.fallback_score_threshold,
            concurrency: config.assessment_concurrency.max(1),
            min_interval: config.assessment_min_interval(),
            timeout: config.assessment_timeout(),
        }
    }

    pub fn offline(config: &MatchingConfig) -> Self {
        Self::new(None, config)
    }

    pub fn is_offline(&self) -> bool {
        self.service.is_none()
    }

    /// 并发评估全部候选; 结果与完成顺序无关, 取消时返回已判定部分
    pub async fn assess_all(
        &self,
        candidates: Vec<MatchCandidate>,
        applicants: &IndexMap<i64, Applicant>,
        products: &IndexMap<i64, Product>,
        cancel: &CancelToken,
    ) -> AssessmentOutcome {
        let mut outcome = AssessmentOutcome::default();
        if candidates.is_empty() {
            return outcome;
        }
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let Some(service) = self.service.clone() else {
            outcome.evaluated = candidates.len();
            outcome.accepted = candidates
                .into_iter()
                .map(|mut c| {
                    c.assessment = Some(Assessment {
                        source: VerdictSource::Offline,
                        confidence: Some(OFFLINE_CONFIDENCE),
                        reasoning: OFFLINE_NOTE.to_string(),
                    });
                    c
                })
                .collect();
            return outcome;
        };

        tracing::info!(
            "Stage 3 开始: {} 个候选, 并发 {}, 间隔 {:?}, 服务 {}",
            candidates.len(),
            self.concurrency,
            self.min_interval,
            service.name()
        );

        let pacer = Mutex::new(Pacer::new(self.min_interval));
        let service = &service;
        let pacer = &pacer;

        let decisions = stream::iter(candidates.into_iter().enumerate())
            .map(|(rank, candidate)| async move {
                let pair = applicants
                    .get(&candidate.applicant_id)
                    .zip(products.get(&candidate.product_id));
                let (decision, fell_back) = match pair {
                    Some((applicant, product)) => {
                        pacer.lock().await.wait().await;
                        self.decide(&**service, &candidate, applicant, product).await
                    }
                    None => (Decision::Decline, false),
                };
                (rank, candidate, decision, fell_back)
            })
            .buffer_unordered(self.concurrency);
        let mut decisions = std::pin::pin!(decisions);

        let mut decided = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("Stage 3 被取消, 已判定 {} 个候选", decided.len());
                    outcome.cancelled = true;
                    break;
                }
                next = decisions.next() => match next {
                    Some(item) => decided.push(item),
                    None => break,
                },
            }
        }

        decided.sort_by_key(|(rank, ..)| *rank);
        outcome.evaluated = decided.len();
        for (_, mut candidate, decision, fell_back) in decided {
            if fell_back {
                outcome.fallbacks += 1;
            }
            if let Decision::Accept(assessment) = decision {
                candidate.assessment = Some(assessment);
                outcome.accepted.push(candidate);
            }
        }

        tracing::info!(
            "Stage 3 完成: 评估 {}, 放行 {}, 兜底 {}",
            outcome.evaluated,
            outcome.accepted.len(),
            outcome.fallbacks
        );
        outcome
    }

    /// 返回 (结论, 是否走了兜底)
    async fn decide(
        &self,
        service: &dyn ReasoningService,
        candidate: &MatchCandidate,
        applicant: &Applicant,
        product: &Product,
    ) -> (Decision, bool) {
        match tokio::time::timeout(self.timeout, service.assess(applicant, product)).await {
            Ok(Ok(response)) => (service_decision(response), false),
            Ok(Err(e)) => {
                tracing::warn!(
                    "推理服务评估失败 applicant {} x product {}: {}",
                    applicant.id,
                    product.id,
                    e
                );
                (self.fallback(candidate), true)
            }
            Err(_) => {
                tracing::warn!(
                    "推理服务评估超时 ({:?}) applicant {} x product {}",
                    self.timeout,
                    applicant.id,
                    product.id
                );
                (self.fallback(candidate), true)
            }
        }
    }

    /// 服务不可用时按 Stage 2 分数兜底
    fn fallback(&self, candidate: &MatchCandidate) -> Decision {
        if candidate.score >= self.fallback_threshold {
            Decision::Accept(Assessment {
                source: VerdictSource::Fallback,
                confidence: None,
                reasoning: format!(
                    "Automatic fallback: reasoning service unavailable, approved on score {:.1} (threshold {:.1})",
                    candidate.score, self.fallback_threshold
                ),
            })
        } else {
            Decision::Decline
        }
    }
}

fn service_decision(response: AssessmentResponse) -> Decision {
    if !response.qualified {
        return Decision::Decline;
    }

    let mut reasoning = response.reasoning.trim().to_string();
    if !response.risk_factors.is_empty() {
        if !reasoning.is_empty() {
            reasoning.push(' ');
        }
        reasoning.push_str("Risk factors: ");
        reasoning.push_str(&response.risk_factors.join("; "));
    }

    Decision::Accept(Assessment {
        source: VerdictSource::Service,
        confidence: Some(response.confidence.clamp(0.0, 1.0)),
        reasoning,
    })
}
