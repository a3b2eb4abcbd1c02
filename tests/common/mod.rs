#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use loan_eligibility_rust::config::MatchingConfig;
use loan_eligibility_rust::db::{
    ApplicantScope, CatalogRepository, InMemoryRepository, MatchStore, PersistOutcome,
};
use loan_eligibility_rust::error::{LlmError, RepositoryError, StoreError};
use loan_eligibility_rust::llm::{AssessmentResponse, ReasoningService};
use loan_eligibility_rust::models::{
    Applicant, ApplicantDraft, BatchMatchSummary, Match, MatchUpsert, Product, ProductDraft,
};
use loan_eligibility_rust::{MatchingPipeline, QualitativeAssessor};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const BATCH_A: &str = "batch-a";
pub const BATCH_B: &str = "batch-b";

/// 标准数据集的 id
pub struct Seeded {
    pub strong: Applicant,
    pub low_credit: Applicant,
    pub student: Applicant,
    pub minimal: Applicant,
    pub other_batch: Applicant,
    /// 25000 / 700 / 21-60 / employed + self_employed
    pub personal: Product,
    /// 15000 / 650 / 18-70 / 不限就业
    pub starter: Product,
    pub retired_product: Product,
}

pub fn applicant_draft(
    external_id: &str,
    income: i64,
    credit: i32,
    employment: &str,
    age: i32,
    batch_id: &str,
) -> ApplicantDraft {
    ApplicantDraft {
        external_id: external_id.to_string(),
        monthly_income: BigDecimal::from(income),
        credit_score: credit,
        employment: employment.to_string(),
        age,
        batch_id: Some(batch_id.to_string()),
    }
}

pub fn personal_loan() -> ProductDraft {
    ProductDraft {
        provider_name: "Axis".to_string(),
        product_name: "Personal Plus".to_string(),
        interest_rate_min: BigDecimal::from(10),
        interest_rate_max: BigDecimal::from(16),
        loan_amount_min: BigDecimal::from(50_000),
        loan_amount_max: BigDecimal::from(2_000_000),
        tenure_min_months: 12,
        tenure_max_months: 60,
        min_monthly_income: BigDecimal::from(25_000),
        min_credit_score: 700,
        max_credit_score: None,
        min_age: 21,
        max_age: 60,
        accepted_employment: vec!["Salaried".to_string(), "self-employed".to_string()],
        is_active: true,
    }
}

pub fn starter_loan() -> ProductDraft {
    ProductDraft {
        provider_name: "Kotak".to_string(),
        product_name: "Starter".to_string(),
        interest_rate_min: BigDecimal::from(12),
        interest_rate_max: BigDecimal::from(18),
        loan_amount_min: BigDecimal::from(20_000),
        loan_amount_max: BigDecimal::from(500_000),
        tenure_min_months: 6,
        tenure_max_months: 36,
        min_monthly_income: BigDecimal::from(15_000),
        min_credit_score: 650,
        max_credit_score: None,
        min_age: 18,
        max_age: 70,
        accepted_employment: Vec::new(),
        is_active: true,
    }
}

/// batch-a: strong / low_credit / student / minimal; batch-b: other_batch.
///
/// Stage 1 通过的组合 (按申请人, 产品顺序):
/// strong×personal(67), strong×starter(80.8), low_credit×starter(60),
/// student×starter(46.2), minimal×personal(30), minimal×starter(48)
pub async fn seed(repo: &InMemoryRepository) -> Seeded {
    let personal = repo.insert_product(personal_loan().validate().unwrap()).await;
    let starter = repo.insert_product(starter_loan().validate().unwrap()).await;
    let mut retired = personal_loan();
    retired.product_name = "Legacy".to_string();
    retired.is_active = false;
    let retired_product = repo.insert_product(retired.validate().unwrap()).await;

    let strong = add(repo, applicant_draft("U-STRONG", 60_000, 780, "employed", 35, BATCH_A)).await;
    let low_credit =
        add(repo, applicant_draft("U-LOWCREDIT", 60_000, 650, "full time", 35, BATCH_A)).await;
    let student = add(repo, applicant_draft("U-STUDENT", 20_000, 720, "Student", 22, BATCH_A)).await;
    let minimal = add(repo, applicant_draft("U-MIN", 25_000, 700, "employed", 21, BATCH_A)).await;
    let other_batch =
        add(repo, applicant_draft("U-OTHER", 90_000, 820, "business owner", 40, BATCH_B)).await;

    Seeded {
        strong,
        low_credit,
        student,
        minimal,
        other_batch,
        personal,
        starter,
        retired_product,
    }
}

pub async fn add(repo: &InMemoryRepository, draft: ApplicantDraft) -> Applicant {
    repo.upsert_applicant(draft.validate().unwrap()).await
}

/// 测试用策略参数: 不节流, 超时 5 秒
pub fn fast_config() -> MatchingConfig {
    MatchingConfig {
        assessment_min_interval_ms: 0,
        assessment_timeout_secs: 5,
        ..MatchingConfig::default()
    }
}

pub fn pipeline_with(
    repo: Arc<InMemoryRepository>,
    service: Option<Arc<dyn ReasoningService>>,
    config: MatchingConfig,
) -> MatchingPipeline {
    let assessor = QualitativeAssessor::new(service, &config);
    MatchingPipeline::new(repo.clone(), repo, assessor, config)
}

pub fn keys(matches: &[Match]) -> HashSet<(i64, i64)> {
    matches.iter().map(|m| (m.applicant_id, m.product_id)).collect()
}

/// 全部判定合格
pub struct QualifyAll {
    pub calls: AtomicUsize,
}

impl QualifyAll {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReasoningService for QualifyAll {
    async fn assess(
        &self,
        applicant: &Applicant,
        _product: &Product,
    ) -> Result<AssessmentResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AssessmentResponse {
            qualified: true,
            confidence: 0.9,
            reasoning: format!("{} has a clean repayment profile", applicant.external_id),
            risk_factors: vec!["limited credit history".to_string()],
        })
    }

    fn name(&self) -> &str {
        "qualify-all"
    }
}

/// 全部拒绝
pub struct DeclineAll;

#[async_trait]
impl ReasoningService for DeclineAll {
    async fn assess(&self, _: &Applicant, _: &Product) -> Result<AssessmentResponse, LlmError> {
        Ok(AssessmentResponse {
            qualified: false,
            confidence: 0.95,
            reasoning: "debt burden too high".to_string(),
            risk_factors: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "decline-all"
    }
}

/// 永远失败 (模拟 API 错误)
pub struct AlwaysFails;

#[async_trait]
impl ReasoningService for AlwaysFails {
    async fn assess(&self, _: &Applicant, _: &Product) -> Result<AssessmentResponse, LlmError> {
        Err(LlmError::Status {
            provider: "always-fails".to_string(),
            status: 503,
        })
    }

    fn name(&self) -> &str {
        "always-fails"
    }
}

/// 按申请人 id 延迟响应, 打乱完成顺序; 信用分 >= 700 才合格
pub struct Jittered {
    pub step: Duration,
}

#[async_trait]
impl ReasoningService for Jittered {
    async fn assess(
        &self,
        applicant: &Applicant,
        product: &Product,
    ) -> Result<AssessmentResponse, LlmError> {
        let reversed = 10u32.saturating_sub((applicant.id * 2 + product.id) as u32);
        tokio::time::sleep(self.step * reversed).await;
        Ok(AssessmentResponse {
            qualified: applicant.credit_score >= 700,
            confidence: 0.8,
            reasoning: format!("applicant {} product {}", applicant.id, product.id),
            risk_factors: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "jittered"
    }
}

/// 每次评估耗时固定, 全部合格
pub struct Slow {
    pub delay: Duration,
}

#[async_trait]
impl ReasoningService for Slow {
    async fn assess(&self, _: &Applicant, _: &Product) -> Result<AssessmentResponse, LlmError> {
        tokio::time::sleep(self.delay).await;
        Ok(AssessmentResponse {
            qualified: true,
            confidence: 0.6,
            reasoning: "eventually approved".to_string(),
            risk_factors: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// 仓库不可用
pub struct UnavailableCatalog;

#[async_trait]
impl CatalogRepository for UnavailableCatalog {
    async fn list_applicants(&self, _: &ApplicantScope) -> Result<Vec<Applicant>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".to_string()))
    }

    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".to_string()))
    }
}

/// 查询永不返回 (模拟挂起的数据库连接)
pub struct HangingCatalog;

#[async_trait]
impl CatalogRepository for HangingCatalog {
    async fn list_applicants(&self, _: &ApplicantScope) -> Result<Vec<Applicant>, RepositoryError> {
        std::future::pending().await
    }

    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        std::future::pending().await
    }
}

/// 返回全部组合作为 "预筛" 结果 (超集), 用于验证复核逻辑
pub struct LoosePrefilter {
    pub inner: Arc<InMemoryRepository>,
}

#[async_trait]
impl CatalogRepository for LoosePrefilter {
    async fn list_applicants(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Vec<Applicant>, RepositoryError> {
        self.inner.list_applicants(scope).await
    }

    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        self.inner.list_active_products().await
    }

    async fn prefilter_pairs(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Option<Vec<(i64, i64)>>, RepositoryError> {
        let applicants = self.inner.list_applicants(scope).await?;
        let products = self.inner.list_active_products().await?;
        let mut pairs = Vec::new();
        for product in products.iter().rev() {
            for applicant in &applicants {
                pairs.push((applicant.id, product.id));
            }
        }
        Ok(Some(pairs))
    }
}

/// 存储故障注入: 指定产品的行写入失败, 或整体连接失败
pub struct FaultyStore {
    pub inner: Arc<InMemoryRepository>,
    pub failing_products: HashSet<i64>,
    pub unavailable: bool,
}

#[async_trait]
impl MatchStore for FaultyStore {
    async fn upsert_matches(&self, matches: &[MatchUpsert]) -> Result<PersistOutcome, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection reset by peer".to_string()));
        }
        let (bad, good): (Vec<MatchUpsert>, Vec<MatchUpsert>) = matches
            .iter()
            .cloned()
            .partition(|m| self.failing_products.contains(&m.product_id));
        let mut outcome = self.inner.upsert_matches(&good).await?;
        outcome.failed += bad.len();
        Ok(outcome)
    }

    async fn pending_notifications(&self, batch_id: Option<&str>) -> Result<Vec<Match>, StoreError> {
        self.inner.pending_notifications(batch_id).await
    }

    async fn list_batch_matches(&self, batch_id: &str, limit: usize) -> Result<Vec<Match>, StoreError> {
        self.inner.list_batch_matches(batch_id, limit).await
    }

    async fn batch_summary(&self, batch_id: &str) -> Result<BatchMatchSummary, StoreError> {
        self.inner.batch_summary(batch_id).await
    }

    async fn clear_matches(&self, batch_id: Option<&str>) -> Result<u64, StoreError> {
        self.inner.clear_matches(batch_id).await
    }
}
