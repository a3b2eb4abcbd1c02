use crate::db::{ApplicantScope, CatalogRepository};
use crate::error::RepositoryError;
use crate::models::{Applicant, MatchCandidate, Product};
use crate::service::eligibility;
use indexmap::IndexMap;
use rayon::prelude::*;

/// Stage 1 输出: 本批次数据快照 + 通过硬性条件的候选
#[derive(Debug, Default)]
pub struct CandidateSet {
    pub applicants: IndexMap<i64, Applicant>,
    pub products: IndexMap<i64, Product>,
    pub candidates: Vec<MatchCandidate>,
    /// 是否由仓库端预筛得到
    pub prefiltered: bool,
}

impl CandidateSet {
    /// 全部 (申请人, 产品) 组合数
    pub fn total_pairs(&self) -> usize {
        self.applicants.len() * self.products.len()
    }
}

/// Stage 1: 生成候选. 仓库支持预筛时只对返回的组合复核, 结果与内存双循环一致.
pub async fn generate(
    catalog: &dyn CatalogRepository,
    scope: &ApplicantScope,
    use_prefilter: bool,
) -> Result<CandidateSet, RepositoryError> {
    let applicants = catalog.list_applicants(scope).await?;
    if applicants.is_empty() {
        tracing::info!("{} 没有申请人, 跳过候选生成", scope.label());
        return Ok(CandidateSet::default());
    }
    let products = catalog.list_active_products().await?;

    let applicants: IndexMap<i64, Applicant> =
        applicants.into_iter().map(|a| (a.id, a)).collect();
    let products: IndexMap<i64, Product> = products.into_iter().map(|p| (p.id, p)).collect();

    let pairs = if use_prefilter {
        catalog.prefilter_pairs(scope).await?
    } else {
        None
    };

    let prefiltered = pairs.is_some();
    let candidates = match pairs {
        Some(pairs) => from_pairs(&applicants, &products, pairs),
        None => cross_filter(&applicants, &products),
    };

    tracing::info!(
        "Stage 1 完成: {} 申请人 × {} 产品 = {} 组合, 通过 {} ({})",
        applicants.len(),
        products.len(),
        applicants.len() * products.len(),
        candidates.len(),
        if prefiltered { "repository prefilter" } else { "in-memory" }
    );

    Ok(CandidateSet {
        applicants,
        products,
        candidates,
        prefiltered,
    })
}

fn check(applicant: &Applicant, product: &Product) -> Option<MatchCandidate> {
    let flags = eligibility::evaluate(applicant, product);
    if flags.all_passed() {
        Some(MatchCandidate::new(applicant.id, product.id, flags))
    } else {
        tracing::debug!(
            "applicant {} x product {} 未通过: {:?}",
            applicant.id,
            product.id,
            flags.failed_criteria()
        );
        None
    }
}

/// 内存双循环 (按申请人并行), 输出顺序: 申请人顺序, 其次产品顺序
fn cross_filter(
    applicants: &IndexMap<i64, Applicant>,
    products: &IndexMap<i64, Product>,
) -> Vec<MatchCandidate> {
    let products: Vec<&Product> = products.values().collect();
    applicants
        .values()
        .collect::<Vec<_>>()
        .par_iter()
        .flat_map_iter(|applicant| products.iter().filter_map(move |product| check(applicant, product)))
        .collect()
}

/// 复核预筛组合, 排序与内存策略保持一致
fn from_pairs(
    applicants: &IndexMap<i64, Applicant>,
    products: &IndexMap<i64, Product>,
    pairs: Vec<(i64, i64)>,
) -> Vec<MatchCandidate> {
    let mut positioned: Vec<(usize, usize)> = pairs
        .into_iter()
        .filter_map(|(applicant_id, product_id)| {
            let a = applicants.get_index_of(&applicant_id)?;
            let p = products.get_index_of(&product_id)?;
            Some((a, p))
        })
        .collect();
    positioned.sort_unstable();
    positioned.dedup();

    positioned
        .into_iter()
        .filter_map(|(a, p)| {
            let (_, applicant) = applicants.get_index(a)?;
            let (_, product) = products.get_index(p)?;
            check(applicant, product)
        })
        .collect()
}
