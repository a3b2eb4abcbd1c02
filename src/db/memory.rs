use crate::db::repository::{ApplicantScope, CatalogRepository, MatchStore, PersistOutcome};
use crate::error::{RepositoryError, StoreError};
use crate::models::{
    Applicant, BatchMatchSummary, Match, MatchSource, MatchStatus, MatchUpsert, NewApplicant,
    NewProduct, Product,
};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use std::collections::HashSet;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    next_applicant_id: i64,
    next_product_id: i64,
    next_match_id: i64,
    /// external_id -> 申请人
    applicants: IndexMap<String, Applicant>,
    products: IndexMap<i64, Product>,
    matches: IndexMap<(i64, i64), Match>,
}

/// 内存仓库 (离线运行与测试), 行为与 PgRepository 一致
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 相同 external_id 覆盖原记录并保留 id
    pub async fn upsert_applicant(&self, new: NewApplicant) -> Applicant {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let id = match state.applicants.get(&new.external_id).map(|a| a.id) {
            Some(id) => id,
            None => {
                state.next_applicant_id += 1;
                state.next_applicant_id
            }
        };
        let applicant = Applicant::from_new(id, new);
        state
            .applicants
            .insert(applicant.external_id.clone(), applicant.clone());
        applicant
    }

    pub async fn insert_product(&self, new: NewProduct) -> Product {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.next_product_id += 1;
        let product = Product::from_new(state.next_product_id, new);
        state.products.insert(product.id, product.clone());
        product
    }

    /// 通知方回写 notified_at
    pub async fn mark_notified(&self, applicant_id: i64, product_id: i64) -> bool {
        let mut state = self.state.write().await;
        match state.matches.get_mut(&(applicant_id, product_id)) {
            Some(m) => {
                m.notified_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub async fn all_matches(&self) -> Vec<Match> {
        self.state.read().await.matches.values().cloned().collect()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn list_applicants(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Vec<Applicant>, RepositoryError> {
        let state = self.state.read().await;
        let mut applicants: Vec<Applicant> = match scope {
            ApplicantScope::Batch(batch_id) => state
                .applicants
                .values()
                .filter(|a| a.batch_id.as_deref() == Some(batch_id.as_str()))
                .cloned()
                .collect(),
            ApplicantScope::Ids(ids) => {
                let wanted: HashSet<i64> = ids.iter().copied().collect();
                state
                    .applicants
                    .values()
                    .filter(|a| wanted.contains(&a.id))
                    .cloned()
                    .collect()
            }
        };
        applicants.sort_by_key(|a| a.id);
        Ok(applicants)
    }

    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.read().await;
        let mut products: Vec<Product> =
            state.products.values().filter(|p| p.is_active).cloned().collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }
}

#[async_trait]
impl MatchStore for InMemoryRepository {
    async fn upsert_matches(&self, matches: &[MatchUpsert]) -> Result<PersistOutcome, StoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let now = Utc::now();
        let mut outcome = PersistOutcome::default();

        for m in matches {
            let existing = state
                .matches
                .get(&m.key())
                .map(|e| (e.id, e.created_at, e.notified_at));
            let (id, created_at, notified_at) = match existing {
                Some(kept) => kept,
                None => {
                    state.next_match_id += 1;
                    (state.next_match_id, now, None)
                }
            };

            state.matches.insert(
                m.key(),
                Match {
                    id,
                    applicant_id: m.applicant_id,
                    product_id: m.product_id,
                    match_score: m.match_score,
                    status: m.status,
                    match_source: m.match_source,
                    income_eligible: m.income_eligible,
                    credit_score_eligible: m.credit_score_eligible,
                    age_eligible: m.age_eligible,
                    employment_eligible: m.employment_eligible,
                    llm_analysis: m.llm_analysis.clone(),
                    llm_confidence: m.llm_confidence,
                    batch_id: m.batch_id.clone(),
                    created_at,
                    updated_at: now,
                    notified_at,
                },
            );
            outcome.written += 1;
        }

        Ok(outcome)
    }

    async fn pending_notifications(
        &self,
        batch_id: Option<&str>,
    ) -> Result<Vec<Match>, StoreError> {
        let state = self.state.read().await;
        let mut pending: Vec<Match> = state
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Eligible && m.notified_at.is_none())
            .filter(|m| batch_id.map_or(true, |b| m.batch_id.as_deref() == Some(b)))
            .cloned()
            .collect();

        pending.sort_by(|a, b| {
            a.applicant_id
                .cmp(&b.applicant_id)
                .then(b.match_score.total_cmp(&a.match_score))
        });
        Ok(pending)
    }

    async fn list_batch_matches(
        &self,
        batch_id: &str,
        limit: usize,
    ) -> Result<Vec<Match>, StoreError> {
        let state = self.state.read().await;
        let mut matches: Vec<Match> = state
            .matches
            .values()
            .filter(|m| m.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.match_score
                .total_cmp(&a.match_score)
                .then(a.applicant_id.cmp(&b.applicant_id))
                .then(a.product_id.cmp(&b.product_id))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn batch_summary(&self, batch_id: &str) -> Result<BatchMatchSummary, StoreError> {
        let state = self.state.read().await;

        let eligible: Vec<&Match> = state
            .matches
            .values()
            .filter(|m| m.batch_id.as_deref() == Some(batch_id) && m.status == MatchStatus::Eligible)
            .collect();
        let applicants_with_matches = eligible
            .iter()
            .map(|m| m.applicant_id)
            .collect::<HashSet<_>>()
            .len() as i64;
        let total_matches = eligible.len() as i64;
        let count_source =
            |source: MatchSource| eligible.iter().filter(|m| m.match_source == source).count() as i64;

        Ok(BatchMatchSummary {
            batch_id: batch_id.to_string(),
            total_applicants: state
                .applicants
                .values()
                .filter(|a| a.batch_id.as_deref() == Some(batch_id))
                .count() as i64,
            total_products: state.products.values().filter(|p| p.is_active).count() as i64,
            total_matches,
            applicants_with_matches,
            avg_matches_per_applicant: if applicants_with_matches > 0 {
                total_matches as f64 / applicants_with_matches as f64
            } else {
                0.0
            },
            sql_filter_matches: count_source(MatchSource::SqlFilter),
            logic_filter_matches: count_source(MatchSource::LogicFilter),
            llm_check_matches: count_source(MatchSource::LlmCheck),
        })
    }

    async fn clear_matches(&self, batch_id: Option<&str>) -> Result<u64, StoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let before = state.matches.len();
        match batch_id {
            Some(b) => state.matches.retain(|_, m| m.batch_id.as_deref() != Some(b)),
            None => state.matches.clear(),
        }
        Ok((before - state.matches.len()) as u64)
    }
}
