use crate::db::queries;
use crate::db::repository::{ApplicantScope, CatalogRepository, MatchStore, PersistOutcome};
use crate::error::{RepositoryError, StoreError};
use crate::models::{
    Applicant, BatchMatchSummary, Match, MatchUpsert, NewApplicant, NewProduct, Product,
};
use async_trait::async_trait;
use sqlx::PgPool;

/// Postgres 仓库, 同时提供申请人/产品读取与匹配结果存储
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn upsert_applicant(&self, applicant: &NewApplicant) -> Result<i64, RepositoryError> {
        Ok(queries::upsert_applicant(&self.pool, applicant).await?)
    }

    pub async fn upsert_product(&self, product: &NewProduct) -> Result<i64, RepositoryError> {
        Ok(queries::upsert_product(&self.pool, product).await?)
    }
}

#[async_trait]
impl CatalogRepository for PgRepository {
    async fn list_applicants(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Vec<Applicant>, RepositoryError> {
        let rows = match scope {
            ApplicantScope::Batch(batch_id) => {
                queries::list_applicants_by_batch(&self.pool, batch_id).await?
            }
            ApplicantScope::Ids(ids) => queries::list_applicants_by_ids(&self.pool, ids).await?,
        };

        let total = rows.len();
        let mut applicants = Vec::with_capacity(total);
        for row in rows {
            let id = row.id;
            match Applicant::try_from(row) {
                Ok(applicant) => applicants.push(applicant),
                Err(e) => tracing::warn!("跳过无效申请人记录 id={}: {}", id, e),
            }
        }

        tracing::debug!("加载申请人 {}/{} 条 ({})", applicants.len(), total, scope.label());
        Ok(applicants)
    }

    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = queries::list_active_products(&self.pool).await?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match Product::try_from(row) {
                Ok(product) => products.push(product),
                Err(e) => tracing::warn!("跳过无效产品记录 id={}: {}", id, e),
            }
        }
        Ok(products)
    }

    async fn prefilter_pairs(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Option<Vec<(i64, i64)>>, RepositoryError> {
        if let ApplicantScope::Ids(ids) = scope {
            if ids.is_empty() {
                return Ok(Some(Vec::new()));
            }
        }
        let pairs = queries::prefilter_pairs(&self.pool, scope).await?;
        Ok(Some(pairs))
    }
}

#[async_trait]
impl MatchStore for PgRepository {
    async fn upsert_matches(&self, matches: &[MatchUpsert]) -> Result<PersistOutcome, StoreError> {
        queries::upsert_matches(&self.pool, matches).await
    }

    async fn pending_notifications(
        &self,
        batch_id: Option<&str>,
    ) -> Result<Vec<Match>, StoreError> {
        queries::pending_notifications(&self.pool, batch_id).await
    }

    async fn list_batch_matches(
        &self,
        batch_id: &str,
        limit: usize,
    ) -> Result<Vec<Match>, StoreError> {
        queries::list_batch_matches(&self.pool, batch_id, limit).await
    }

    async fn batch_summary(&self, batch_id: &str) -> Result<BatchMatchSummary, StoreError> {
        queries::batch_summary(&self.pool, batch_id).await
    }

    async fn clear_matches(&self, batch_id: Option<&str>) -> Result<u64, StoreError> {
        queries::clear_matches(&self.pool, batch_id).await
    }
}
