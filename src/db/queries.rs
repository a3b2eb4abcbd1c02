//! Postgres 查询. 期望的表结构 (迁移不在本服务内):
//!
//! - `applicants(id BIGSERIAL PK, external_id TEXT UNIQUE, monthly_income NUMERIC,
//!   credit_score INT, employment_category TEXT, age INT, batch_id TEXT,
//!   is_active BOOL, created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ)`
//! - `loan_products(id BIGSERIAL PK, provider_name TEXT, product_name TEXT,
//!   interest_rate_min/max NUMERIC, loan_amount_min/max NUMERIC,
//!   tenure_min_months/tenure_max_months INT, min_monthly_income NUMERIC,
//!   min_credit_score INT, max_credit_score INT NULL, min_age/max_age INT,
//!   accepted_employment TEXT[], is_active BOOL, created_at, updated_at,
//!   UNIQUE(provider_name, product_name))`
//! - `matches(id BIGSERIAL PK, applicant_id BIGINT, product_id BIGINT,
//!   match_score FLOAT8, status TEXT, match_source TEXT, income_eligible BOOL,
//!   credit_score_eligible BOOL, age_eligible BOOL, employment_eligible BOOL,
//!   llm_analysis TEXT NULL, llm_confidence FLOAT8 NULL, batch_id TEXT NULL,
//!   created_at, updated_at, notified_at TIMESTAMPTZ NULL,
//!   UNIQUE(applicant_id, product_id))`

use crate::db::repository::{ApplicantScope, PersistOutcome};
use crate::error::{is_connectivity_error, StoreError};
use crate::models::{
    ApplicantRow, BatchMatchSummary, Match, MatchRow, MatchUpsert, NewApplicant, NewProduct,
    ProductRow,
};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::io::Write;
use std::time::Duration;

const APPLICANT_COLUMNS: &str = "id, external_id, monthly_income, credit_score, \
     employment_category, age, batch_id";

const PRODUCT_COLUMNS: &str = "id, provider_name, product_name, interest_rate_min, \
     interest_rate_max, loan_amount_min, loan_amount_max, tenure_min_months, tenure_max_months, \
     min_monthly_income, min_credit_score, max_credit_score, min_age, max_age, \
     accepted_employment, is_active";

const MATCH_COLUMNS: &str = "id, applicant_id, product_id, match_score, status, match_source, \
     income_eligible, credit_score_eligible, age_eligible, employment_eligible, \
     llm_analysis, llm_confidence, batch_id, created_at, updated_at, notified_at";

/// 查询批次内的有效申请人
pub async fn list_applicants_by_batch(
    pool: &PgPool,
    batch_id: &str,
) -> Result<Vec<ApplicantRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicantRow>(&format!(
        "SELECT {APPLICANT_COLUMNS} FROM applicants \
         WHERE batch_id = $1 AND is_active = true ORDER BY id"
    ))
    .bind(batch_id)
    .fetch_all(pool)
    .await
}

/// 按 ID 查询有效申请人
pub async fn list_applicants_by_ids(
    pool: &PgPool,
    ids: &[i64],
) -> Result<Vec<ApplicantRow>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, ApplicantRow>(&format!(
        "SELECT {APPLICANT_COLUMNS} FROM applicants \
         WHERE id = ANY($1) AND is_active = true ORDER BY id"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await
}

/// 查询全部上架产品
pub async fn list_active_products(pool: &PgPool) -> Result<Vec<ProductRow>, sqlx::Error> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM loan_products WHERE is_active = true ORDER BY id"
    ))
    .fetch_all(pool)
    .await
}

/// Stage 1 数据库端预筛: 一条 CROSS JOIN 范围查询过滤收入/信用分/年龄.
/// 就业类别库内是原始文本, 归一化后才可比较, 交给内存复核判定.
pub async fn prefilter_pairs(
    pool: &PgPool,
    scope: &ApplicantScope,
) -> Result<Vec<(i64, i64)>, sqlx::Error> {
    let sql = prefilter_sql(scope);
    let query = sqlx::query_as::<_, (i64, i64)>(&sql);
    let query = match scope {
        ApplicantScope::Batch(batch_id) => query.bind(batch_id.clone()),
        ApplicantScope::Ids(ids) => query.bind(ids.clone()),
    };
    query.fetch_all(pool).await
}

fn prefilter_sql(scope: &ApplicantScope) -> String {
    let scope_clause = match scope {
        ApplicantScope::Batch(_) => "a.batch_id = $1",
        ApplicantScope::Ids(_) => "a.id = ANY($1)",
    };

    format!(
        r#"
        SELECT a.id AS applicant_id, p.id AS product_id
        FROM applicants a
        CROSS JOIN loan_products p
        WHERE a.is_active = true
          AND p.is_active = true
          AND a.monthly_income >= p.min_monthly_income
          AND a.credit_score >= p.min_credit_score
          AND (p.max_credit_score IS NULL OR a.credit_score <= p.max_credit_score)
          AND a.age >= p.min_age
          AND a.age <= p.max_age
          AND {scope_clause}
        ORDER BY a.id, p.id
        "#
    )
}

/// 写入申请人; 相同 external_id 重新上传时覆盖财务字段
pub async fn upsert_applicant(pool: &PgPool, applicant: &NewApplicant) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO applicants (
            external_id, monthly_income, credit_score, employment_category, age, batch_id,
            is_active, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, true, $7, $7)
        ON CONFLICT (external_id) DO UPDATE SET
            monthly_income = EXCLUDED.monthly_income,
            credit_score = EXCLUDED.credit_score,
            employment_category = EXCLUDED.employment_category,
            age = EXCLUDED.age,
            batch_id = EXCLUDED.batch_id,
            updated_at = EXCLUDED.updated_at
        RETURNING id
        "#,
    )
    .bind(&applicant.external_id)
    .bind(&applicant.monthly_income)
    .bind(applicant.credit_score)
    .bind(applicant.employment.as_str())
    .bind(applicant.age)
    .bind(&applicant.batch_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

/// 写入产品 (provider_name + product_name 唯一)
pub async fn upsert_product(pool: &PgPool, product: &NewProduct) -> Result<i64, sqlx::Error> {
    let accepted: Vec<String> = product
        .accepted_employment
        .iter()
        .map(|e| e.as_str().to_string())
        .collect();

    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO loan_products (
            provider_name, product_name, interest_rate_min, interest_rate_max,
            loan_amount_min, loan_amount_max, tenure_min_months, tenure_max_months,
            min_monthly_income, min_credit_score, max_credit_score, min_age, max_age,
            accepted_employment, is_active, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
        ON CONFLICT (provider_name, product_name) DO UPDATE SET
            interest_rate_min = EXCLUDED.interest_rate_min,
            interest_rate_max = EXCLUDED.interest_rate_max,
            loan_amount_min = EXCLUDED.loan_amount_min,
            loan_amount_max = EXCLUDED.loan_amount_max,
            tenure_min_months = EXCLUDED.tenure_min_months,
            tenure_max_months = EXCLUDED.tenure_max_months,
            min_monthly_income = EXCLUDED.min_monthly_income,
            min_credit_score = EXCLUDED.min_credit_score,
            max_credit_score = EXCLUDED.max_credit_score,
            min_age = EXCLUDED.min_age,
            max_age = EXCLUDED.max_age,
            accepted_employment = EXCLUDED.accepted_employment,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at
        RETURNING id
        "#,
    )
    .bind(&product.provider_name)
    .bind(&product.product_name)
    .bind(&product.interest_rate.min)
    .bind(&product.interest_rate.max)
    .bind(&product.loan_amount.min)
    .bind(&product.loan_amount.max)
    .bind(product.tenure_months.min)
    .bind(product.tenure_months.max)
    .bind(&product.min_monthly_income)
    .bind(product.min_credit_score)
    .bind(product.max_credit_score)
    .bind(product.age.min)
    .bind(product.age.max)
    .bind(&accepted)
    .bind(product.is_active)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

const UPSERT_MATCH_SQL: &str = r#"
    INSERT INTO matches (
        applicant_id, product_id, match_score, status, match_source,
        income_eligible, credit_score_eligible, age_eligible, employment_eligible,
        llm_analysis, llm_confidence, batch_id, created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
    ON CONFLICT (applicant_id, product_id) DO UPDATE SET
        match_score = EXCLUDED.match_score,
        status = EXCLUDED.status,
        match_source = EXCLUDED.match_source,
        income_eligible = EXCLUDED.income_eligible,
        credit_score_eligible = EXCLUDED.credit_score_eligible,
        age_eligible = EXCLUDED.age_eligible,
        employment_eligible = EXCLUDED.employment_eligible,
        llm_analysis = EXCLUDED.llm_analysis,
        llm_confidence = EXCLUDED.llm_confidence,
        batch_id = EXCLUDED.batch_id,
        updated_at = EXCLUDED.updated_at
"#;

/// 批量 upsert 匹配结果: 单事务, 每行一个 SAVEPOINT, 单行失败不影响其余行
pub async fn upsert_matches(
    pool: &PgPool,
    matches: &[MatchUpsert],
) -> Result<PersistOutcome, StoreError> {
    if matches.is_empty() {
        return Ok(PersistOutcome::default());
    }

    tracing::debug!("开始批量写入匹配结果, {} 条记录", matches.len());
    let start_time = std::time::Instant::now();

    // 超时控制: 30秒
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        let mut tx = pool.begin().await?;
        let outcome = upsert_in_transaction(&mut tx, matches).await?;
        tx.commit().await?;
        Ok::<_, StoreError>(outcome)
    })
    .await;

    match result {
        Ok(Ok(outcome)) => {
            tracing::info!(
                "✓ matches upsert 完成, 成功 {} 行, 失败 {} 行, 耗时: {:?}",
                outcome.written,
                outcome.failed,
                start_time.elapsed()
            );
            Ok(outcome)
        }
        Ok(Err(e)) => {
            tracing::error!("✗ matches upsert 失败, 耗时: {:?}, 错误: {}", start_time.elapsed(), e);
            Err(e)
        }
        Err(_) => {
            tracing::error!("✗ matches upsert 超时 (>30秒)!");
            Err(StoreError::Unavailable("match upsert timed out after 30s".to_string()))
        }
    }
}

async fn upsert_in_transaction(
    tx: &mut Transaction<'static, Postgres>,
    matches: &[MatchUpsert],
) -> Result<PersistOutcome, StoreError> {
    let mut outcome = PersistOutcome::default();
    let now = Utc::now();

    for m in matches {
        sqlx::query("SAVEPOINT match_row").execute(&mut **tx).await?;

        let result = sqlx::query(UPSERT_MATCH_SQL)
            .bind(m.applicant_id)
            .bind(m.product_id)
            .bind(m.match_score)
            .bind(m.status.as_str())
            .bind(m.match_source.as_str())
            .bind(m.income_eligible)
            .bind(m.credit_score_eligible)
            .bind(m.age_eligible)
            .bind(m.employment_eligible)
            .bind(&m.llm_analysis)
            .bind(m.llm_confidence)
            .bind(&m.batch_id)
            .bind(now)
            .execute(&mut **tx)
            .await;

        match result {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT match_row").execute(&mut **tx).await?;
                outcome.written += 1;
            }
            Err(e) if is_connectivity_error(&e) => {
                return Err(StoreError::Unavailable(e.to_string()));
            }
            Err(e) => {
                tracing::warn!(
                    "match row ({}, {}) 写入失败, 跳过: {}",
                    m.applicant_id,
                    m.product_id,
                    e
                );
                sqlx::query("ROLLBACK TO SAVEPOINT match_row").execute(&mut **tx).await?;
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

fn into_matches(rows: Vec<MatchRow>) -> Result<Vec<Match>, StoreError> {
    rows.into_iter()
        .map(|row| Match::try_from(row).map_err(StoreError::Query))
        .collect()
}

/// 待通知匹配 (通知方负责设置 notified_at)
pub async fn pending_notifications(
    pool: &PgPool,
    batch_id: Option<&str>,
) -> Result<Vec<Match>, StoreError> {
    let rows = sqlx::query_as::<_, MatchRow>(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches \
         WHERE status = 'eligible' AND notified_at IS NULL \
           AND ($1::text IS NULL OR batch_id = $1) \
         ORDER BY applicant_id, match_score DESC"
    ))
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    into_matches(rows)
}

/// 批次内匹配 (按分数降序)
pub async fn list_batch_matches(
    pool: &PgPool,
    batch_id: &str,
    limit: usize,
) -> Result<Vec<Match>, StoreError> {
    let rows = sqlx::query_as::<_, MatchRow>(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches WHERE batch_id = $1 \
         ORDER BY match_score DESC, applicant_id, product_id LIMIT $2"
    ))
    .bind(batch_id)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    into_matches(rows)
}

/// 批次统计
pub async fn batch_summary(pool: &PgPool, batch_id: &str) -> Result<BatchMatchSummary, StoreError> {
    let summary = sqlx::query_as::<_, BatchMatchSummary>(
        r#"
        SELECT
            $1::text AS batch_id,
            (SELECT COUNT(*) FROM applicants WHERE batch_id = $1) AS total_applicants,
            (SELECT COUNT(*) FROM loan_products WHERE is_active = true) AS total_products,
            COUNT(*) AS total_matches,
            COUNT(DISTINCT applicant_id) AS applicants_with_matches,
            COALESCE(COUNT(*)::float8 / NULLIF(COUNT(DISTINCT applicant_id), 0), 0)
                AS avg_matches_per_applicant,
            COUNT(*) FILTER (WHERE match_source = 'sql_filter') AS sql_filter_matches,
            COUNT(*) FILTER (WHERE match_source = 'logic_filter') AS logic_filter_matches,
            COUNT(*) FILTER (WHERE match_source = 'llm_check') AS llm_check_matches
        FROM matches
        WHERE batch_id = $1 AND status = 'eligible'
        "#,
    )
    .bind(batch_id)
    .fetch_one(pool)
    .await?;

    Ok(summary)
}

/// 批量清除匹配结果
pub async fn clear_matches(pool: &PgPool, batch_id: Option<&str>) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM matches WHERE ($1::text IS NULL OR batch_id = $1)")
        .bind(batch_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

fn option_to_csv<T: ToString>(val: &Option<T>) -> String {
    val.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// 导出匹配结果为 CSV (带表头)
pub fn export_to_csv<W: Write>(matches: &[Match], writer: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    writer.write_record([
        "applicant_id",
        "product_id",
        "match_score",
        "status",
        "match_source",
        "income_eligible",
        "credit_score_eligible",
        "age_eligible",
        "employment_eligible",
        "llm_confidence",
        "llm_analysis",
        "batch_id",
        "updated_at",
        "notified_at",
    ])?;

    for m in matches {
        writer.write_record(&[
            m.applicant_id.to_string(),
            m.product_id.to_string(),
            format!("{:.2}", m.match_score),
            m.status.to_string(),
            m.match_source.to_string(),
            m.income_eligible.to_string(),
            m.credit_score_eligible.to_string(),
            m.age_eligible.to_string(),
            m.employment_eligible.to_string(),
            option_to_csv(&m.llm_confidence),
            m.llm_analysis.clone().unwrap_or_default(),
            m.batch_id.clone().unwrap_or_default(),
            m.updated_at.to_rfc3339(),
            m.notified_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
