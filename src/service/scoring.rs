use crate::models::applicant::MAX_CREDIT_SCORE;
use crate::models::{Applicant, MatchCandidate, Product};
use bigdecimal::ToPrimitive;
use indexmap::IndexMap;
use rayon::prelude::*;

/// 评分权重 (合计 100)
pub const CREDIT_WEIGHT: f64 = 40.0;
pub const INCOME_WEIGHT: f64 = 30.0;
pub const AGE_WEIGHT: f64 = 15.0;
pub const EMPLOYMENT_WEIGHT: f64 = 15.0;

/// 收入超过门槛 2 倍时收入分拿满
pub const INCOME_SATURATION: f64 = 2.0;
/// 月供上限占月收入比例
pub const AFFORDABILITY_RATIO: f64 = 0.5;

/// 匹配分数 [0, 100], 纯函数
pub fn score(applicant: &Applicant, product: &Product) -> f64 {
    let total = credit_points(applicant, product)
        + income_points(applicant, product)
        + age_points(applicant, product)
        + employment_points(applicant, product);
    total.clamp(0.0, 100.0)
}

fn credit_points(applicant: &Applicant, product: &Product) -> f64 {
    let min = product.min_credit_score;
    if applicant.credit_score < min {
        return 0.0;
    }
    if min >= MAX_CREDIT_SCORE {
        return CREDIT_WEIGHT;
    }
    let span = f64::from(MAX_CREDIT_SCORE - min);
    let above = f64::from(applicant.credit_score - min);
    (CREDIT_WEIGHT * above / span).clamp(0.0, CREDIT_WEIGHT)
}

fn income_points(applicant: &Applicant, product: &Product) -> f64 {
    let income = applicant.monthly_income.to_f64().unwrap_or(0.0);
    let min = product.min_monthly_income.to_f64().unwrap_or(0.0);
    if income < min {
        return 0.0;
    }
    if min <= 0.0 {
        return INCOME_WEIGHT;
    }
    let ratio = ((income - min) / (INCOME_SATURATION * min)).min(1.0);
    (INCOME_WEIGHT * ratio).clamp(0.0, INCOME_WEIGHT)
}

fn age_points(applicant: &Applicant, product: &Product) -> f64 {
    if product.age.contains(&applicant.age) {
        AGE_WEIGHT
    } else {
        0.0
    }
}

fn employment_points(applicant: &Applicant, product: &Product) -> f64 {
    if product.accepts(applicant.employment) {
        EMPLOYMENT_WEIGHT
    } else {
        0.0
    }
}

/// 等额本息月供: P·r / (1 − (1+r)^−n), r 为月利率.
/// 期数很大时 (1+r)^−n 趋于 0, 月供收敛到 P·r, 不会溢出.
/// r == 0 或期数非法时返回 None (不做还款能力校验).
pub fn monthly_installment(principal: f64, annual_rate_percent: f64, months: i32) -> Option<f64> {
    let r = annual_rate_percent / 100.0 / 12.0;
    if r <= 0.0 || months <= 0 || !r.is_finite() {
        return None;
    }
    let discount = (1.0 + r).powi(-months);
    Some(principal * r / (1.0 - discount))
}

/// 还款能力: 按最低贷款额、最高利率、最长期限估算月供, 不超过 收入 × 0.5 × buffer
pub fn is_affordable(applicant: &Applicant, product: &Product, buffer: f64) -> bool {
    let principal = product.loan_amount.min.to_f64().unwrap_or(0.0);
    let rate = product.interest_rate.max.to_f64().unwrap_or(0.0);

    match monthly_installment(principal, rate, product.tenure_months.max) {
        Some(installment) => {
            let income = applicant.monthly_income.to_f64().unwrap_or(0.0);
            installment <= income * AFFORDABILITY_RATIO * buffer
        }
        None => true,
    }
}

/// Stage 2: 还款能力过滤 + 评分. 保持输入顺序.
pub fn score_and_filter(
    candidates: Vec<MatchCandidate>,
    applicants: &IndexMap<i64, Applicant>,
    products: &IndexMap<i64, Product>,
    affordability_buffer: f64,
) -> Vec<MatchCandidate> {
    candidates
        .into_par_iter()
        .filter_map(|mut candidate| {
            let applicant = applicants.get(&candidate.applicant_id)?;
            let product = products.get(&candidate.product_id)?;

            if !is_affordable(applicant, product, affordability_buffer) {
                tracing::debug!(
                    "applicant {} x product {} 还款能力不足, 过滤",
                    applicant.id,
                    product.id
                );
                return None;
            }

            candidate.score = score(applicant, product);
            Some(candidate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::eligibility::evaluate;
    use crate::service::eligibility::fixtures::{applicant, product};
    use bigdecimal::BigDecimal;

    #[test]
    fn strong_applicant_scores_at_least_sixty() {
        let s = score(&applicant(1, 60000, 780, "employed", 35), &product(1));
        // credit 40*80/200 = 16, income 30*35000/50000 = 21, age 15, employment 15
        assert!((s - 67.0).abs() < 1e-9);
        assert!(s >= 60.0);
    }

    #[test]
    fn minimum_qualifying_applicant_scores_above_zero_but_below_strong() {
        let p = product(1);
        let minimal = applicant(1, 25000, 700, "employed", 21);
        let strong = applicant(2, 60000, 780, "employed", 35);
        assert!(evaluate(&minimal, &p).all_passed());

        let minimal_score = score(&minimal, &p);
        assert!((minimal_score - 30.0).abs() < 1e-9);
        assert!(minimal_score > 0.0);
        assert!(minimal_score < score(&strong, &p));
    }

    #[test]
    fn score_stays_within_bounds_at_extremes() {
        let p = product(1);
        for a in [
            applicant(1, 0, 300, "student", 18),
            applicant(2, 10_000_000, 900, "employed", 60),
            applicant(3, 25000, 700, "retired", 120),
        ] {
            let s = score(&a, &p);
            assert!((0.0..=100.0).contains(&s), "score {s} out of bounds");
        }
        assert_eq!(score(&applicant(4, 10_000_000, 900, "employed", 40), &p), 100.0);
    }

    #[test]
    fn degenerate_thresholds_award_full_points() {
        let mut p = product(1);
        p.min_credit_score = 900;
        p.min_monthly_income = BigDecimal::from(0);
        let a = applicant(1, 1000, 900, "employed", 30);
        assert_eq!(credit_points(&a, &p), CREDIT_WEIGHT);
        assert_eq!(income_points(&a, &p), INCOME_WEIGHT);
    }

    #[test]
    fn installment_matches_amortization_formula() {
        // 100000 @ 12% / 12 期 ≈ 8884.88
        let emi = monthly_installment(100000.0, 12.0, 12).unwrap();
        assert!((emi - 8884.88).abs() < 0.01);
        assert!(monthly_installment(100000.0, 0.0, 12).is_none());
    }

    #[test]
    fn very_long_tenure_converges_to_interest_only() {
        // 50000 @ 16% 的月利息 ≈ 666.67
        let emi = monthly_installment(50000.0, 16.0, 120_000).unwrap();
        assert!(emi.is_finite());
        assert!((emi - 50000.0 * 0.16 / 12.0).abs() < 0.01);

        let mut p = product(1);
        p.tenure_months.max = 120_000;
        assert!(is_affordable(&applicant(1, 60000, 780, "employed", 35), &p, 2.0));
    }

    #[test]
    fn unaffordable_product_is_filtered() {
        let mut p = product(1);
        p.loan_amount.min = BigDecimal::from(5_000_000);
        let a = applicant(1, 25000, 720, "employed", 30);
        // 月供 ≈ 121,600 > 25000 × 0.5 × 2
        assert!(!is_affordable(&a, &p, 2.0));
        assert!(is_affordable(&a, &product(1), 2.0));
    }

    #[test]
    fn stage_two_output_is_subset_in_input_order() {
        let mut expensive = product(2);
        expensive.loan_amount.min = BigDecimal::from(5_000_000);
        let applicants: IndexMap<i64, Applicant> = [applicant(1, 26000, 720, "employed", 30)]
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        let products: IndexMap<i64, Product> =
            [product(1), expensive].into_iter().map(|p| (p.id, p)).collect();

        let candidates: Vec<MatchCandidate> = products
            .values()
            .map(|p| MatchCandidate::new(1, p.id, evaluate(&applicants[&1], p)))
            .collect();
        let scored = score_and_filter(candidates, &applicants, &products, 2.0);

        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].key(), (1, 1));
        assert!(scored[0].score > 0.0);
    }
}
