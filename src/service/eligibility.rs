use crate::models::{Applicant, EligibilityFlags, Product};

/// 四项硬性条件, 每项独立计算 (不短路, 便于报告全部失败原因)
pub fn evaluate(applicant: &Applicant, product: &Product) -> EligibilityFlags {
    let income = applicant.monthly_income >= product.min_monthly_income;

    let credit = applicant.credit_score >= product.min_credit_score
        && product
            .max_credit_score
            .map_or(true, |max| applicant.credit_score <= max);

    let age = product.age.contains(&applicant.age);

    let employment = product.accepts(applicant.employment);

    EligibilityFlags {
        income,
        credit,
        age,
        employment,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{
        Applicant, ApplicantDraft, EmploymentCategory, Product, ProductDraft,
    };
    use bigdecimal::BigDecimal;

    pub fn applicant(id: i64, income: i64, credit: i32, employment: &str, age: i32) -> Applicant {
        let new = ApplicantDraft {
            external_id: format!("U-{id:03}"),
            monthly_income: BigDecimal::from(income),
            credit_score: credit,
            employment: employment.to_string(),
            age,
            batch_id: Some("batch-1".to_string()),
        }
        .validate()
        .unwrap();
        Applicant::from_new(id, new)
    }

    /// 25000 / 700 / 21-60 / employed + self_employed, 10%-16%, 5万-200万, 12-60 期
    pub fn product(id: i64) -> Product {
        let new = ProductDraft {
            provider_name: "Axis".to_string(),
            product_name: format!("Personal {id}"),
            interest_rate_min: BigDecimal::from(10),
            interest_rate_max: BigDecimal::from(16),
            loan_amount_min: BigDecimal::from(50000),
            loan_amount_max: BigDecimal::from(2000000),
            tenure_min_months: 12,
            tenure_max_months: 60,
            min_monthly_income: BigDecimal::from(25000),
            min_credit_score: 700,
            max_credit_score: None,
            min_age: 21,
            max_age: 60,
            accepted_employment: vec!["employed".to_string(), "self_employed".to_string()],
            is_active: true,
        }
        .validate()
        .unwrap();
        Product::from_new(id, new)
    }

    pub fn with_employment(mut product: Product, accepted: &[EmploymentCategory]) -> Product {
        product.accepted_employment = accepted.to_vec();
        product
    }
}
