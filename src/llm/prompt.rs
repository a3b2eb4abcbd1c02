use crate::error::LlmError;
use crate::llm::AssessmentResponse;
use crate::models::{Applicant, Product};

/// 构建评估提示词: 申请人画像 + 产品条件, 要求严格 JSON 输出
pub fn build_prompt(applicant: &Applicant, product: &Product) -> String {
    let max_credit = product
        .max_credit_score
        .map(|max| max.to_string())
        .unwrap_or_else(|| "none".to_string());

    format!(
        r#"You are a loan eligibility expert. Evaluate if this applicant is a good candidate for this loan product.

APPLICANT PROFILE:
- Applicant ID: {external_id}
- Age: {age} years
- Monthly Income: {income}
- Credit Score: {credit}
- Employment Category: {employment}

LOAN PRODUCT:
- Name: {product_name}
- Provider: {provider_name}
- Interest Rate: {rate_min}% - {rate_max}%
- Loan Amount Range: {amount_min} - {amount_max}
- Tenure: {tenure_min} - {tenure_max} months
- Min Credit Score: {min_credit} (max: {max_credit})
- Min Monthly Income: {min_income}
- Age Range: {min_age} - {max_age} years

Respond ONLY with valid JSON in this exact format:
{{
  "qualified": true/false,
  "confidence": 0.0-1.0,
  "reasoning": "Brief explanation",
  "risk_factors": ["factor1", "factor2"]
}}

Consider:
1. Does the applicant meet all hard requirements?
2. Is their income sufficient for the monthly installment?
3. Are there any red flags or risk factors?
4. Overall likelihood of loan approval"#,
        external_id = applicant.external_id,
        age = applicant.age,
        income = applicant.monthly_income.round(0),
        credit = applicant.credit_score,
        employment = applicant.employment,
        product_name = product.product_name,
        provider_name = product.provider_name,
        rate_min = product.interest_rate.min.round(2),
        rate_max = product.interest_rate.max.round(2),
        amount_min = product.loan_amount.min.round(0),
        amount_max = product.loan_amount.max.round(0),
        tenure_min = product.tenure_months.min,
        tenure_max = product.tenure_months.max,
        min_credit = product.min_credit_score,
        max_credit = max_credit,
        min_income = product.min_monthly_income.round(0),
        min_age = product.age.min,
        max_age = product.age.max,
    )
}

/// 模型输出中第一个 `{` 到最后一个 `}` 之间的片段 (可去掉 markdown 代码块包裹)
pub fn json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 解析模型文本为结论; confidence 截断到 [0, 1]
pub fn parse_assessment(provider: &str, text: &str) -> Result<AssessmentResponse, LlmError> {
    let json = json_span(text).ok_or_else(|| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: "no JSON object in response".to_string(),
    })?;
    let mut response: AssessmentResponse =
        serde_json::from_str(json).map_err(|e| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("malformed assessment JSON: {e}"),
        })?;

    if !response.confidence.is_finite() {
        return Err(LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "confidence is not a number".to_string(),
        });
    }
    response.confidence = response.confidence.clamp(0.0, 1.0);
    Ok(response)
}
