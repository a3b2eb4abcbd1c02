use super::applicant::{EmploymentCategory, MAX_AGE, MAX_CREDIT_SCORE, MIN_AGE, MIN_CREDIT_SCORE};
use crate::error::ValidationError;
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 闭区间 [min, max], 构造时保证 max >= min
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd> ValueRange<T> {
    pub fn new(field: &'static str, min: T, max: T) -> Result<Self, ValidationError> {
        if max < min {
            return Err(ValidationError::InvertedRange { field });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: &T) -> bool {
        *value >= self.min && *value <= self.max
    }
}

/// 贷款产品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub provider_name: String,
    pub product_name: String,
    /// 年利率 (百分比, 如 10.5 表示 10.5%)
    pub interest_rate: ValueRange<BigDecimal>,
    pub loan_amount: ValueRange<BigDecimal>,
    pub tenure_months: ValueRange<i32>,
    pub min_monthly_income: BigDecimal,
    pub min_credit_score: i32,
    pub max_credit_score: Option<i32>,
    pub age: ValueRange<i32>,
    /// 空集合 = 不限就业类别
    pub accepted_employment: Vec<EmploymentCategory>,
    pub is_active: bool,
}

impl Product {
    pub fn from_new(id: i64, new: NewProduct) -> Self {
        Self {
            id,
            provider_name: new.provider_name,
            product_name: new.product_name,
            interest_rate: new.interest_rate,
            loan_amount: new.loan_amount,
            tenure_months: new.tenure_months,
            min_monthly_income: new.min_monthly_income,
            min_credit_score: new.min_credit_score,
            max_credit_score: new.max_credit_score,
            age: new.age,
            accepted_employment: new.accepted_employment,
            is_active: new.is_active,
        }
    }

    pub fn accepts(&self, employment: EmploymentCategory) -> bool {
        self.accepted_employment.is_empty() || self.accepted_employment.contains(&employment)
    }
}

/// 产品录入数据 (未校验)
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDraft {
    pub provider_name: String,
    pub product_name: String,
    pub interest_rate_min: BigDecimal,
    pub interest_rate_max: BigDecimal,
    pub loan_amount_min: BigDecimal,
    pub loan_amount_max: BigDecimal,
    pub tenure_min_months: i32,
    pub tenure_max_months: i32,
    pub min_monthly_income: BigDecimal,
    pub min_credit_score: i32,
    #[serde(default)]
    pub max_credit_score: Option<i32>,
    pub min_age: i32,
    pub max_age: i32,
    #[serde(default)]
    pub accepted_employment: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// 通过校验的产品
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub provider_name: String,
    pub product_name: String,
    pub interest_rate: ValueRange<BigDecimal>,
    pub loan_amount: ValueRange<BigDecimal>,
    pub tenure_months: ValueRange<i32>,
    pub min_monthly_income: BigDecimal,
    pub min_credit_score: i32,
    pub max_credit_score: Option<i32>,
    pub age: ValueRange<i32>,
    pub accepted_employment: Vec<EmploymentCategory>,
    pub is_active: bool,
}

impl ProductDraft {
    /// 校验所有区间 (max >= min) 与取值范围, 不合法的产品在创建时即被拒绝
    pub fn validate(self) -> Result<NewProduct, ValidationError> {
        let provider_name = self.provider_name.trim().to_string();
        if provider_name.is_empty() {
            return Err(ValidationError::EmptyField("provider_name"));
        }
        let product_name = self.product_name.trim().to_string();
        if product_name.is_empty() {
            return Err(ValidationError::EmptyField("product_name"));
        }

        let zero = BigDecimal::zero();
        let hundred = BigDecimal::from(100);
        if self.interest_rate_min < zero || self.interest_rate_max > hundred {
            return Err(ValidationError::InvalidValue {
                field: "interest_rate",
                reason: "must be within 0..=100 percent".to_string(),
            });
        }
        let interest_rate =
            ValueRange::new("interest_rate", self.interest_rate_min, self.interest_rate_max)?;

        if self.loan_amount_min < zero {
            return Err(ValidationError::InvalidValue {
                field: "loan_amount",
                reason: "cannot be negative".to_string(),
            });
        }
        let loan_amount = ValueRange::new("loan_amount", self.loan_amount_min, self.loan_amount_max)?;

        if self.tenure_min_months < 1 {
            return Err(ValidationError::InvalidValue {
                field: "tenure_months",
                reason: "must be at least 1 month".to_string(),
            });
        }
        let tenure_months =
            ValueRange::new("tenure_months", self.tenure_min_months, self.tenure_max_months)?;

        if self.min_monthly_income < zero {
            return Err(ValidationError::NegativeIncome);
        }

        if !(MIN_CREDIT_SCORE..=MAX_CREDIT_SCORE).contains(&self.min_credit_score) {
            return Err(ValidationError::CreditScoreOutOfRange(self.min_credit_score));
        }
        if let Some(max_credit) = self.max_credit_score {
            ValueRange::new("credit_score", self.min_credit_score, max_credit)?;
            if max_credit > MAX_CREDIT_SCORE {
                return Err(ValidationError::CreditScoreOutOfRange(max_credit));
            }
        }

        if self.min_age < MIN_AGE {
            return Err(ValidationError::AgeOutOfRange(self.min_age));
        }
        if self.max_age > MAX_AGE {
            return Err(ValidationError::AgeOutOfRange(self.max_age));
        }
        let age = ValueRange::new("age", self.min_age, self.max_age)?;

        let mut accepted_employment = Vec::with_capacity(self.accepted_employment.len());
        for raw in &self.accepted_employment {
            let category = EmploymentCategory::normalize(raw)?;
            if !accepted_employment.contains(&category) {
                accepted_employment.push(category);
            }
        }

        Ok(NewProduct {
            provider_name,
            product_name,
            interest_rate,
            loan_amount,
            tenure_months,
            min_monthly_income: self.min_monthly_income,
            min_credit_score: self.min_credit_score,
            max_credit_score: self.max_credit_score,
            age,
            accepted_employment,
            is_active: self.is_active,
        })
    }
}

/// loan_products 表行
#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub provider_name: String,
    pub product_name: String,
    pub interest_rate_min: BigDecimal,
    pub interest_rate_max: BigDecimal,
    pub loan_amount_min: BigDecimal,
    pub loan_amount_max: BigDecimal,
    pub tenure_min_months: i32,
    pub tenure_max_months: i32,
    pub min_monthly_income: BigDecimal,
    pub min_credit_score: i32,
    pub max_credit_score: Option<i32>,
    pub min_age: i32,
    pub max_age: i32,
    pub accepted_employment: Vec<String>,
    pub is_active: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = ValidationError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let draft = ProductDraft {
            provider_name: row.provider_name,
            product_name: row.product_name,
            interest_rate_min: row.interest_rate_min,
            interest_rate_max: row.interest_rate_max,
            loan_amount_min: row.loan_amount_min,
            loan_amount_max: row.loan_amount_max,
            tenure_min_months: row.tenure_min_months,
            tenure_max_months: row.tenure_max_months,
            min_monthly_income: row.min_monthly_income,
            min_credit_score: row.min_credit_score,
            max_credit_score: row.max_credit_score,
            min_age: row.min_age,
            max_age: row.max_age,
            accepted_employment: row.accepted_employment,
            is_active: row.is_active,
        };
        Ok(Product::from_new(id, draft.validate()?))
    }
}
