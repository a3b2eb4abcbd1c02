use crate::error::ValidationError;
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

pub const MIN_CREDIT_SCORE: i32 = 300;
pub const MAX_CREDIT_SCORE: i32 = 900;
pub const MIN_AGE: i32 = 18;
pub const MAX_AGE: i32 = 120;

/// 就业类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentCategory {
    Employed,
    SelfEmployed,
    Unemployed,
    Retired,
    Student,
}

/// 同义词表: 归一化后的输入 -> 类别
const EMPLOYMENT_SYNONYMS: &[(&str, EmploymentCategory)] = &[
    ("employed", EmploymentCategory::Employed),
    ("salaried", EmploymentCategory::Employed),
    ("full_time", EmploymentCategory::Employed),
    ("fulltime", EmploymentCategory::Employed),
    ("part_time", EmploymentCategory::Employed),
    ("parttime", EmploymentCategory::Employed),
    ("self_employed", EmploymentCategory::SelfEmployed),
    ("selfemployed", EmploymentCategory::SelfEmployed),
    ("self_employment", EmploymentCategory::SelfEmployed),
    ("business", EmploymentCategory::SelfEmployed),
    ("business_owner", EmploymentCategory::SelfEmployed),
    ("businessowner", EmploymentCategory::SelfEmployed),
    ("entrepreneur", EmploymentCategory::SelfEmployed),
    ("freelancer", EmploymentCategory::SelfEmployed),
    ("unemployed", EmploymentCategory::Unemployed),
    ("jobless", EmploymentCategory::Unemployed),
    ("not_employed", EmploymentCategory::Unemployed),
    ("retired", EmploymentCategory::Retired),
    ("pensioner", EmploymentCategory::Retired),
    ("student", EmploymentCategory::Student),
    ("studying", EmploymentCategory::Student),
];

impl EmploymentCategory {
    pub const ALL: [EmploymentCategory; 5] = [
        EmploymentCategory::Employed,
        EmploymentCategory::SelfEmployed,
        EmploymentCategory::Unemployed,
        EmploymentCategory::Retired,
        EmploymentCategory::Student,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentCategory::Employed => "employed",
            EmploymentCategory::SelfEmployed => "self_employed",
            EmploymentCategory::Unemployed => "unemployed",
            EmploymentCategory::Retired => "retired",
            EmploymentCategory::Student => "student",
        }
    }

    /// 将各种写法 ("Full-Time", "business owner", "Pensioner" ...) 映射到标准类别.
    /// 查表失败直接拒绝, 不做透传.
    pub fn normalize(raw: &str) -> Result<Self, ValidationError> {
        let key = raw.trim().to_lowercase().replace([' ', '-'], "_");

        EMPLOYMENT_SYNONYMS
            .iter()
            .find(|(synonym, _)| *synonym == key)
            .map(|(_, category)| *category)
            .ok_or_else(|| ValidationError::UnknownEmployment(raw.to_string()))
    }
}

impl fmt::Display for EmploymentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmploymentCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

/// 申请人 (已入库)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: i64,
    pub external_id: String,
    pub monthly_income: BigDecimal,
    pub credit_score: i32,
    pub employment: EmploymentCategory,
    pub age: i32,
    pub batch_id: Option<String>,
}

impl Applicant {
    pub fn from_new(id: i64, new: NewApplicant) -> Self {
        Self {
            id,
            external_id: new.external_id,
            monthly_income: new.monthly_income,
            credit_score: new.credit_score,
            employment: new.employment,
            age: new.age,
            batch_id: new.batch_id,
        }
    }
}

/// 上传的原始申请人数据 (未校验)
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicantDraft {
    pub external_id: String,
    pub monthly_income: BigDecimal,
    pub credit_score: i32,
    pub employment: String,
    pub age: i32,
    #[serde(default)]
    pub batch_id: Option<String>,
}

/// 通过校验的申请人, 等待写入仓库
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplicant {
    pub external_id: String,
    pub monthly_income: BigDecimal,
    pub credit_score: i32,
    pub employment: EmploymentCategory,
    pub age: i32,
    pub batch_id: Option<String>,
}

impl ApplicantDraft {
    pub fn validate(self) -> Result<NewApplicant, ValidationError> {
        let external_id = self.external_id.trim().to_string();
        if external_id.is_empty() {
            return Err(ValidationError::EmptyExternalId);
        }
        if self.monthly_income < BigDecimal::zero() {
            return Err(ValidationError::NegativeIncome);
        }
        if !(MIN_CREDIT_SCORE..=MAX_CREDIT_SCORE).contains(&self.credit_score) {
            return Err(ValidationError::CreditScoreOutOfRange(self.credit_score));
        }
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(ValidationError::AgeOutOfRange(self.age));
        }
        let employment = EmploymentCategory::normalize(&self.employment)?;

        Ok(NewApplicant {
            external_id,
            monthly_income: self.monthly_income,
            credit_score: self.credit_score,
            employment,
            age: self.age,
            batch_id: self.batch_id.filter(|b| !b.trim().is_empty()),
        })
    }
}

/// applicants 表行
#[derive(Debug, Clone, FromRow)]
pub struct ApplicantRow {
    pub id: i64,
    pub external_id: String,
    pub monthly_income: BigDecimal,
    pub credit_score: i32,
    pub employment_category: String,
    pub age: i32,
    pub batch_id: Option<String>,
}

impl TryFrom<ApplicantRow> for Applicant {
    type Error = ValidationError;

    fn try_from(row: ApplicantRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            external_id: row.external_id,
            monthly_income: row.monthly_income,
            credit_score: row.credit_score,
            employment: EmploymentCategory::normalize(&row.employment_category)?,
            age: row.age,
            batch_id: row.batch_id,
        })
    }
}
