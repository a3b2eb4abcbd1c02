use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// 匹配状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Eligible,
    NotEligible,
    Notified,
    Expired,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Eligible => "eligible",
            MatchStatus::NotEligible => "not_eligible",
            MatchStatus::Notified => "notified",
            MatchStatus::Expired => "expired",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MatchStatus::Pending),
            "eligible" => Ok(MatchStatus::Eligible),
            "not_eligible" => Ok(MatchStatus::NotEligible),
            "notified" => Ok(MatchStatus::Notified),
            "expired" => Ok(MatchStatus::Expired),
            other => Err(format!("unknown match status '{other}'")),
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生最终结论的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    SqlFilter,
    LogicFilter,
    LlmCheck,
    Manual,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::SqlFilter => "sql_filter",
            MatchSource::LogicFilter => "logic_filter",
            MatchSource::LlmCheck => "llm_check",
            MatchSource::Manual => "manual",
        }
    }
}

impl FromStr for MatchSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql_filter" => Ok(MatchSource::SqlFilter),
            "logic_filter" => Ok(MatchSource::LogicFilter),
            "llm_check" => Ok(MatchSource::LlmCheck),
            "manual" => Ok(MatchSource::Manual),
            other => Err(format!("unknown match source '{other}'")),
        }
    }
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 匹配结果 (matches 表, (applicant_id, product_id) 唯一)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub applicant_id: i64,
    pub product_id: i64,
    pub match_score: f64,
    pub status: MatchStatus,
    pub match_source: MatchSource,
    pub income_eligible: bool,
    pub credit_score_eligible: bool,
    pub age_eligible: bool,
    pub employment_eligible: bool,
    pub llm_analysis: Option<String>,
    pub llm_confidence: Option<f64>,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

/// 待写入的匹配结果 (按 applicant_id + product_id upsert)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchUpsert {
    pub applicant_id: i64,
    pub product_id: i64,
    pub match_score: f64,
    pub status: MatchStatus,
    pub match_source: MatchSource,
    pub income_eligible: bool,
    pub credit_score_eligible: bool,
    pub age_eligible: bool,
    pub employment_eligible: bool,
    pub llm_analysis: Option<String>,
    pub llm_confidence: Option<f64>,
    pub batch_id: Option<String>,
}

impl MatchUpsert {
    pub fn key(&self) -> (i64, i64) {
        (self.applicant_id, self.product_id)
    }
}

/// matches 表行
#[derive(Debug, Clone, FromRow)]
pub struct MatchRow {
    pub id: i64,
    pub applicant_id: i64,
    pub product_id: i64,
    pub match_score: f64,
    pub status: String,
    pub match_source: String,
    pub income_eligible: bool,
    pub credit_score_eligible: bool,
    pub age_eligible: bool,
    pub employment_eligible: bool,
    pub llm_analysis: Option<String>,
    pub llm_confidence: Option<f64>,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl TryFrom<MatchRow> for Match {
    type Error = String;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            applicant_id: row.applicant_id,
            product_id: row.product_id,
            match_score: row.match_score,
            status: row.status.parse()?,
            match_source: row.match_source.parse()?,
            income_eligible: row.income_eligible,
            credit_score_eligible: row.credit_score_eligible,
            age_eligible: row.age_eligible,
            employment_eligible: row.employment_eligible,
            llm_analysis: row.llm_analysis,
            llm_confidence: row.llm_confidence,
            batch_id: row.batch_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            notified_at: row.notified_at,
        })
    }
}
