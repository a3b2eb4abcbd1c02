use serde::{Deserialize, Serialize};

/// 四项资格判定结果 (互相独立, 不短路)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EligibilityFlags {
    pub income: bool,
    pub credit: bool,
    pub age: bool,
    pub employment: bool,
}

impl EligibilityFlags {
    pub fn all_passed(&self) -> bool {
        self.income && self.credit && self.age && self.employment
    }

    /// 未通过的条件名称 (用于日志/报告)
    pub fn failed_criteria(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.income {
            failed.push("income");
        }
        if !self.credit {
            failed.push("credit_score");
        }
        if !self.age {
            failed.push("age");
        }
        if !self.employment {
            failed.push("employment");
        }
        failed
    }
}

/// Stage 3 结论来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// 外部推理服务给出的结论
    Service,
    /// 未配置凭据, 离线放行
    Offline,
    /// 服务失败, 按 Stage 2 分数兜底
    Fallback,
}

/// Stage 3 评估结果 (仅对放行的候选保留)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub source: VerdictSource,
    pub confidence: Option<f64>,
    pub reasoning: String,
}

/// 匹配候选 (瞬态, Stage 3 之前不落库)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub applicant_id: i64,
    pub product_id: i64,
    pub flags: EligibilityFlags,
    /// Stage 2 分数, [0, 100]
    pub score: f64,
    pub assessment: Option<Assessment>,
}

impl MatchCandidate {
    pub fn new(applicant_id: i64, product_id: i64, flags: EligibilityFlags) -> Self {
        Self {
            applicant_id,
            product_id,
            flags,
            score: 0.0,
            assessment: None,
        }
    }

    pub fn key(&self) -> (i64, i64) {
        (self.applicant_id, self.product_id)
    }
}
