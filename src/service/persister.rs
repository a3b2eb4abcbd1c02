use crate::db::{MatchStore, PersistOutcome};
use crate::error::StoreError;
use crate::models::{MatchCandidate, MatchSource, MatchStatus, MatchUpsert, VerdictSource};

/// 放行候选 -> matches 行
pub fn to_upsert(candidate: &MatchCandidate, batch_id: Option<&str>) -> MatchUpsert {
    let assessment = candidate.assessment.as_ref();
    let match_source = match assessment.map(|a| a.source) {
        Some(VerdictSource::Fallback) => MatchSource::LogicFilter,
        Some(VerdictSource::Service) | Some(VerdictSource::Offline) => MatchSource::LlmCheck,
        None => MatchSource::LogicFilter,
    };

    MatchUpsert {
        applicant_id: candidate.applicant_id,
        product_id: candidate.product_id,
        match_score: candidate.score,
        status: MatchStatus::Eligible,
        match_source,
        income_eligible: candidate.flags.income,
        credit_score_eligible: candidate.flags.credit,
        age_eligible: candidate.flags.age,
        employment_eligible: candidate.flags.employment,
        llm_analysis: assessment.map(|a| a.reasoning.clone()),
        llm_confidence: assessment.and_then(|a| a.confidence),
        batch_id: batch_id.map(str::to_string),
    }
}

/// 写入放行候选; 行级失败计入 outcome.failed, 连接失败返回 Err
pub async fn persist(
    store: &dyn MatchStore,
    accepted: &[MatchCandidate],
    batch_id: Option<&str>,
) -> Result<PersistOutcome, StoreError> {
    if accepted.is_empty() {
        return Ok(PersistOutcome::default());
    }

    let rows: Vec<MatchUpsert> = accepted.iter().map(|c| to_upsert(c, batch_id)).collect();
    let outcome = store.upsert_matches(&rows).await?;

    if outcome.failed > 0 {
        tracing::warn!("{} 条匹配写入失败 (已跳过), 成功 {}", outcome.failed, outcome.written);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assessment, EligibilityFlags};

    fn accepted(source: VerdictSource, confidence: Option<f64>) -> MatchCandidate {
        let mut candidate = MatchCandidate::new(
            3,
            9,
            EligibilityFlags {
                income: true,
                credit: true,
                age: true,
                employment: true,
            },
        );
        candidate.score = 72.5;
        candidate.assessment = Some(Assessment {
            source,
            confidence,
            reasoning: "ok".to_string(),
        });
        candidate
    }

    #[test]
    fn service_verdict_maps_to_llm_check() {
        let row = to_upsert(&accepted(VerdictSource::Service, Some(0.8)), Some("b-1"));
        assert_eq!(row.match_source, MatchSource::LlmCheck);
        assert_eq!(row.status, MatchStatus::Eligible);
        assert_eq!(row.llm_confidence, Some(0.8));
        assert_eq!(row.batch_id.as_deref(), Some("b-1"));
        assert!(row.credit_score_eligible);
    }

    #[test]
    fn fallback_verdict_maps_to_logic_filter() {
        let row = to_upsert(&accepted(VerdictSource::Fallback, None), None);
        assert_eq!(row.match_source, MatchSource::LogicFilter);
        assert_eq!(row.llm_confidence, None);
        assert_eq!(row.llm_analysis.as_deref(), Some("ok"));
    }
}
