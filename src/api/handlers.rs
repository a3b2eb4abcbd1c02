use crate::api::AppState;
use crate::db::{export_to_csv, ApplicantScope};
use crate::error::AppError;
use crate::models::{BatchMatchSummary, BatchStatus, Match, PipelineSummary};
use crate::service::CancelToken;
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 10_000;

/// 请求体: batch_id 与 applicant_ids 二选一
#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub applicant_ids: Option<Vec<i64>>,
    /// 批次截止时间 (秒), 超时按取消处理
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl BatchMatchRequest {
    fn scope(&self) -> Result<ApplicantScope, AppError> {
        match (&self.batch_id, &self.applicant_ids) {
            (Some(batch_id), None) if !batch_id.trim().is_empty() => {
                Ok(ApplicantScope::Batch(batch_id.trim().to_string()))
            }
            (None, Some(ids)) => Ok(ApplicantScope::Ids(ids.clone())),
            _ => Err(AppError::BadRequest(
                "exactly one of batch_id or applicant_ids is required".to_string(),
            )),
        }
    }
}

/// 响应体
#[derive(Debug, Serialize)]
pub struct BatchMatchResponse {
    pub success: bool,
    pub message: String,
    pub summary: PipelineSummary,
}

#[derive(Debug, Deserialize)]
pub struct BatchFilter {
    pub batch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub deleted: u64,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 批量匹配接口; 同一 batch_id 串行执行
pub async fn batch_match(
    State(state): State<AppState>,
    Json(req): Json<BatchMatchRequest>,
) -> Result<Response, AppError> {
    let scope = req.scope()?;
    let cancel = match req.deadline_secs {
        Some(secs) => CancelToken::with_deadline(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };

    let _guard = match scope.batch_id() {
        Some(batch_id) => Some(state.batch_locks.acquire(batch_id).await),
        None => None,
    };

    let summary = state.pipeline.run_batch(&scope, &cancel).await;

    let (status, success, message) = match summary.status {
        BatchStatus::Completed => (
            StatusCode::OK,
            true,
            format!(
                "Matched {}: {} eligible matches persisted",
                scope.label(),
                summary.final_matches
            ),
        ),
        BatchStatus::Cancelled => (
            StatusCode::OK,
            false,
            format!(
                "Batch {} cancelled, {} matches persisted",
                scope.label(),
                summary.final_matches
            ),
        ),
        BatchStatus::Failed => (
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            format!("Error: {}", summary.errors.join("; ")),
        ),
    };

    let response = BatchMatchResponse {
        success,
        message,
        summary,
    };
    Ok((status, Json(response)).into_response())
}

/// 待通知匹配
pub async fn pending_notifications(
    State(state): State<AppState>,
    Query(filter): Query<BatchFilter>,
) -> Result<Json<Vec<Match>>, AppError> {
    let matches = state
        .pipeline
        .store()
        .pending_notifications(filter.batch_id.as_deref())
        .await?;
    Ok(Json(matches))
}

/// 批次匹配列表 (按分数降序)
pub async fn batch_matches(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let matches = state
        .pipeline
        .store()
        .list_batch_matches(&batch_id, limit)
        .await?;
    Ok(Json(matches))
}

/// 批次统计
pub async fn batch_summary(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchMatchSummary>, AppError> {
    let summary = state.pipeline.store().batch_summary(&batch_id).await?;
    Ok(Json(summary))
}

/// 导出批次匹配 CSV
pub async fn export_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Response, AppError> {
    let matches = state
        .pipeline
        .store()
        .list_batch_matches(&batch_id, usize::MAX)
        .await?;

    let mut body = Vec::new();
    export_to_csv(&matches, &mut body)?;
    tracing::info!("导出批次 {} 匹配结果 {} 条", batch_id, matches.len());

    let disposition = format!("attachment; filename=\"matches-{batch_id}.csv\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// 批量清除匹配结果
pub async fn clear_matches(
    State(state): State<AppState>,
    Query(filter): Query<BatchFilter>,
) -> Result<Json<ClearResponse>, AppError> {
    let batch_id = filter.batch_id.as_deref();
    let deleted = state.pipeline.store().clear_matches(batch_id).await?;
    tracing::info!("清除匹配结果 {} 条 (batch: {:?})", deleted, batch_id);

    Ok(Json(ClearResponse {
        success: true,
        message: format!("Deleted {deleted} matches"),
        deleted,
    }))
}
