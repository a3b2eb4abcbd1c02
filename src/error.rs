use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;

/// 入库校验错误 (申请人/产品数据不合法, 不会进入匹配流水线)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("external_id cannot be empty")]
    EmptyExternalId,

    #[error("monthly income cannot be negative")]
    NegativeIncome,

    #[error("credit score must be between 300 and 900, got {0}")]
    CreditScoreOutOfRange(i32),

    #[error("age must be between 18 and 120, got {0}")]
    AgeOutOfRange(i32),

    #[error("unknown employment category: '{0}'")]
    UnknownEmployment(String),

    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("invalid range for {field}: max must be >= min")]
    InvertedRange { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// 申请人/产品仓库错误
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("stored record is invalid: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if is_connectivity_error(&err) {
            RepositoryError::Unavailable(err.to_string())
        } else {
            RepositoryError::Query(err.to_string())
        }
    }
}

/// 匹配结果存储错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 连接级失败: 整个持久化步骤中止
    #[error("match store unavailable: {0}")]
    Unavailable(String),

    #[error("match store query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_connectivity_error(&err) {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Query(err.to_string())
        }
    }
}

/// 连接级错误 (与单行约束/数据错误区分)
pub fn is_connectivity_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// 外部推理服务错误
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("provider {provider} returned status {status}")]
    Status { provider: String, status: u16 },

    #[error("provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// 流水线致命错误 (中止当前批次)
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("candidate generation failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("match persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// 服务顶层错误
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("export error: {0}")]
    Export(#[from] csv::Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Repository(RepositoryError::Unavailable(_))
            | AppError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "success": false, "message": self.to_string() }));
        (status, body).into_response()
    }
}
