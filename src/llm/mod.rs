//! 外部推理服务 (Stage 3 定性评估).
//!
//! - `ReasoningService`: 评估单个 (申请人, 产品) 组合的 trait
//! - `GeminiClient`: 基于 reqwest 的 generateContent 实现
//!
//! 未配置凭据时 `create_service` 返回 None, 由评估器进入离线模式.

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiClient;
pub use prompt::{build_prompt, json_span, parse_assessment};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::models::{Applicant, Product};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 推理服务返回的结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResponse {
    pub qualified: bool,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// 评估一个组合; 网络/状态码/解析失败均返回 Err, 由调用方兜底
    async fn assess(
        &self,
        applicant: &Applicant,
        product: &Product,
    ) -> Result<AssessmentResponse, LlmError>;

    fn name(&self) -> &str;
}

/// 根据配置创建推理服务; 无凭据返回 Ok(None)
pub fn create_service(
    config: &LlmConfig,
    timeout: Duration,
) -> Result<Option<Arc<dyn ReasoningService>>, LlmError> {
    let Some(api_key) = config.api_key.clone().filter(|_| config.has_credentials()) else {
        tracing::warn!("未配置推理服务 API key, Stage 3 进入离线模式");
        return Ok(None);
    };

    let client = GeminiClient::new(&config.api_url, &config.model, api_key, timeout)?;
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Some(Arc::new(client)))
}
