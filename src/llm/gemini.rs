use crate::error::LlmError;
use crate::llm::prompt::{build_prompt, parse_assessment};
use crate::llm::{AssessmentResponse, ReasoningService};
use crate::models::{Applicant, Product};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini generateContent 客户端
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

/// 低温度, 保证同一输入结论稳定
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 500,
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(
        api_url: &str,
        model: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: model.to_string(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/{}:generateContent", api_url.trim_end_matches('/'), model),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }

    fn first_text(&self, response: GenerateResponse) -> Result<String, LlmError> {
        response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.model.clone(),
                reason: "response contained no text candidates".to_string(),
            })
    }
}

#[async_trait]
impl ReasoningService for GeminiClient {
    async fn assess(
        &self,
        applicant: &Applicant,
        product: &Product,
    ) -> Result<AssessmentResponse, LlmError> {
        let prompt = build_prompt(applicant, product);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: &prompt }],
            }],
            generation_config: GenerationConfig::default(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: self.model.clone(),
                        timeout: self.timeout,
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: self.model.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                provider: self.model.clone(),
                status: status.as_u16(),
            });
        }

        let parsed: GenerateResponse = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: self.model.clone(),
            reason: e.to_string(),
        })?;

        let text = self.first_text(parsed)?;
        parse_assessment(&self.model, &text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
