use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 匹配策略参数 (策略旋钮, 非硬编码常量)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchingConfig {
    /// 还款能力上限 = 月收入 × 0.5 × buffer
    pub affordability_buffer: f64,
    /// 推理服务失败时, Stage 2 分数达到该值仍放行
    pub fallback_score_threshold: f64,
    /// 进入 Stage 3 的候选上限 (控制外部 API 成本)
    pub max_assessment_candidates: usize,
    /// Stage 3 并发请求数
    pub assessment_concurrency: usize,
    /// Stage 3 两次请求发起的最小间隔 (60 次/分钟 ≈ 1000ms)
    pub assessment_min_interval_ms: u64,
    pub assessment_timeout_secs: u64,
    /// Stage 1 是否使用数据库范围查询预筛
    pub use_sql_prefilter: bool,
}

impl MatchingConfig {
    pub fn assessment_timeout(&self) -> Duration {
        Duration::from_secs(self.assessment_timeout_secs)
    }

    pub fn assessment_min_interval(&self) -> Duration {
        Duration::from_millis(self.assessment_min_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.affordability_buffer > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "matching.affordability_buffer".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.fallback_score_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "matching.fallback_score_threshold".to_string(),
                message: "must be within 0..=100".to_string(),
            });
        }
        if self.assessment_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "matching.assessment_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            affordability_buffer: 2.0,
            fallback_score_threshold: 60.0,
            max_assessment_candidates: 100,
            assessment_concurrency: 4,
            assessment_min_interval_ms: 1000,
            assessment_timeout_secs: 30,
            use_sql_prefilter: true,
        }
    }
}

/// 外部推理服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    /// 为空时进入离线模式
    #[serde(default)]
    pub api_key: Option<SecretString>,
}

impl LlmConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_ref()
            .map(|key| !key.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_LLM_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
        }
    }
}

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/loan_eligibility";
const DEFAULT_LLM_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_LLM_MODEL: &str = "gemini-pro";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: 20,
            },
            matching: MatchingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// 分层环境变量前缀, 只读取 APP_ 开头的变量
pub const ENV_PREFIX: &str = "APP";

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    /// 加载配置: 默认值 -> config/app.* 文件 -> 环境变量 (APP_MATCHING__AFFORDABILITY_BUFFER 等)
    /// 同时兼容 DATABASE_URL / SERVER_HOST / SERVER_PORT / GEMINI_API_KEY / LLM_MODEL
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load(environment())
    }

    fn load(environment: config::Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let matching = &defaults.matching;

        let settings = config::Config::builder()
            .set_default("server.host", defaults.server.host.clone())?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("database.url", defaults.database.url.clone())?
            .set_default("database.max_connections", i64::from(defaults.database.max_connections))?
            .set_default("matching.affordability_buffer", matching.affordability_buffer)?
            .set_default("matching.fallback_score_threshold", matching.fallback_score_threshold)?
            .set_default(
                "matching.max_assessment_candidates",
                matching.max_assessment_candidates as i64,
            )?
            .set_default("matching.assessment_concurrency", matching.assessment_concurrency as i64)?
            .set_default(
                "matching.assessment_min_interval_ms",
                matching.assessment_min_interval_ms as i64,
            )?
            .set_default("matching.assessment_timeout_secs", matching.assessment_timeout_secs as i64)?
            .set_default("matching.use_sql_prefilter", matching.use_sql_prefilter)?
            .set_default("llm.api_url", defaults.llm.api_url.clone())?
            .set_default("llm.model", defaults.llm.model.clone())?
            .add_source(config::File::with_name("config/app").required(false))
            .add_source(environment)
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option(
                "server.port",
                std::env::var("SERVER_PORT").ok().and_then(|p| p.parse::<i64>().ok()),
            )?
            .set_override_option("llm.api_key", std::env::var("GEMINI_API_KEY").ok())?
            .set_override_option("llm.model", std::env::var("LLM_MODEL").ok())?
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        if !config.llm.has_credentials() {
            config.llm.api_key = None;
        }
        config.matching.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policy() {
        let config = AppConfig::default();
        assert_eq!(config.matching.affordability_buffer, 2.0);
        assert_eq!(config.matching.fallback_score_threshold, 60.0);
        assert_eq!(config.matching.max_assessment_candidates, 100);
        assert_eq!(config.matching.assessment_timeout(), Duration::from_secs(30));
        assert!(!config.llm.has_credentials());
    }

    #[test]
    fn only_prefixed_variables_are_read() {
        let vars: config::Map<String, String> = [
            ("APP_MATCHING__FALLBACK_SCORE_THRESHOLD", "75"),
            ("MATCHING__AFFORDABILITY_BUFFER", "9"),
            ("HOME", "/root"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = AppConfig::load(environment().source(Some(vars))).unwrap();
        assert_eq!(config.matching.fallback_score_threshold, 75.0);
        assert_eq!(config.matching.affordability_buffer, 2.0);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let llm = LlmConfig {
            api_key: Some(SecretString::from("   ")),
            ..LlmConfig::default()
        };
        assert!(!llm.has_credentials());
    }

    #[test]
    fn validate_rejects_bad_policy_values() {
        let mut matching = MatchingConfig::default();
        matching.assessment_concurrency = 0;
        assert!(matching.validate().is_err());

        let mut matching = MatchingConfig::default();
        matching.fallback_score_threshold = 120.0;
        assert!(matching.validate().is_err());

        let mut matching = MatchingConfig::default();
        matching.affordability_buffer = 0.0;
        assert!(matching.validate().is_err());
    }
}
