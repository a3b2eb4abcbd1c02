pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::{create_pool, InMemoryRepository, PgRepository};
pub use error::AppError;
pub use service::{CancelToken, MatchingPipeline, QualitativeAssessor};
