use crate::config::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    // 慢查询阈值 5秒 (预筛 CROSS JOIN 在大批次下可能较慢)
    let connect_options = PgConnectOptions::from_str(&config.url)?
        .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(5));

    tracing::info!("连接数据库, max_connections={}", config.max_connections);

    PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options)
        .await
}
