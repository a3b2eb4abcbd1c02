use loan_eligibility_rust::{
    api::{self, AppState},
    create_pool, llm, AppConfig, AppError, MatchingPipeline, PgRepository, QualitativeAssessor,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 初始化日志 - 本地时间格式, RUST_LOG 可覆盖级别 (默认 info)
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置 (api_key 为 SecretString, Debug 输出已脱敏)
    let config = AppConfig::from_env()?;
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database).await?;
    info!("Database pool created");

    let repository = Arc::new(PgRepository::new(pool));
    let service = llm::create_service(&config.llm, config.matching.assessment_timeout())?;
    let assessor = QualitativeAssessor::new(service, &config.matching);
    if assessor.is_offline() {
        info!("Stage 3 offline: candidates passing hard criteria are accepted with fixed confidence");
    }

    let pipeline = Arc::new(MatchingPipeline::new(
        repository.clone(),
        repository,
        assessor,
        config.matching.clone(),
    ));

    let app = api::router(AppState::new(pipeline)).layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST   /api/match/batch                 - run matching pipeline");
    info!("  GET    /api/matches/pending             - eligible, not yet notified");
    info!("  GET    /api/batches/:batch_id/matches   - matches by score");
    info!("  GET    /api/batches/:batch_id/summary   - batch statistics");
    info!("  GET    /api/batches/:batch_id/export    - CSV export");
    info!("  DELETE /api/matches                     - bulk clear");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
