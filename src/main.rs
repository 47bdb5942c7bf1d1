use std::sync::Arc;
use tax_validation_rust::{api, AppConfig, ValidationEngine};
use tax_validation_rust::service::{FieldRegistry, TracingAuditSink};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式, RUST_LOG 控制级别 (默认 info)
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config);

    // 创建校验引擎 (字段注册表在此校验, 未知字段直接启动失败)
    let registry = FieldRegistry::standard();
    info!("Registered fields: {:?}", registry.field_names());
    let engine = Arc::new(ValidationEngine::new(
        config.validation.to_validation_config(),
        registry,
        Arc::new(TracingAuditSink),
    )?);

    let app = api::router(engine);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/validate/batch       - 批量校验");
    info!("  POST /api/validate/revalidate  - 按记录ID重新校验");
    info!("  GET  /api/summary              - 汇总统计");
    info!("  GET  /api/alerts               - 告警列表");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
