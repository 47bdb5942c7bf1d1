pub mod handlers;

use crate::service::ValidationEngine;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

pub use handlers::*;

/// 构建全部路由
pub fn router(engine: Arc<ValidationEngine>) -> Router {
    let validation_routes = Router::new()
        .route("/api/validate/batch", post(handlers::validate_batch))
        .route("/api/validate/revalidate", post(handlers::revalidate_records))
        .route("/api/results", get(handlers::list_results))
        .route("/api/results/clear", post(handlers::clear_results))
        .route("/api/summary", get(handlers::summary))
        .route("/api/batches/:id/progress", get(handlers::batch_progress))
        .route("/api/batches/:id/cancel", post(handlers::cancel_batch));

    let alert_routes = Router::new()
        .route("/api/alerts", get(handlers::list_alerts))
        .route("/api/alerts/acknowledge-all", post(handlers::acknowledge_all_alerts))
        .route("/api/alerts/:id/acknowledge", post(handlers::acknowledge_alert))
        .route("/api/alerts/:id", delete(handlers::dismiss_alert));

    let config_routes = Router::new()
        .route(
            "/api/config",
            get(handlers::get_config).patch(handlers::update_config),
        )
        .route("/api/config/reset", post(handlers::reset_config));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(validation_routes)
        .merge(alert_routes)
        .merge(config_routes)
        .with_state(engine)
        .layer(ServiceBuilder::new())
}
