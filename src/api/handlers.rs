use crate::error::ValidationError;
use crate::models::{
    Alert, BatchStatus, InvoiceRecord, RecordError, ValidationConfigPatch, ValidationResult,
    ValidationSummary,
};
use crate::service::{BatchOptions, ValidationEngine};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 请求体: 批量校验
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidateRequest {
    pub batch_id: Option<String>,
    pub records: Vec<InvoiceRecord>,
    pub config: Option<ValidationConfigPatch>,
}

/// 请求体: 按ID重新校验
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevalidateRequest {
    pub record_ids: Vec<String>,
    pub records: Vec<InvoiceRecord>,
    pub config: Option<ValidationConfigPatch>,
}

/// 请求体: 记录ID列表
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIdsRequest {
    pub record_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub unacknowledged: Option<bool>,
}

/// 通用响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
}

/// 批量校验响应数据
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchData {
    pub batch_id: String,
    pub status: BatchStatus,
    pub summary: ValidationSummary,
    pub results: Vec<ValidationResult>,
    pub errors: Vec<RecordError>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevalidateData {
    pub batch_id: String,
    pub record_ids: Vec<String>,
    pub results: Vec<ValidationResult>,
    pub errors: Vec<RecordError>,
    pub summary: ValidationSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearData {
    pub records_removed: usize,
    pub alerts_removed: usize,
}

fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    let response = ApiResponse {
        success: true,
        message: message.into(),
        data: Some(data),
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn error_status(err: &ValidationError) -> StatusCode {
    match err {
        ValidationError::Config(_) => StatusCode::BAD_REQUEST,
        ValidationError::BatchFatal { code, .. } if code == "INVALID_CONFIG" => StatusCode::BAD_REQUEST,
        ValidationError::BatchFatal { code, .. } if code == "BATCH_ALREADY_RUNNING" => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ValidationError) -> Response {
    let response = ErrorResponse {
        success: false,
        code: err.code().to_string(),
        message: format!("Error: {}", err),
    };
    (error_status(&err), Json(response)).into_response()
}

fn not_found(message: String) -> Response {
    let response = ErrorResponse {
        success: false,
        code: "NOT_FOUND".to_string(),
        message,
    };
    (StatusCode::NOT_FOUND, Json(response)).into_response()
}

fn join_error(e: tokio::task::JoinError) -> Response {
    tracing::error!("Validation task aborted: {}", e);
    error_response(ValidationError::batch_fatal("INTERNAL", e.to_string()))
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 批量校验接口 (CPU 密集, 放到阻塞线程池执行)
pub async fn validate_batch(
    State(engine): State<Arc<ValidationEngine>>,
    Json(req): Json<BatchValidateRequest>,
) -> Response {
    let options = BatchOptions {
        batch_id: req.batch_id,
        config: req.config,
        ..BatchOptions::default()
    };
    let records = req.records;
    let task = tokio::task::spawn_blocking(move || engine.validate_batch(&records, options));

    match task.await {
        Ok(Ok(outcome)) => {
            let message = format!(
                "Validated {} records, {} with discrepancies ({:?})",
                outcome.summary.total_records, outcome.summary.invalid_records, outcome.status
            );
            ok(
                message,
                BatchData {
                    batch_id: outcome.batch_id,
                    status: outcome.status,
                    summary: outcome.summary,
                    results: outcome.results,
                    errors: outcome.errors,
                },
            )
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => join_error(e),
    }
}

/// 按记录ID重新校验接口
pub async fn revalidate_records(
    State(engine): State<Arc<ValidationEngine>>,
    Json(req): Json<RevalidateRequest>,
) -> Response {
    let task = tokio::task::spawn_blocking(move || {
        engine.revalidate_records(&req.record_ids, &req.records, req.config.as_ref())
    });

    match task.await {
        Ok(Ok(outcome)) => ok(
            format!("Revalidated {} records", outcome.record_ids.len()),
            RevalidateData {
                batch_id: outcome.batch_id,
                record_ids: outcome.record_ids,
                results: outcome.results,
                errors: outcome.errors,
                summary: outcome.summary,
            },
        ),
        Ok(Err(e)) => error_response(e),
        Err(e) => join_error(e),
    }
}

pub async fn list_results(State(engine): State<Arc<ValidationEngine>>) -> Response {
    match engine.results() {
        Ok(results) => ok(format!("{} results", results.len()), results),
        Err(e) => error_response(e),
    }
}

pub async fn clear_results(
    State(engine): State<Arc<ValidationEngine>>,
    Json(req): Json<RecordIdsRequest>,
) -> Response {
    match engine.clear_results_for_records(&req.record_ids) {
        Ok(stats) => ok(
            format!("Cleared {} records", stats.records_removed),
            ClearData {
                records_removed: stats.records_removed,
                alerts_removed: stats.alerts_removed,
            },
        ),
        Err(e) => error_response(e),
    }
}

pub async fn summary(State(engine): State<Arc<ValidationEngine>>) -> Response {
    match engine.generate_summary() {
        Ok(summary) => ok("Summary generated", summary),
        Err(e) => error_response(e),
    }
}

pub async fn list_alerts(
    State(engine): State<Arc<ValidationEngine>>,
    Query(query): Query<AlertQuery>,
) -> Response {
    let alerts: Result<Vec<Alert>, ValidationError> = if query.unacknowledged.unwrap_or(false) {
        engine.unacknowledged_alerts()
    } else {
        engine.alerts()
    };
    match alerts {
        Ok(alerts) => ok(format!("{} alerts", alerts.len()), alerts),
        Err(e) => error_response(e),
    }
}

/// 确认告警; 不存在的ID为空操作
pub async fn acknowledge_alert(
    State(engine): State<Arc<ValidationEngine>>,
    Path(alert_id): Path<String>,
) -> Response {
    match engine.acknowledge_alert(&alert_id) {
        Ok(found) => ok(
            if found {
                format!("Alert {} acknowledged", alert_id)
            } else {
                format!("Alert {} not found, nothing to acknowledge", alert_id)
            },
            found,
        ),
        Err(e) => error_response(e),
    }
}

pub async fn acknowledge_all_alerts(State(engine): State<Arc<ValidationEngine>>) -> Response {
    match engine.acknowledge_all_alerts() {
        Ok(count) => ok(format!("Acknowledged {} alerts", count), count),
        Err(e) => error_response(e),
    }
}

pub async fn dismiss_alert(
    State(engine): State<Arc<ValidationEngine>>,
    Path(alert_id): Path<String>,
) -> Response {
    match engine.dismiss_alert(&alert_id) {
        Ok(Some(alert)) => ok(format!("Alert {} dismissed", alert_id), alert),
        Ok(None) => not_found(format!("Alert {} not found", alert_id)),
        Err(e) => error_response(e),
    }
}

pub async fn batch_progress(
    State(engine): State<Arc<ValidationEngine>>,
    Path(batch_id): Path<String>,
) -> Response {
    match engine.progress(&batch_id) {
        Some(progress) => ok(format!("Batch {}", batch_id), progress),
        None => not_found(format!("Batch {} not found", batch_id)),
    }
}

pub async fn cancel_batch(
    State(engine): State<Arc<ValidationEngine>>,
    Path(batch_id): Path<String>,
) -> Response {
    if engine.cancel_batch(&batch_id) {
        ok(format!("Cancellation requested for batch {}", batch_id), true)
    } else {
        not_found(format!("Batch {} is not running", batch_id))
    }
}

pub async fn get_config(State(engine): State<Arc<ValidationEngine>>) -> Response {
    match engine.config() {
        Ok(config) => ok("Active validation config", config),
        Err(e) => error_response(e),
    }
}

pub async fn update_config(
    State(engine): State<Arc<ValidationEngine>>,
    Json(patch): Json<ValidationConfigPatch>,
) -> Response {
    match engine.update_config(&patch) {
        Ok(config) => ok("Validation config updated", config),
        Err(e) => error_response(e),
    }
}

pub async fn reset_config(State(engine): State<Arc<ValidationEngine>>) -> Response {
    match engine.reset_config() {
        Ok(config) => ok("Validation config reset", config),
        Err(e) => error_response(e),
    }
}
