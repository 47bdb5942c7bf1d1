use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tax_validation_rust::{api, ValidationEngine};
use tower::ServiceExt;

fn app() -> Router {
    api::router(Arc::new(ValidationEngine::with_defaults().unwrap()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn records() -> Value {
    json!([
        {
            "id": "r1",
            "invoiceNumber": "INV-001",
            "customerCode": "C001",
            "amount": "1000",
            "taxRate": "10",
            "taxAmount": "1400",
            "totalAmount": "2400",
            "currency": "CNY"
        },
        {
            "id": "r2",
            "invoiceNumber": "INV-002",
            "customerCode": "C001",
            "amount": "1000",
            "taxRate": "10",
            "taxAmount": "100",
            "totalAmount": "1100",
            "currency": "CNY"
        }
    ])
}

#[tokio::test]
async fn health_check_responds() {
    let app = app();
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn batch_then_summary_and_alerts() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/validate/batch",
        Some(json!({ "batchId": "b-1", "records": records() })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["batchId"], "b-1");
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["summary"]["totalRecords"], 2);
    assert_eq!(body["data"]["summary"]["invalidRecords"], 1);
    assert_eq!(body["data"]["results"][0]["severity"], "critical");

    let (status, body) = send(&app, Method::GET, "/api/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["criticalCount"], 1);

    let (_, body) = send(&app, Method::GET, "/api/batches/b-1/progress", None).await;
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["progressPercentage"], 100);

    let (_, body) = send(&app, Method::GET, "/api/alerts?unacknowledged=true", None).await;
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    let alert_id = alerts[0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/alerts/{}/acknowledge", alert_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], true);

    let (_, body) = send(&app, Method::GET, "/api/alerts?unacknowledged=true", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_alert_acknowledge_is_noop_and_dismiss_is_404() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/api/alerts/nonexistent/acknowledge", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], false);

    let (status, body) = send(&app, Method::DELETE, "/api/alerts/nonexistent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn invalid_config_patch_is_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/config",
        Some(json!({ "thresholds": { "low": "50", "medium": "10", "high": "100", "critical": "1000" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_CONFIG");

    let (status, body) = send(&app, Method::GET, "/api/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["progressChunkSize"], 50);
}

#[tokio::test]
async fn revalidate_and_clear_by_record_id() {
    let app = app();
    send(&app, Method::POST, "/api/validate/batch", Some(json!({ "records": records() }))).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/validate/revalidate",
        Some(json!({
            "recordIds": ["r1"],
            "records": [{
                "id": "r1",
                "amount": "1000",
                "taxRate": "10",
                "taxAmount": "100",
                "totalAmount": "1100"
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["summary"]["invalidRecords"], 0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/results/clear",
        Some(json!({ "recordIds": ["r1", "r2"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recordsRemoved"], 2);

    let (_, body) = send(&app, Method::GET, "/api/summary", None).await;
    assert_eq!(body["data"]["totalRecords"], 0);
}

#[tokio::test]
async fn unknown_batch_progress_is_404() {
    let app = app();
    let (status, _) = send(&app, Method::GET, "/api/batches/missing/progress", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/api/batches/missing/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
