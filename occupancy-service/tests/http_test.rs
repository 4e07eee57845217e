//! The HTTP surface over the in-memory store.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::*;
use occupancy_service::models::UnitStatus;
use occupancy_service::startup::{router, AppState};
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn app(test: &TestApp) -> Router {
    router(AppState {
        services: test.services.clone(),
    })
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let test = spawn_services();
    let (status, body) = send(&app(&test), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "occupancy-service");
}

#[tokio::test]
async fn booking_flow_over_http() {
    let test = spawn_services();
    test.seed_unit("unit-1", UnitStatus::Vacant);
    let router = app(&test);

    let (status, payment) = send(
        &router,
        "POST",
        "/payments",
        Some(json!({
            "type": "MOBILE",
            "reference_number": "QK7HTTP01",
            "currency": "KES",
            "amount": "67650"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], "UNCLAIMED");

    let (status, occupation) = send(
        &router,
        "POST",
        "/occupations",
        Some(json!({
            "unit_id": "unit-1",
            "payment_id": payment["_id"],
            "start_date": "2024-03-01",
            "tenant": {
                "first_name": "Wanjiku",
                "surname": "Kamau",
                "mobile_number": "0711222333",
                "email": "wanjiku@example.com"
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{occupation}");
    assert_eq!(occupation["status"], "PENDING_OCCUPATION");
    let id = occupation["_id"].as_str().unwrap().to_string();

    let (status, invoices) =
        send(&router, "GET", &format!("/invoices?occupation_id={id}&order=asc"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invoices.as_array().unwrap().len(), 2);
    assert_eq!(invoices[0]["type"], "RENT_ADVANCE");

    let (status, balance) = send(&router, "GET", &format!("/occupations/{id}/balance"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["entries"], 3);
    assert_eq!(balance["total_amount_carried_forward"], "0");

    let (status, activated) =
        send(&router, "POST", &format!("/occupations/{id}/activate"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(activated["status"], "CURRENT");

    let number = occupation["number"].as_str().unwrap();
    let (status, by_number) = send(&router, "GET", &format!("/occupations/{number}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_number["_id"], id.as_str());
}

#[tokio::test]
async fn errors_render_with_their_status() {
    let test = spawn_services();
    let router = app(&test);

    let (status, body) = send(&router, "GET", "/occupations/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("does not exist"));

    let (status, body) = send(
        &router,
        "GET",
        "/transactions?invoice_id=a&receipt_id=b",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Choose either invoiceId or receiptId. Both will not exist!"
    );

    let (status, _) = send(
        &router,
        "POST",
        "/payments",
        Some(json!({
            "type": "CARD",
            "reference_number": "",
            "currency": "KES",
            "amount": "10"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn sweeps_report_what_they_did() {
    let test = spawn_services();
    test.seed_unit("unit-s", UnitStatus::Vacant);
    test.book("unit-s", date(2024, 3, 1)).await;
    let router = app(&test);

    let (status, report) = send(
        &router,
        "POST",
        "/sweeps/occupations",
        Some(json!({ "today": "2024-03-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["processed"], 1);

    let (status, report) = send(&router, "POST", "/sweeps/payments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["examined"], 0);

    let (status, report) = send(
        &router,
        "POST",
        "/sweeps/rent-invoices",
        Some(json!({ "today": "2024-04-02" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["processed"], 1);

    let (status, report) = send(
        &router,
        "POST",
        "/sweeps/vacating",
        Some(json!({ "today": "2024-04-02" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["examined"], 0);
}

#[tokio::test]
async fn metrics_are_exposed() {
    occupancy_service::services::init_metrics();
    let test = spawn_services();
    let (status, _) = send(&app(&test), "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
}
