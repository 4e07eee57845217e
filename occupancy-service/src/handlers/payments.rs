use crate::models::{NewPayment, Payment, PaymentFilter};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

pub async fn record_payment(
    State(state): State<AppState>,
    Json(payload): Json<NewPayment>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state.services.payments.record(payload).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.services.payments.find(filter).await?))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.services.payments.find_by_id(&id).await?))
}
