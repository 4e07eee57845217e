use crate::models::{BookingRefund, BookingRefundFilter, CreateBookingRefund};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

pub async fn create_booking_refund(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingRefund>,
) -> Result<(StatusCode, Json<BookingRefund>), AppError> {
    let refund = state.services.booking_refunds.create(payload).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn list_booking_refunds(
    State(state): State<AppState>,
    Query(filter): Query<BookingRefundFilter>,
) -> Result<Json<Vec<BookingRefund>>, AppError> {
    Ok(Json(state.services.booking_refunds.find(filter).await?))
}
